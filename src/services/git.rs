//! Git service for the package repository.
//!
//! Uses the git CLI through a [`CommandRunner`]. All operations are blocking.

use crate::domain::{PublishTarget, PushOutcome};
use crate::error::{GitError, GitResult, ProcessError};
use crate::services::process::{CommandOutput, CommandRunner, CommandSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Markers git prints when the remote refuses a ref update
const REJECTION_MARKERS: [&str; 4] = [
    "[rejected]",
    "[remote rejected]",
    "non-fast-forward",
    "fetch first",
];

/// Version-control operations the publisher relies on
pub trait VersionControl {
    /// Stage every change in the working tree
    fn stage_all(&self) -> GitResult<()>;

    fn commit(&self, message: &str) -> GitResult<()>;

    /// Force-push the current branch tip to `target`.
    ///
    /// A refused push is an outcome, not an error.
    fn push_force(&self, target: &PublishTarget) -> GitResult<PushOutcome>;

    /// Fetch the tip of `target` into `FETCH_HEAD`
    fn fetch(&self, target: &PublishTarget) -> GitResult<()>;

    /// Rebase local commits onto `FETCH_HEAD`; the fetched side wins conflicts
    fn rebase_onto_fetched(&self) -> GitResult<()>;

    /// Abort an in-progress rebase
    fn abort_rebase(&self) -> GitResult<()>;

    /// Branch overview for diagnostics
    fn describe_branches(&self) -> GitResult<String>;

    /// Tracked files with their status tags (`git ls-files -v`)
    fn list_files(&self) -> GitResult<String>;
}

/// Git service bound to one working copy
pub struct GitService {
    runner: Arc<dyn CommandRunner>,
    repo_path: PathBuf,
    env: Vec<(String, String)>,
}

impl GitService {
    /// Create a new GitService for an existing working copy
    pub fn new(runner: Arc<dyn CommandRunner>, repo_path: PathBuf) -> GitResult<Self> {
        if !repo_path.join(".git").exists() {
            return Err(GitError::NotARepository(repo_path));
        }

        Ok(Self {
            runner,
            repo_path,
            env: Vec::new(),
        })
    }

    /// Clone a single branch of `url` into `dest`
    pub fn clone_branch(
        runner: Arc<dyn CommandRunner>,
        url: &str,
        branch: &str,
        dest: &Path,
        jobs: u32,
    ) -> GitResult<Self> {
        // `dest` is resolved against our own working directory, like every
        // later command that runs inside it.
        let spec = CommandSpec::new("git")
            .arg("clone")
            .arg(format!("--branch={}", branch))
            .arg(format!("-j{}", jobs))
            .arg("--single-branch")
            .arg(url)
            .path_arg(dest);

        tracing::info!("Cloning {} ({}) into {}", url, branch, dest.display());
        runner.run_checked(&spec)?;

        Ok(Self {
            runner,
            repo_path: dest.to_path_buf(),
            env: Vec::new(),
        })
    }

    /// Extra environment for commands that reach the authenticated remote
    pub fn with_env(mut self, vars: Vec<(String, String)>) -> Self {
        self.env = vars;
        self
    }

    /// Get the repository path
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    fn git<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .envs(self.env.iter().cloned())
    }

    fn run(&self, spec: CommandSpec) -> GitResult<CommandOutput> {
        Ok(self.runner.run_checked(&spec)?)
    }

    /// Set the committer identity for this working copy
    pub fn configure_identity(&self, name: &str, email: &str) -> GitResult<()> {
        self.run(self.git(["config", "user.name", name]))?;
        self.run(self.git(["config", "user.email", email]))?;
        Ok(())
    }

    /// Move HEAD to `rev`, keeping the index and working tree
    pub fn reset_soft(&self, rev: &str) -> GitResult<()> {
        self.run(self.git(["reset", "--soft", rev]))?;
        Ok(())
    }
}

impl VersionControl for GitService {
    fn stage_all(&self) -> GitResult<()> {
        self.run(self.git(["add", "."]))?;
        Ok(())
    }

    fn commit(&self, message: &str) -> GitResult<()> {
        self.run(self.git(["commit", "-m", message]))?;
        Ok(())
    }

    fn push_force(&self, target: &PublishTarget) -> GitResult<PushOutcome> {
        let spec = self.git([
            "push",
            "--force",
            target.remote.as_str(),
            target.branch.as_str(),
        ]);
        let output = self
            .runner
            .run(&spec)
            .map_err(|source| ProcessError::Spawn {
                command: spec.to_string(),
                source,
            })?;

        if output.is_success() {
            return Ok(PushOutcome::Accepted);
        }

        let detail = output.combined().trim().to_string();
        if REJECTION_MARKERS.iter().any(|m| detail.contains(m)) {
            Ok(PushOutcome::Rejected(detail))
        } else {
            Ok(PushOutcome::Failed(detail))
        }
    }

    fn fetch(&self, target: &PublishTarget) -> GitResult<()> {
        self.run(self.git([
            "fetch",
            "-v",
            target.remote.as_str(),
            target.branch.as_str(),
        ]))?;
        Ok(())
    }

    fn rebase_onto_fetched(&self) -> GitResult<()> {
        // While rebasing, "ours" is the upstream being rebased onto.
        self.run(self.git(["rebase", "--strategy-option=ours", "FETCH_HEAD"]))?;
        Ok(())
    }

    fn abort_rebase(&self) -> GitResult<()> {
        self.run(self.git(["rebase", "--abort"]))?;
        Ok(())
    }

    fn describe_branches(&self) -> GitResult<String> {
        Ok(self.run(self.git(["branch", "-a", "-v"]))?.stdout)
    }

    fn list_files(&self) -> GitResult<String> {
        Ok(self.run(self.git(["ls-files", "-v"]))?.stdout)
    }
}
