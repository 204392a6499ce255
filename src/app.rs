//! Deployment orchestration: one run from gate to push.

use crate::config::DeployConfig;
use crate::domain::{
    ArtifactSet, CiRegistry, DeploymentGate, EnvSnapshot, GateDecision, GatePass, PublishReport,
    PublishTarget, SkipReason, Workspace,
};
use crate::error::{GateError, Result};
use crate::services::secrets::ssh_host;
use crate::services::{
    ArtifactCollector, CommandRunner, GitService, Publisher, SecretProvisioner, VersionControl,
};
use std::path::PathBuf;
use std::sync::Arc;

/// How a run that did not fail ended
#[derive(Debug)]
pub enum RunOutcome {
    /// The gate decided not to deploy
    Skipped(SkipReason),
    /// Gate passed; nothing was modified
    DryRun(ArtifactSet),
    /// Artifacts were pushed
    Published(PublishReport),
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skipped(reason) => write!(f, "{}", reason),
            Self::DryRun(artifacts) => {
                write!(f, "Dry run: {} artifact(s) would be published", artifacts.len())
            }
            Self::Published(report) => write!(
                f,
                "Published after {} attempt(s) and {} resync(s)",
                report.attempts, report.resyncs
            ),
        }
    }
}

/// Best-effort source checkout used to locate the repository config file:
/// explicit, else the CI working directory, else the current directory
pub fn resolve_repo_dir(
    registry: &CiRegistry,
    env: &EnvSnapshot,
    explicit: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    if let Some(dir) = registry.detect(env).and_then(|p| p.workdir(env)) {
        return Ok(dir);
    }
    Ok(std::env::current_dir()?)
}

/// Runs the deployment steps in order, stopping at the first failure
pub struct Deployer {
    config: DeployConfig,
    env: EnvSnapshot,
    runner: Arc<dyn CommandRunner>,
    registry: CiRegistry,
    repo_dir: Option<PathBuf>,
    dry_run: bool,
}

impl Deployer {
    pub fn new(config: DeployConfig, env: EnvSnapshot, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            env,
            runner,
            registry: CiRegistry::default(),
            repo_dir: None,
            dry_run: false,
        }
    }

    /// Source checkout to deploy from. Without one, the CI working
    /// directory is used.
    pub fn repo_dir(mut self, repo_dir: Option<PathBuf>) -> Self {
        self.repo_dir = repo_dir;
        self
    }

    /// Stop after the artifact set is computed
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn run(&self) -> Result<RunOutcome> {
        let gate = DeploymentGate::new(&self.registry, &self.config.gate, &self.config.secrets);
        let pass = match gate.evaluate(&self.env)? {
            GateDecision::Skip(reason) => {
                tracing::info!("{}", reason);
                return Ok(RunOutcome::Skipped(reason));
            }
            GateDecision::Proceed(pass) => pass,
        };

        let repo_dir = match (&self.repo_dir, &pass.workdir) {
            (Some(dir), _) | (None, Some(dir)) => dir.clone(),
            (None, None) => return Err(GateError::UnsupportedWorkdir(pass.ci).into()),
        };
        let workspace = Workspace::new(repo_dir, &self.config)?;
        tracing::debug!("Working directory: {}", workspace.repo_dir.display());

        let artifacts = ArtifactSet::scan(&workspace.repo_dir, &self.config.channels)?;
        tracing::info!("Found {} artifact(s)", artifacts.len());

        if self.dry_run {
            for artifact in artifacts.iter() {
                tracing::info!("  {} <- {}", artifact.channel, artifact.source.display());
            }
            return Ok(RunOutcome::DryRun(artifacts));
        }

        let git = self.prepare_package_repo(&workspace, &pass)?;

        let collector = ArtifactCollector::new(&workspace, &self.config)?;
        collector.copy(&artifacts)?;
        collector.write_indexes()?;

        let repo = &self.config.package_repo;
        let provisioner =
            SecretProvisioner::new(Arc::clone(&self.runner), &self.config.secrets.cipher);
        provisioner.ensure_ssh_dir(&workspace.ssh_dir)?;
        let key = provisioner.decrypt_key(
            &pass.secrets,
            &workspace.encrypted_key,
            &workspace.decrypted_key,
        )?;
        let agent = provisioner.start_agent()?;
        provisioner.add_key(&agent, &key)?;
        provisioner.trust_host(&ssh_host(&repo.push_url)?, &workspace.known_hosts())?;

        let git = git.with_env(agent.env());
        let target = PublishTarget::new(&repo.push_url, &repo.branch);
        let report = Publisher::new(
            &git,
            target,
            self.config.publish.retry_budget,
            &self.config.publish.commit_message,
        )
        .publish()?;

        key.remove()?;
        Ok(RunOutcome::Published(report))
    }

    /// Clone (if needed) and configure the package repository checkout
    fn prepare_package_repo(&self, workspace: &Workspace, pass: &GatePass) -> Result<GitService> {
        let repo = &self.config.package_repo;
        let runner = Arc::clone(&self.runner);

        let git = if workspace.has_package_checkout() {
            GitService::new(runner, workspace.package_dir.clone())?
        } else {
            GitService::clone_branch(
                runner,
                &repo.clone_url,
                &repo.branch,
                &workspace.package_dir,
                repo.clone_jobs,
            )?
        };

        let identity = &self.config.identity;
        let user = identity.user_name(pass.ci.pretty_name());
        tracing::info!("CI: {} - {}", user, identity.email);
        git.configure_identity(&user, &identity.email)?;

        if !repo.reset_ref.is_empty() {
            git.reset_soft(&repo.reset_ref)?;
        }
        for line in git.list_files()?.lines() {
            tracing::debug!("  {}", line);
        }

        Ok(git)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_repo_dir_prefers_explicit() {
        let registry = CiRegistry::default();
        let env = EnvSnapshot::from_pairs([("GITHUB_ACTIONS", "true"), ("GITHUB_WORKSPACE", "/ws")]);

        let dir = resolve_repo_dir(&registry, &env, Some(PathBuf::from("/explicit"))).unwrap();
        assert_eq!(dir, PathBuf::from("/explicit"));

        let dir = resolve_repo_dir(&registry, &env, None).unwrap();
        assert_eq!(dir, PathBuf::from("/ws"));
    }

    #[test]
    fn test_resolve_repo_dir_falls_back_to_cwd() {
        let registry = CiRegistry::default();
        let env = EnvSnapshot::from_pairs([("GITLAB_CI", "true")]);

        let dir = resolve_repo_dir(&registry, &env, None).unwrap();
        assert_eq!(dir, std::env::current_dir().unwrap());
    }

    #[test]
    fn test_missing_workdir_is_fatal_after_gate() {
        use crate::domain::CiKind;
        use crate::error::DeployError;
        use crate::services::SystemRunner;

        let env = EnvSnapshot::from_pairs([
            ("CI_LOCAL", "true"),
            ("CI_BRANCH", "master"),
            ("LIEF_AUTOMATIC_BUILDS_KEY", "00"),
            ("LIEF_AUTOMATIC_BUILDS_IV", "11"),
        ]);
        let err = Deployer::new(DeployConfig::default(), env, Arc::new(SystemRunner))
            .run()
            .unwrap_err();

        assert!(matches!(
            err,
            DeployError::Gate(GateError::UnsupportedWorkdir(CiKind::Local))
        ));
    }
}
