//! CI provider detection and per-provider environment conventions.

use super::EnvSnapshot;
use std::path::PathBuf;

/// Identity of a supported CI provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CiKind {
    Travis,
    AppVeyor,
    GitLabCi,
    GitHubActions,
    Local,
}

impl CiKind {
    /// Short lowercase name, also used in the committer identity
    pub fn pretty_name(&self) -> &'static str {
        match self {
            Self::Travis => "travis",
            Self::AppVeyor => "appveyor",
            Self::GitLabCi => "gitlab-ci",
            Self::GitHubActions => "github-actions",
            Self::Local => "local",
        }
    }
}

impl std::fmt::Display for CiKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.pretty_name())
    }
}

/// What the deployment needs to know from a CI provider.
///
/// `is_pull_request` also returns true when the build does not come from the
/// canonical repository: either condition alone suppresses deployment.
pub trait CiProvider: Send + Sync {
    fn kind(&self) -> CiKind;

    /// Whether this provider is the one running the current build
    fn detect(&self, env: &EnvSnapshot) -> bool;

    fn is_pull_request(&self, env: &EnvSnapshot, canonical_owner: &str) -> bool;

    fn branch(&self, env: &EnvSnapshot) -> Option<String>;

    /// Checkout directory; `None` when the provider does not expose one
    fn workdir(&self, env: &EnvSnapshot) -> Option<PathBuf>;
}

fn not_canonical_slug(slug: &str, owner: &str) -> bool {
    !slug.starts_with(&format!("{}/", owner))
}

fn env_path(env: &EnvSnapshot, name: &str) -> Option<PathBuf> {
    env.non_empty(name).map(PathBuf::from)
}

pub struct Travis;

impl CiProvider for Travis {
    fn kind(&self) -> CiKind {
        CiKind::Travis
    }

    fn detect(&self, env: &EnvSnapshot) -> bool {
        env.is_set("TRAVIS")
    }

    fn is_pull_request(&self, env: &EnvSnapshot, canonical_owner: &str) -> bool {
        let is_pr = env.get_or("TRAVIS_EVENT_TYPE", "pull_request") == "pull_request";
        let fork = not_canonical_slug(env.get_or("TRAVIS_REPO_SLUG", ""), canonical_owner);
        is_pr || fork
    }

    fn branch(&self, env: &EnvSnapshot) -> Option<String> {
        env.get("TRAVIS_BRANCH").map(String::from)
    }

    fn workdir(&self, env: &EnvSnapshot) -> Option<PathBuf> {
        env_path(env, "TRAVIS_BUILD_DIR")
    }
}

pub struct AppVeyor;

impl CiProvider for AppVeyor {
    fn kind(&self) -> CiKind {
        CiKind::AppVeyor
    }

    fn detect(&self, env: &EnvSnapshot) -> bool {
        env.is_set("APPVEYOR")
    }

    fn is_pull_request(&self, env: &EnvSnapshot, canonical_owner: &str) -> bool {
        tracing::info!(
            "PR number: {} - repository: {}",
            env.get_or("APPVEYOR_PULL_REQUEST_NUMBER", "-1"),
            env.get_or("APPVEYOR_REPO_NAME", "")
        );
        // A value that does not parse is treated as a pull request.
        let is_pr = env
            .non_empty("APPVEYOR_PULL_REQUEST_NUMBER")
            .map(|n| n.trim().parse::<i64>().map_or(true, |n| n >= 0))
            .unwrap_or(false);
        let fork = not_canonical_slug(env.get_or("APPVEYOR_REPO_NAME", ""), canonical_owner);
        is_pr || fork
    }

    fn branch(&self, env: &EnvSnapshot) -> Option<String> {
        env.get("APPVEYOR_REPO_BRANCH").map(String::from)
    }

    fn workdir(&self, env: &EnvSnapshot) -> Option<PathBuf> {
        env_path(env, "APPVEYOR_BUILD_FOLDER")
    }
}

pub struct GitHubActions;

impl CiProvider for GitHubActions {
    fn kind(&self) -> CiKind {
        CiKind::GitHubActions
    }

    fn detect(&self, env: &EnvSnapshot) -> bool {
        env.is_set("GITHUB_ACTIONS")
    }

    fn is_pull_request(&self, env: &EnvSnapshot, canonical_owner: &str) -> bool {
        let is_pr = !env.get_or("GITHUB_HEAD_REF", "").is_empty();
        let fork = not_canonical_slug(env.get_or("GITHUB_REPOSITORY", ""), canonical_owner);
        is_pr || fork
    }

    fn branch(&self, env: &EnvSnapshot) -> Option<String> {
        env.get("GITHUB_REF")
            .map(|r| r.strip_prefix("refs/heads/").unwrap_or(r).to_string())
    }

    fn workdir(&self, env: &EnvSnapshot) -> Option<PathBuf> {
        env_path(env, "GITHUB_WORKSPACE")
    }
}

/// Detected but not supported for deployment
pub struct GitLabCi;

impl CiProvider for GitLabCi {
    fn kind(&self) -> CiKind {
        CiKind::GitLabCi
    }

    fn detect(&self, env: &EnvSnapshot) -> bool {
        env.is_set("GITLAB_CI")
    }

    fn is_pull_request(&self, _env: &EnvSnapshot, _canonical_owner: &str) -> bool {
        true
    }

    fn branch(&self, _env: &EnvSnapshot) -> Option<String> {
        None
    }

    fn workdir(&self, _env: &EnvSnapshot) -> Option<PathBuf> {
        None
    }
}

/// Developer machine, enabled with `CI_LOCAL=true`
pub struct Local;

impl CiProvider for Local {
    fn kind(&self) -> CiKind {
        CiKind::Local
    }

    fn detect(&self, env: &EnvSnapshot) -> bool {
        env.get("CI_LOCAL") == Some("true")
    }

    fn is_pull_request(&self, _env: &EnvSnapshot, _canonical_owner: &str) -> bool {
        false
    }

    fn branch(&self, env: &EnvSnapshot) -> Option<String> {
        env.get("CI_BRANCH").map(String::from)
    }

    fn workdir(&self, env: &EnvSnapshot) -> Option<PathBuf> {
        env_path(env, "CI_WORKING_DIR")
    }
}

/// Ordered set of known providers; the first one detected wins
pub struct CiRegistry {
    providers: Vec<Box<dyn CiProvider>>,
}

impl Default for CiRegistry {
    fn default() -> Self {
        Self::new(vec![
            Box::new(Travis),
            Box::new(AppVeyor),
            Box::new(GitHubActions),
            Box::new(GitLabCi),
            Box::new(Local),
        ])
    }
}

impl CiRegistry {
    pub fn new(providers: Vec<Box<dyn CiProvider>>) -> Self {
        Self { providers }
    }

    /// The provider running the current build, if any
    pub fn detect(&self, env: &EnvSnapshot) -> Option<&dyn CiProvider> {
        self.providers
            .iter()
            .find(|p| p.detect(env))
            .map(|p| p.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "lief-project";

    fn detect(pairs: &[(&str, &str)]) -> Option<CiKind> {
        let env = EnvSnapshot::from_pairs(pairs.iter().copied());
        CiRegistry::default().detect(&env).map(|p| p.kind())
    }

    #[test]
    fn test_detection_order() {
        assert_eq!(detect(&[("TRAVIS", "true")]), Some(CiKind::Travis));
        assert_eq!(
            detect(&[("GITHUB_ACTIONS", "true"), ("APPVEYOR", "True")]),
            Some(CiKind::AppVeyor)
        );
        assert_eq!(
            detect(&[("GITLAB_CI", "true"), ("GITHUB_ACTIONS", "true")]),
            Some(CiKind::GitHubActions)
        );
        // CircleCI variables alone are not a supported CI
        assert_eq!(detect(&[("CIRCLECI", "true")]), None);
        assert_eq!(detect(&[("CI_LOCAL", "true")]), Some(CiKind::Local));
        assert_eq!(detect(&[("CI_LOCAL", "1")]), None);
        assert_eq!(detect(&[]), None);
    }

    #[test]
    fn test_github_branch_strips_ref_prefix() {
        let env = EnvSnapshot::from_pairs([("GITHUB_REF", "refs/heads/enhancement/cpack")]);
        assert_eq!(
            GitHubActions.branch(&env).as_deref(),
            Some("enhancement/cpack")
        );

        let env = EnvSnapshot::from_pairs([("GITHUB_REF", "refs/tags/0.15.0")]);
        assert_eq!(GitHubActions.branch(&env).as_deref(), Some("refs/tags/0.15.0"));
    }

    #[test]
    fn test_github_pull_request() {
        let push = EnvSnapshot::from_pairs([("GITHUB_REPOSITORY", "lief-project/LIEF")]);
        assert!(!GitHubActions.is_pull_request(&push, OWNER));

        let pr = EnvSnapshot::from_pairs([
            ("GITHUB_REPOSITORY", "lief-project/LIEF"),
            ("GITHUB_HEAD_REF", "feature"),
        ]);
        assert!(GitHubActions.is_pull_request(&pr, OWNER));

        let fork = EnvSnapshot::from_pairs([("GITHUB_REPOSITORY", "someone/LIEF")]);
        assert!(GitHubActions.is_pull_request(&fork, OWNER));

        // Owner prefix must be followed by a slash.
        let lookalike = EnvSnapshot::from_pairs([("GITHUB_REPOSITORY", "lief-project-fork/LIEF")]);
        assert!(GitHubActions.is_pull_request(&lookalike, OWNER));
    }

    #[test]
    fn test_travis_pull_request_defaults_to_true() {
        let env = EnvSnapshot::from_pairs([("TRAVIS_REPO_SLUG", "lief-project/LIEF")]);
        assert!(Travis.is_pull_request(&env, OWNER));

        let push = EnvSnapshot::from_pairs([
            ("TRAVIS_REPO_SLUG", "lief-project/LIEF"),
            ("TRAVIS_EVENT_TYPE", "push"),
        ]);
        assert!(!Travis.is_pull_request(&push, OWNER));
    }

    #[test]
    fn test_appveyor_pull_request() {
        let push = EnvSnapshot::from_pairs([("APPVEYOR_REPO_NAME", "lief-project/LIEF")]);
        assert!(!AppVeyor.is_pull_request(&push, OWNER));

        let empty_number = EnvSnapshot::from_pairs([
            ("APPVEYOR_REPO_NAME", "lief-project/LIEF"),
            ("APPVEYOR_PULL_REQUEST_NUMBER", ""),
        ]);
        assert!(!AppVeyor.is_pull_request(&empty_number, OWNER));

        let pr = EnvSnapshot::from_pairs([
            ("APPVEYOR_REPO_NAME", "lief-project/LIEF"),
            ("APPVEYOR_PULL_REQUEST_NUMBER", "42"),
        ]);
        assert!(AppVeyor.is_pull_request(&pr, OWNER));

        let garbage = EnvSnapshot::from_pairs([
            ("APPVEYOR_REPO_NAME", "lief-project/LIEF"),
            ("APPVEYOR_PULL_REQUEST_NUMBER", "abc"),
        ]);
        assert!(AppVeyor.is_pull_request(&garbage, OWNER));
    }

    #[test]
    fn test_gitlab_and_local() {
        let env = EnvSnapshot::from_pairs([("CI_BRANCH", "master"), ("CI_WORKING_DIR", "/src")]);
        assert!(GitLabCi.is_pull_request(&env, OWNER));
        assert_eq!(GitLabCi.branch(&env), None);
        assert_eq!(GitLabCi.workdir(&env), None);

        assert!(!Local.is_pull_request(&env, OWNER));
        assert_eq!(Local.branch(&env).as_deref(), Some("master"));
        assert_eq!(Local.workdir(&env), Some(PathBuf::from("/src")));
    }

    #[test]
    fn test_pretty_names() {
        assert_eq!(CiKind::GitHubActions.to_string(), "github-actions");
        assert_eq!(CiKind::GitLabCi.pretty_name(), "gitlab-ci");
    }
}
