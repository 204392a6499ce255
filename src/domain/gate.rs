//! Deployment gate: decide whether this build deploys.

use super::{CiKind, CiRegistry, EnvSnapshot};
use crate::config::{GateConfig, SecretsConfig};
use crate::error::GateError;
use std::path::PathBuf;

/// Outcome of a gate evaluation that is not fatal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Deploy with the given context
    Proceed(GatePass),
    /// Deliberately do nothing and exit successfully
    Skip(SkipReason),
}

/// Why a build does not deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Branch is not in the allow-list (or unknown)
    Branch(Option<String>),
    /// Pull request, or a build outside the canonical repository
    PullRequest,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Branch(Some(branch)) => write!(f, "Skip deployment for branch '{}'", branch),
            Self::Branch(None) => write!(f, "Skip deployment for unknown branch"),
            Self::PullRequest => write!(f, "Skip pull request"),
        }
    }
}

/// Everything the deployment needs once the gate has passed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatePass {
    pub ci: CiKind,
    pub branch: String,
    pub workdir: Option<PathBuf>,
    pub secrets: DeploySecrets,
}

/// Symmetric key and IV protecting the deploy key
#[derive(Clone, PartialEq, Eq)]
pub struct DeploySecrets {
    key: String,
    iv: String,
}

impl DeploySecrets {
    pub fn new(key: impl Into<String>, iv: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            iv: iv.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn iv(&self) -> &str {
        &self.iv
    }
}

impl std::fmt::Debug for DeploySecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploySecrets")
            .field("key", &"<redacted>")
            .field("iv", &"<redacted>")
            .finish()
    }
}

/// Pure decision over an environment snapshot
pub struct DeploymentGate<'a> {
    registry: &'a CiRegistry,
    rules: &'a GateConfig,
    secrets: &'a SecretsConfig,
}

impl<'a> DeploymentGate<'a> {
    pub fn new(registry: &'a CiRegistry, rules: &'a GateConfig, secrets: &'a SecretsConfig) -> Self {
        Self {
            registry,
            rules,
            secrets,
        }
    }

    /// Classify the build as proceed, skip, or fatal.
    ///
    /// Checks run in a fixed order: CI detection, branch, pull request, then
    /// secrets. A missing secret is only reported for a build that would
    /// otherwise deploy.
    pub fn evaluate(&self, env: &EnvSnapshot) -> Result<GateDecision, GateError> {
        let provider = self.registry.detect(env).ok_or(GateError::UnknownCi)?;
        let ci = provider.kind();
        tracing::info!("CI: {}", ci);

        let branch = provider.branch(env);
        tracing::info!("Branch: {}", branch.as_deref().unwrap_or("<unknown>"));

        let branch = match branch {
            Some(b) if self.rules.allowed_branches.iter().any(|a| *a == b) => b,
            other => return Ok(GateDecision::Skip(SkipReason::Branch(other))),
        };

        if provider.is_pull_request(env, &self.rules.canonical_owner) {
            return Ok(GateDecision::Skip(SkipReason::PullRequest));
        }

        let key = env
            .non_empty(&self.secrets.key_env)
            .ok_or_else(|| GateError::MissingSecret(self.secrets.key_env.clone()))?;
        let iv = env
            .non_empty(&self.secrets.iv_env)
            .ok_or_else(|| GateError::MissingSecret(self.secrets.iv_env.clone()))?;

        Ok(GateDecision::Proceed(GatePass {
            ci,
            branch,
            workdir: provider.workdir(env),
            secrets: DeploySecrets::new(key, iv),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluate(pairs: &[(&str, &str)]) -> Result<GateDecision, GateError> {
        let registry = CiRegistry::default();
        let rules = GateConfig::default();
        let secrets = SecretsConfig::default();
        let env = EnvSnapshot::from_pairs(pairs.iter().copied());
        DeploymentGate::new(&registry, &rules, &secrets).evaluate(&env)
    }

    const GITHUB_PUSH: [(&str, &str); 6] = [
        ("GITHUB_ACTIONS", "true"),
        ("GITHUB_REF", "refs/heads/master"),
        ("GITHUB_REPOSITORY", "lief-project/LIEF"),
        ("GITHUB_WORKSPACE", "/home/runner/work/LIEF"),
        ("LIEF_AUTOMATIC_BUILDS_KEY", "00ff"),
        ("LIEF_AUTOMATIC_BUILDS_IV", "ff00"),
    ];

    fn with(overrides: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        let mut pairs: Vec<_> = GITHUB_PUSH
            .iter()
            .copied()
            .filter(|(k, _)| !overrides.iter().any(|(o, _)| o == k))
            .collect();
        pairs.extend(overrides.iter().copied());
        pairs
    }

    #[test]
    fn test_proceed_on_canonical_push() {
        let decision = evaluate(&GITHUB_PUSH).unwrap();
        match decision {
            GateDecision::Proceed(pass) => {
                assert_eq!(pass.ci, CiKind::GitHubActions);
                assert_eq!(pass.branch, "master");
                assert_eq!(pass.workdir, Some(PathBuf::from("/home/runner/work/LIEF")));
                assert_eq!(pass.secrets.key(), "00ff");
                assert_eq!(pass.secrets.iv(), "ff00");
            }
            other => panic!("expected proceed, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_ci_is_fatal() {
        let err = evaluate(&[("LIEF_AUTOMATIC_BUILDS_KEY", "00ff")]).unwrap_err();
        assert!(matches!(err, GateError::UnknownCi));
    }

    #[test]
    fn test_skip_disallowed_branch() {
        let decision = evaluate(&with(&[("GITHUB_REF", "refs/heads/feature/x")])).unwrap();
        assert_eq!(
            decision,
            GateDecision::Skip(SkipReason::Branch(Some("feature/x".to_string())))
        );
    }

    #[test]
    fn test_skip_pull_request() {
        let decision = evaluate(&with(&[("GITHUB_HEAD_REF", "feature")])).unwrap();
        assert_eq!(decision, GateDecision::Skip(SkipReason::PullRequest));
    }

    #[test]
    fn test_skip_fork_even_without_pull_request() {
        let decision = evaluate(&with(&[("GITHUB_REPOSITORY", "someone/LIEF")])).unwrap();
        assert_eq!(decision, GateDecision::Skip(SkipReason::PullRequest));
    }

    #[test]
    fn test_skip_wins_over_missing_secrets() {
        let decision = evaluate(&[
            ("GITHUB_ACTIONS", "true"),
            ("GITHUB_REF", "refs/heads/wip"),
        ])
        .unwrap();
        assert!(matches!(decision, GateDecision::Skip(SkipReason::Branch(_))));
    }

    #[test]
    fn test_missing_or_empty_secret_is_fatal() {
        let pairs: Vec<_> = GITHUB_PUSH
            .iter()
            .copied()
            .filter(|(k, _)| *k != "LIEF_AUTOMATIC_BUILDS_IV")
            .collect();
        let err = evaluate(&pairs).unwrap_err();
        assert!(matches!(err, GateError::MissingSecret(ref name) if name == "LIEF_AUTOMATIC_BUILDS_IV"));

        let err = evaluate(&with(&[("LIEF_AUTOMATIC_BUILDS_KEY", "")])).unwrap_err();
        assert!(matches!(err, GateError::MissingSecret(ref name) if name == "LIEF_AUTOMATIC_BUILDS_KEY"));
    }

    #[test]
    fn test_gitlab_never_deploys() {
        let decision = evaluate(&[("GITLAB_CI", "true"), ("CI_BRANCH", "master")]).unwrap();
        assert_eq!(decision, GateDecision::Skip(SkipReason::Branch(None)));
    }

    #[test]
    fn test_decision_is_deterministic() {
        let inputs = [
            GITHUB_PUSH.to_vec(),
            with(&[("GITHUB_HEAD_REF", "x")]),
            with(&[("GITHUB_REF", "refs/heads/devel")]),
            vec![("CI_LOCAL", "true"), ("CI_BRANCH", "deploy")],
        ];
        for pairs in &inputs {
            let first = format!("{:?}", evaluate(pairs));
            let second = format!("{:?}", evaluate(pairs));
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_secrets_debug_is_redacted() {
        let secrets = DeploySecrets::new("topsecret", "iv-value");
        let debug = format!("{:?}", secrets);
        assert!(!debug.contains("topsecret"));
        assert!(!debug.contains("iv-value"));
    }
}
