//! Unified error types for ci-deploy.

use crate::domain::CiKind;
use std::path::PathBuf;
use thiserror::Error;

/// Main deployment error type
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gate error: {0}")]
    Gate(#[from] GateError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Secret provisioning error: {0}")]
    Secret(#[from] SecretError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Cannot resolve home directory")]
    NoHomeDirectory,

    #[error("Cannot resolve repository directory {path}: {source}")]
    RepoDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while deciding whether to deploy.
///
/// These are fatal: a skip is not an error and is reported through
/// [`GateDecision::Skip`](crate::domain::GateDecision::Skip).
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Can't detect CI")]
    UnknownCi,

    #[error("Deploy secret {0} is not set")]
    MissingSecret(String),

    #[error("Unsupported CI to resolve working directory: {0}")]
    UnsupportedWorkdir(CiKind),
}

/// Failure of an external command
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with status {code:?}: {output}")]
    Failed {
        command: String,
        code: Option<i32>,
        output: String,
    },
}

/// Git operation errors
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error(transparent)]
    Command(#[from] ProcessError),
}

/// Artifact collection and index generation errors
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Index template error: {0}")]
    Template(String),
}

/// Deploy key and ssh agent errors
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Encrypted deploy key not found: {0}")]
    EncryptedKeyMissing(PathBuf),

    #[error("Failed to decrypt deploy key: {0}")]
    Decrypt(String),

    #[error("Can't start ssh-agent: {0}")]
    AgentOutput(String),

    #[error("Failed to add the key {path}: {reason}")]
    AddKey { path: PathBuf, reason: String },

    #[error("Cannot derive ssh host from remote {0}")]
    UnknownHost(String),

    #[error(transparent)]
    Command(#[from] ProcessError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Commit/push loop errors
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to commit: {0}")]
    Commit(#[source] GitError),

    #[error("Can't push on {remote} -> {branch} after {attempts} attempt(s)")]
    Exhausted {
        remote: String,
        branch: String,
        attempts: u32,
    },

    #[error(transparent)]
    Git(#[from] GitError),
}

/// Result type alias for the deployment
pub type Result<T> = std::result::Result<T, DeployError>;

/// Result type alias for Git operations
pub type GitResult<T> = std::result::Result<T, GitError>;

/// Result type alias for artifact operations
pub type ArtifactResult<T> = std::result::Result<T, ArtifactError>;

/// Result type alias for secret provisioning
pub type SecretResult<T> = std::result::Result<T, SecretError>;
