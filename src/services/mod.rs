//! Infrastructure services for ci-deploy.
//!
//! This module contains:
//! - process: structured external command execution
//! - GitService: package repository operations
//! - ArtifactCollector: artifact copy and index pages
//! - SecretProvisioner: deploy key, ssh agent and known hosts
//! - Publisher: the commit/push retry loop

pub mod collector;
mod git;
pub mod process;
mod publisher;
pub mod secrets;

pub use collector::ArtifactCollector;
pub use git::{GitService, VersionControl};
pub use process::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use publisher::Publisher;
pub use secrets::{DecryptedKey, SecretProvisioner, SshAgent};
