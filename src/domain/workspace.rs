//! Workspace entity: resolved paths for one deployment run.

use crate::config::{ChannelConfig, DeployConfig};
use crate::error::ConfigError;
use std::path::PathBuf;

/// Absolute locations derived from the repository root and configuration
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Source repository root
    pub repo_dir: PathBuf,
    /// Checkout of the package repository
    pub package_dir: PathBuf,
    /// Encrypted deploy key
    pub encrypted_key: PathBuf,
    /// Runtime-only decrypted deploy key
    pub decrypted_key: PathBuf,
    /// Directory holding `known_hosts`
    pub ssh_dir: PathBuf,
}

impl Workspace {
    /// Resolve all paths of a run.
    ///
    /// A relative `repo_dir` is taken from the current directory. The ssh
    /// directory defaults to `~/.ssh`, which requires a home directory.
    pub fn new(repo_dir: PathBuf, config: &DeployConfig) -> Result<Self, ConfigError> {
        let repo_dir = std::path::absolute(&repo_dir)
            .map_err(|source| ConfigError::RepoDir { path: repo_dir, source })?;
        let ssh_dir = match &config.secrets.ssh_dir {
            Some(dir) => dir.clone(),
            None => directories::BaseDirs::new()
                .map(|dirs| dirs.home_dir().join(".ssh"))
                .ok_or(ConfigError::NoHomeDirectory)?,
        };

        Ok(Self {
            package_dir: repo_dir.join(&config.package_repo.directory),
            encrypted_key: repo_dir.join(&config.secrets.encrypted_key),
            decrypted_key: repo_dir.join(&config.secrets.decrypted_key),
            ssh_dir,
            repo_dir,
        })
    }

    /// Directory of a channel inside the package repository
    pub fn channel_dir(&self, channel: &ChannelConfig) -> PathBuf {
        self.package_dir.join(&channel.directory)
    }

    pub fn known_hosts(&self) -> PathBuf {
        self.ssh_dir.join("known_hosts")
    }

    /// Whether the package repository has already been cloned
    pub fn has_package_checkout(&self) -> bool {
        self.package_dir.is_dir()
    }
}
