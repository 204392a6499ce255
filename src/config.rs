//! Configuration management for ci-deploy.
//!
//! Supports layered configuration: defaults → repository → env

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Repository-relative location of the optional per-project overrides
pub const PROJECT_CONFIG_FILE: &str = ".github/deploy.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub package_repo: PackageRepoConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            secrets: SecretsConfig::default(),
            package_repo: PackageRepoConfig::default(),
            identity: IdentityConfig::default(),
            index: IndexConfig::default(),
            publish: PublishConfig::default(),
            channels: default_channels(),
        }
    }
}

impl DeployConfig {
    /// Load configuration with hierarchy: defaults → repository → env
    pub fn load(repo_dir: Option<&Path>) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder();

        // 1. Start with defaults
        builder = builder.add_source(
            config::File::from_str(
                include_str!("../default_config.toml"),
                config::FileFormat::Toml,
            )
            .required(false),
        );

        // 2. Repository config (.github/deploy.toml)
        if let Some(root) = repo_dir {
            let project_config = root.join(PROJECT_CONFIG_FILE);
            if project_config.exists() {
                builder = builder.add_source(File::from(project_config).required(false));
            }
        }

        // 3. Environment variables (CI_DEPLOY__*)
        builder = builder.add_source(
            Environment::with_prefix("CI_DEPLOY")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("gate.allowed_branches")
                .with_list_parse_key("index.excluded")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the deployment cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.publish.retry_budget == 0 {
            return Err(ConfigError::Invalid(
                "publish.retry_budget must be at least 1".to_string(),
            ));
        }
        if self.package_repo.branch.is_empty() {
            return Err(ConfigError::Invalid(
                "package_repo.branch must not be empty".to_string(),
            ));
        }

        let mut names: Vec<&str> = self.channels.iter().map(|c| c.name.as_str()).collect();
        names.sort_unstable();
        if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(ConfigError::Invalid(format!(
                "duplicate channel name: {}",
                dup[0]
            )));
        }

        Ok(())
    }

    /// Look up a channel by name
    pub fn channel(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.name == name)
    }
}

/// Branch and repository ownership rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Branches allowed to deploy
    #[serde(default = "default_allowed_branches")]
    pub allowed_branches: Vec<String>,
    /// Owner of the canonical upstream repository
    #[serde(default = "default_canonical_owner")]
    pub canonical_owner: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            allowed_branches: default_allowed_branches(),
            canonical_owner: default_canonical_owner(),
        }
    }
}

fn default_allowed_branches() -> Vec<String> {
    ["master", "deploy", "devel", "enhancement/cpack"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_canonical_owner() -> String {
    "lief-project".to_string()
}

/// Deploy key configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Environment variable holding the symmetric key (hex)
    #[serde(default = "default_key_env")]
    pub key_env: String,
    /// Environment variable holding the initialization vector (hex)
    #[serde(default = "default_iv_env")]
    pub iv_env: String,
    /// openssl cipher name
    #[serde(default = "default_cipher")]
    pub cipher: String,
    /// Encrypted private key (relative to the repository)
    #[serde(default = "default_encrypted_key")]
    pub encrypted_key: PathBuf,
    /// Where the decrypted key is written (relative to the repository)
    #[serde(default = "default_decrypted_key")]
    pub decrypted_key: PathBuf,
    /// ssh directory holding known_hosts; `~/.ssh` when unset
    #[serde(default)]
    pub ssh_dir: Option<PathBuf>,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            key_env: default_key_env(),
            iv_env: default_iv_env(),
            cipher: default_cipher(),
            encrypted_key: default_encrypted_key(),
            decrypted_key: default_decrypted_key(),
            ssh_dir: None,
        }
    }
}

fn default_key_env() -> String {
    "LIEF_AUTOMATIC_BUILDS_KEY".to_string()
}

fn default_iv_env() -> String {
    "LIEF_AUTOMATIC_BUILDS_IV".to_string()
}

fn default_cipher() -> String {
    "aes-256-cbc".to_string()
}

fn default_encrypted_key() -> PathBuf {
    PathBuf::from(".github/deploy-key.enc")
}

fn default_decrypted_key() -> PathBuf {
    PathBuf::from(".git/deploy-key")
}

/// Package repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRepoConfig {
    /// Read-only URL used for the initial clone
    #[serde(default = "default_clone_url")]
    pub clone_url: String,
    /// Authenticated URL used for fetch and push
    #[serde(default = "default_push_url")]
    pub push_url: String,
    /// Branch holding the published packages
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Checkout directory (relative to the repository)
    #[serde(default = "default_package_directory")]
    pub directory: PathBuf,
    /// Revision the checkout is soft-reset to before copying; empty disables
    #[serde(default = "default_reset_ref")]
    pub reset_ref: String,
    /// Parallel jobs for the clone
    #[serde(default = "default_clone_jobs")]
    pub clone_jobs: u32,
}

impl Default for PackageRepoConfig {
    fn default() -> Self {
        Self {
            clone_url: default_clone_url(),
            push_url: default_push_url(),
            branch: default_branch(),
            directory: default_package_directory(),
            reset_ref: default_reset_ref(),
            clone_jobs: default_clone_jobs(),
        }
    }
}

fn default_clone_url() -> String {
    "https://github.com/lief-project/packages.git".to_string()
}

fn default_push_url() -> String {
    "git@github.com:lief-project/packages.git".to_string()
}

fn default_branch() -> String {
    "gh-pages".to_string()
}

fn default_package_directory() -> PathBuf {
    PathBuf::from("deploy-packages")
}

fn default_reset_ref() -> String {
    "root".to_string()
}

fn default_clone_jobs() -> u32 {
    8
}

/// Commit author identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Prefix of the committer name, `<prefix>-<ci>-ci`
    #[serde(default = "default_user_prefix")]
    pub user_prefix: String,
    #[serde(default = "default_email")]
    pub email: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_prefix: default_user_prefix(),
            email: default_email(),
        }
    }
}

impl IdentityConfig {
    /// Committer name for a given CI pretty name
    pub fn user_name(&self, ci: &str) -> String {
        format!("{}-{}-ci", self.user_prefix, ci)
    }
}

fn default_user_prefix() -> String {
    "lief".to_string()
}

fn default_email() -> String {
    "lief@quarkslab.com".to_string()
}

/// Static index page configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Project name shown in the title and heading
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// File names never listed
    #[serde(default = "default_excluded")]
    pub excluded: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            base_url: default_base_url(),
            excluded: default_excluded(),
        }
    }
}

fn default_title() -> String {
    "lief".to_string()
}

fn default_base_url() -> String {
    "https://lief-project.github.io".to_string()
}

fn default_excluded() -> Vec<String> {
    vec!["index.html".to_string(), ".gitkeep".to_string()]
}

/// Commit and push settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Maximum number of push attempts
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            retry_budget: default_retry_budget(),
            commit_message: default_commit_message(),
        }
    }
}

fn default_retry_budget() -> u32 {
    10
}

fn default_commit_message() -> String {
    "Automatic build".to_string()
}

/// A package-repository subdirectory and the build outputs that feed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    /// Directory inside the package repository
    pub directory: PathBuf,
    /// Path under `index.base_url` the files are served from
    pub index_base: String,
    #[serde(default)]
    pub sources: Vec<SourceRule>,
}

/// Files with one of `suffixes` directly inside `directory`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRule {
    /// Source directory (relative to the repository)
    pub directory: PathBuf,
    pub suffixes: Vec<String>,
}

impl SourceRule {
    pub fn matches(&self, file_name: &str) -> bool {
        self.suffixes.iter().any(|s| file_name.ends_with(s.as_str()))
    }
}

fn default_channels() -> Vec<ChannelConfig> {
    vec![
        ChannelConfig {
            name: "sdk".to_string(),
            directory: PathBuf::from("sdk"),
            index_base: "packages/sdk".to_string(),
            sources: vec![SourceRule {
                directory: PathBuf::from("build"),
                suffixes: vec![".zip".to_string(), ".tar.gz".to_string()],
            }],
        },
        ChannelConfig {
            name: "lief".to_string(),
            directory: PathBuf::from("lief"),
            index_base: "packages/lief".to_string(),
            sources: vec![SourceRule {
                directory: PathBuf::from("dist"),
                suffixes: vec![".whl".to_string()],
            }],
        },
    ]
}
