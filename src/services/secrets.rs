//! Deploy key provisioning: decryption, ssh agent and host trust.
//!
//! The decrypted key and the agent are owned by guards that clean up when
//! dropped, so every exit path after decryption removes the key from disk.

use crate::domain::DeploySecrets;
use crate::error::{SecretError, SecretResult};
use crate::services::process::{CommandRunner, CommandSpec};
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const AGENT_OUTPUT_PATTERN: &str =
    r"(?s)SSH_AUTH_SOCK=(?P<socket>[^;]+).*SSH_AGENT_PID=(?P<pid>\d+)";

/// Decrypted private key on disk, removed on drop
#[derive(Debug)]
pub struct DecryptedKey {
    path: PathBuf,
    removed: bool,
}

impl DecryptedKey {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the key now and report failures
    pub fn remove(mut self) -> std::io::Result<()> {
        self.removed = true;
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

impl Drop for DecryptedKey {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove deploy key {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Connection parameters printed by `ssh-agent`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSession {
    pub socket: String,
    pub pid: u32,
}

impl AgentSession {
    /// Extract the socket path and pid from the agent's start-up output
    pub fn parse(output: &str) -> SecretResult<Self> {
        let pattern =
            Regex::new(AGENT_OUTPUT_PATTERN).map_err(|e| SecretError::AgentOutput(e.to_string()))?;
        let caps = pattern
            .captures(output)
            .ok_or_else(|| SecretError::AgentOutput("unexpected ssh-agent output".to_string()))?;

        let pid = caps["pid"]
            .parse()
            .map_err(|_| SecretError::AgentOutput(format!("invalid agent pid: {}", &caps["pid"])))?;

        Ok(Self {
            socket: caps["socket"].to_string(),
            pid,
        })
    }

    /// Variables a child process needs to reach the agent
    pub fn env(&self) -> Vec<(String, String)> {
        vec![
            ("SSH_AUTH_SOCK".to_string(), self.socket.clone()),
            ("SSH_AGENT_PID".to_string(), self.pid.to_string()),
        ]
    }
}

/// Running ssh agent, killed on drop
pub struct SshAgent {
    runner: Arc<dyn CommandRunner>,
    session: AgentSession,
}

impl SshAgent {
    pub fn env(&self) -> Vec<(String, String)> {
        self.session.env()
    }
}

impl Drop for SshAgent {
    fn drop(&mut self) {
        let spec = CommandSpec::new("ssh-agent").arg("-k").envs(self.env());
        match self.runner.run(&spec) {
            Ok(output) if output.is_success() => {
                tracing::debug!("Stopped ssh-agent (pid {})", self.session.pid)
            }
            Ok(output) => tracing::warn!(
                "ssh-agent -k exited with {:?}: {}",
                output.status,
                output.combined().trim()
            ),
            Err(e) => tracing::warn!("Failed to stop ssh-agent: {}", e),
        }
    }
}

/// Provisions the deploy key for authenticated git transport
pub struct SecretProvisioner {
    runner: Arc<dyn CommandRunner>,
    cipher: String,
}

impl SecretProvisioner {
    pub fn new(runner: Arc<dyn CommandRunner>, cipher: impl Into<String>) -> Self {
        Self {
            runner,
            cipher: cipher.into(),
        }
    }

    /// Create the ssh directory (owner-only on unix) if missing
    pub fn ensure_ssh_dir(&self, dir: &Path) -> SecretResult<()> {
        if dir.is_dir() {
            return Ok(());
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)?;
        }
        #[cfg(not(unix))]
        fs::create_dir_all(dir)?;

        Ok(())
    }

    /// Decrypt `encrypted` into `output`, which is private to the current
    /// user before openssl writes to it
    pub fn decrypt_key(
        &self,
        secrets: &DeploySecrets,
        encrypted: &Path,
        output: &Path,
    ) -> SecretResult<DecryptedKey> {
        if !encrypted.is_file() {
            return Err(SecretError::EncryptedKeyMissing(encrypted.to_path_buf()));
        }

        let spec = CommandSpec::new("openssl")
            .arg(&self.cipher)
            .args(["-K", secrets.key(), "-iv", secrets.iv()])
            .arg("-in")
            .path_arg(encrypted)
            .arg("-out")
            .path_arg(output)
            .arg("-d")
            .sensitive();

        // From here on the guard owns whatever openssl may have written.
        let key = DecryptedKey {
            path: output.to_path_buf(),
            removed: false,
        };
        create_private(output)?;

        let result = self
            .runner
            .run(&spec)
            .map_err(|e| SecretError::Decrypt(e.to_string()))?;
        if !result.is_success() {
            return Err(SecretError::Decrypt(format!(
                "openssl exited with status {:?}",
                result.status
            )));
        }
        if fs::metadata(output)?.len() == 0 {
            return Err(SecretError::Decrypt(format!(
                "{} is empty",
                output.display()
            )));
        }

        tracing::info!("Decrypted deploy key to {}", output.display());
        Ok(key)
    }

    /// Start a dedicated ssh agent
    pub fn start_agent(&self) -> SecretResult<SshAgent> {
        let output = self.runner.run_checked(&CommandSpec::new("ssh-agent"))?;
        let session = AgentSession::parse(&output.combined())?;
        tracing::info!(
            "ssh agent data: socket={} pid={}",
            session.socket,
            session.pid
        );

        Ok(SshAgent {
            runner: Arc::clone(&self.runner),
            session,
        })
    }

    /// Register the key with the agent
    pub fn add_key(&self, agent: &SshAgent, key: &DecryptedKey) -> SecretResult<()> {
        let spec = CommandSpec::new("ssh-add")
            .path_arg(key.path())
            .envs(agent.env());
        let output = self.runner.run(&spec)?;
        if !output.is_success() {
            return Err(SecretError::AddKey {
                path: key.path().to_path_buf(),
                reason: output.combined().trim().to_string(),
            });
        }
        Ok(())
    }

    /// Append the host keys of `host` to `known_hosts`
    pub fn trust_host(&self, host: &str, known_hosts: &Path) -> SecretResult<()> {
        let output = self
            .runner
            .run_checked(&CommandSpec::new("ssh-keyscan").args(["-H", host]))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(known_hosts)?;
        file.write_all(output.stdout.as_bytes())?;
        tracing::info!("Added {} to {}", host, known_hosts.display());
        Ok(())
    }
}

/// Create (or truncate) `path` with mode 0600
fn create_private(path: &Path) -> SecretResult<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)?;

    // An existing file keeps its previous mode when opened.
    restrict_permissions(path)
}

fn restrict_permissions(path: &Path) -> SecretResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Host part of an ssh remote (`git@github.com:org/repo.git`,
/// `ssh://git@github.com:22/org/repo.git`)
pub fn ssh_host(remote: &str) -> SecretResult<String> {
    let unknown = || SecretError::UnknownHost(remote.to_string());
    if remote.contains("://") && !remote.starts_with("ssh://") {
        return Err(unknown());
    }

    let authority = match remote.strip_prefix("ssh://") {
        Some(rest) => rest.split('/').next().ok_or_else(unknown)?,
        None => remote.split(':').next().ok_or_else(unknown)?,
    };
    let host = authority.rsplit('@').next().ok_or_else(unknown)?;
    let host = host.split(':').next().ok_or_else(unknown)?;

    if host.is_empty() || remote == host {
        return Err(unknown());
    }
    Ok(host.to_string())
}
