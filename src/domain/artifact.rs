//! Build outputs selected for publication.

use crate::config::ChannelConfig;
use crate::error::{ArtifactError, ArtifactResult};
use std::fs;
use std::path::{Path, PathBuf};

/// One build output and the channel it is published to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Artifact {
    /// Channel name (`sdk`, `lief`, ...)
    pub channel: String,
    pub file_name: String,
    /// Absolute source path
    pub source: PathBuf,
}

/// Artifacts of one run, computed once and never modified
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    artifacts: Vec<Artifact>,
}

impl ArtifactSet {
    /// Scan the source directories of every channel.
    ///
    /// Only regular files directly inside a source directory are considered.
    /// A source directory that does not exist contributes nothing.
    pub fn scan(repo_dir: &Path, channels: &[ChannelConfig]) -> ArtifactResult<Self> {
        let mut artifacts = Vec::new();

        for channel in channels {
            for rule in &channel.sources {
                let dir = repo_dir.join(&rule.directory);
                if !dir.is_dir() {
                    tracing::debug!("Source directory {} does not exist", dir.display());
                    continue;
                }

                let entries = fs::read_dir(&dir).map_err(|source| ArtifactError::Read {
                    path: dir.clone(),
                    source,
                })?;

                for entry in entries {
                    let entry = entry.map_err(|source| ArtifactError::Read {
                        path: dir.clone(),
                        source,
                    })?;
                    let path = entry.path();
                    if !path.is_file() {
                        continue;
                    }

                    let file_name = match path.file_name().and_then(|n| n.to_str()) {
                        Some(name) if rule.matches(name) => name.to_string(),
                        _ => continue,
                    };

                    artifacts.push(Artifact {
                        channel: channel.name.clone(),
                        file_name,
                        source: path,
                    });
                }
            }
        }

        artifacts.sort();
        artifacts.dedup_by(|a, b| a.channel == b.channel && a.source == b.source);

        Ok(Self { artifacts })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter()
    }

    /// Artifacts destined for `channel`
    pub fn for_channel<'a>(&'a self, channel: &'a str) -> impl Iterator<Item = &'a Artifact> {
        self.artifacts.iter().filter(move |a| a.channel == channel)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeployConfig;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"payload").unwrap();
    }

    #[test]
    fn test_scan_selects_by_suffix_and_channel() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        touch(&root.join("dist/lief-0.15.0-cp311-cp311-linux_x86_64.whl"));
        touch(&root.join("dist/lief-0.15.0.tar.gz"));
        touch(&root.join("build/LIEF-0.15.0-Linux-x86_64.tar.gz"));
        touch(&root.join("build/LIEF-0.15.0-Linux-x86_64.zip"));
        touch(&root.join("build/CMakeCache.txt"));
        fs::create_dir_all(root.join("build/nested.zip")).unwrap();

        let config = DeployConfig::default();
        let set = ArtifactSet::scan(root, &config.channels).unwrap();

        let sdk: Vec<_> = set.for_channel("sdk").map(|a| a.file_name.as_str()).collect();
        assert_eq!(
            sdk,
            vec![
                "LIEF-0.15.0-Linux-x86_64.tar.gz",
                "LIEF-0.15.0-Linux-x86_64.zip"
            ]
        );

        let wheels: Vec<_> = set.for_channel("lief").map(|a| a.file_name.as_str()).collect();
        assert_eq!(wheels, vec!["lief-0.15.0-cp311-cp311-linux_x86_64.whl"]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_scan_missing_directories() {
        let temp = TempDir::new().unwrap();
        let config = DeployConfig::default();
        let set = ArtifactSet::scan(temp.path(), &config.channels).unwrap();
        assert!(set.is_empty());
    }
}
