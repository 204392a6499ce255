//! Artifact collector: copies build outputs into the package repository and
//! regenerates the per-channel index pages.

use crate::config::DeployConfig;
use crate::domain::{ArtifactSet, Workspace};
use crate::error::{ArtifactError, ArtifactResult};
use handlebars::Handlebars;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the generated listing in each channel directory
pub const INDEX_FILE: &str = "index.html";

const INDEX_TEMPLATE_NAME: &str = "index";

/// Listing page in the layout already served by the package repository,
/// leading blank line included
const INDEX_TEMPLATE: &str = "
<html>
<title>Links for {{title}}</title>
<body>
<h1>Links for {{title}}</h1>
{{#each names}}    <a href=\"{{../base_url}}/{{../base}}/{{this}}\">{{this}}</a><br />
{{/each}}</body>
</html>
";

/// Values the index template is rendered with
#[derive(Debug, Serialize)]
pub struct IndexPage<'a> {
    pub title: &'a str,
    pub base_url: &'a str,
    pub base: &'a str,
    pub names: &'a [String],
}

impl<'a> IndexPage<'a> {
    /// Page for one channel; slashes around `base_url` and `base` are trimmed
    pub fn new(title: &'a str, base_url: &'a str, base: &'a str, names: &'a [String]) -> Self {
        Self {
            title,
            base_url: base_url.trim_end_matches('/'),
            base: base.trim_matches('/'),
            names,
        }
    }
}

/// Renders index pages from the registered template
pub struct IndexRenderer {
    handlebars: Handlebars<'static>,
}

impl IndexRenderer {
    pub fn new() -> ArtifactResult<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        // File names are written verbatim, like the pages already published.
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars
            .register_template_string(INDEX_TEMPLATE_NAME, INDEX_TEMPLATE)
            .map_err(|e| ArtifactError::Template(e.to_string()))?;

        Ok(Self { handlebars })
    }

    pub fn render(&self, page: &IndexPage<'_>) -> ArtifactResult<String> {
        self.handlebars
            .render(INDEX_TEMPLATE_NAME, page)
            .map_err(|e| ArtifactError::Template(e.to_string()))
    }
}

/// Copies artifacts and writes index pages for the configured channels
pub struct ArtifactCollector<'a> {
    workspace: &'a Workspace,
    config: &'a DeployConfig,
    renderer: IndexRenderer,
}

impl<'a> ArtifactCollector<'a> {
    pub fn new(workspace: &'a Workspace, config: &'a DeployConfig) -> ArtifactResult<Self> {
        Ok(Self {
            workspace,
            config,
            renderer: IndexRenderer::new()?,
        })
    }

    /// Create every channel directory that does not exist yet
    pub fn prepare(&self) -> ArtifactResult<()> {
        for channel in &self.config.channels {
            let dir = self.workspace.channel_dir(channel);
            fs::create_dir_all(&dir).map_err(|source| ArtifactError::Write { path: dir, source })?;
        }
        Ok(())
    }

    /// Copy every artifact into its channel directory, overwriting files
    /// with the same name. Returns the number of files copied.
    pub fn copy(&self, artifacts: &ArtifactSet) -> ArtifactResult<usize> {
        self.prepare()?;

        let mut copied = 0;
        for artifact in artifacts.iter() {
            let channel = self
                .config
                .channel(&artifact.channel)
                .ok_or_else(|| ArtifactError::UnknownChannel(artifact.channel.clone()))?;
            let dest = self.workspace.channel_dir(channel).join(&artifact.file_name);

            tracing::debug!(
                "Copying '{}' to '{}'",
                artifact.source.display(),
                dest.display()
            );
            fs::copy(&artifact.source, &dest).map_err(|source| ArtifactError::Copy {
                from: artifact.source.clone(),
                to: dest.clone(),
                source,
            })?;
            copied += 1;
        }

        Ok(copied)
    }

    /// Rewrite `index.html` in every channel directory
    pub fn write_indexes(&self) -> ArtifactResult<Vec<PathBuf>> {
        let index = &self.config.index;
        let mut written = Vec::with_capacity(self.config.channels.len());

        for channel in &self.config.channels {
            let dir = self.workspace.channel_dir(channel);
            let names = list_entries(&dir, &index.excluded)?;
            let page = IndexPage::new(&index.title, &index.base_url, &channel.index_base, &names);
            let html = self.renderer.render(&page)?;

            let path = dir.join(INDEX_FILE);
            fs::write(&path, html).map_err(|source| ArtifactError::Write {
                path: path.clone(),
                source,
            })?;
            tracing::info!("Wrote {} ({} entries)", path.display(), names.len());
            written.push(path);
        }

        Ok(written)
    }
}

/// Names of the regular files in `dir`, minus `excluded`, sorted
pub fn list_entries(dir: &Path, excluded: &[String]) -> ArtifactResult<Vec<String>> {
    let read_err = |source| ArtifactError::Read {
        path: dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if !excluded.iter().any(|e| e == name) {
                names.push(name.to_string());
            }
        }
    }

    names.sort();
    Ok(names)
}
