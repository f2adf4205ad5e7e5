//! Indexing configuration, loadable from TOML.

use anyhow::{Context, Result, bail};
use ignore::Match;
use ignore::overrides::{Override, OverrideBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for the indexing pipeline. Every field has a default, so an
/// empty TOML file (or no file at all) yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// Window size of a chunk, in lines.
    pub chunk_size: usize,
    /// Lines shared between consecutive chunks.
    pub overlap: usize,
    /// Glob patterns for files to index. Empty means "index everything
    /// the exclude patterns leave behind".
    pub include_globs: Vec<String>,
    /// Glob patterns for files and directories to skip.
    pub exclude_globs: Vec<String>,
    /// Minimum interval between two re-index dispatches for the same file.
    pub cooldown_ms: u64,
    /// Result count when a query does not ask for one.
    pub top_k_default: usize,
    /// Vector width the embedding backends must produce.
    pub embedding_dimension: usize,
    /// Chunks per embedding request.
    pub embed_batch_size: usize,
    /// Files indexed concurrently by the watch listener.
    pub max_concurrent_files: usize,
    /// Deadline for a single embedding or store call.
    pub op_timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_size: 300,
            overlap: 50,
            include_globs: [
                "*.rs", "*.py", "*.js", "*.ts", "*.json", "*.md", "*.txt", "*.html", "*.css",
                "*.toml", "*.yaml", "*.yml",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            exclude_globs: [
                "**/.git/**",
                "**/node_modules/**",
                "**/target/**",
                "**/__pycache__/**",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            cooldown_ms: 2000,
            top_k_default: 5,
            embedding_dimension: 768,
            embed_batch_size: 16,
            max_concurrent_files: 4,
            op_timeout_secs: 30,
        }
    }
}

impl IndexConfig {
    /// Load from a TOML file, falling back to defaults for absent fields.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be at least 1 line");
        }
        if self.overlap >= self.chunk_size {
            bail!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap,
                self.chunk_size
            );
        }
        if self.embedding_dimension == 0 {
            bail!("embedding_dimension must be nonzero");
        }
        if self.embed_batch_size == 0 {
            bail!("embed_batch_size must be nonzero");
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_secs(self.op_timeout_secs)
    }

    /// Compile the glob patterns into a matcher rooted at `root`.
    pub fn file_filter(&self, root: &Path) -> Result<FileFilter> {
        let mut builder = OverrideBuilder::new(root);
        for glob in &self.include_globs {
            builder
                .add(glob)
                .with_context(|| format!("bad include glob {glob:?}"))?;
        }
        // Excludes are added last so they win over includes on the same
        // path, gitignore-style.
        for glob in &self.exclude_globs {
            builder
                .add(&format!("!{glob}"))
                .with_context(|| format!("bad exclude glob {glob:?}"))?;
        }
        Ok(FileFilter {
            overrides: builder.build().context("compiling glob patterns")?,
            default_include: self.include_globs.is_empty(),
        })
    }
}

/// Decides which files are eligible for indexing. Matching is purely
/// lexical, so it also works for paths that no longer exist on disk.
#[derive(Debug, Clone)]
pub struct FileFilter {
    overrides: Override,
    default_include: bool,
}

impl FileFilter {
    pub fn matches(&self, path: &Path) -> bool {
        match self.overrides.matched(path, false) {
            Match::Ignore(_) => false,
            Match::Whitelist(_) => true,
            Match::None => self.default_include,
        }
    }
}
