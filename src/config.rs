use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::{CommandExtractor, Extractor, LineExtractor};

/// Default concurrent extractions
pub const DEFAULT_CONCURRENCY: usize = 8;
/// Schema description looked up when none is configured
pub const DEFAULT_SCHEMA_PATH: &str = "db/schema.rb";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RepodexConfig {
    pub database: Option<String>,
    pub root: Option<String>,
    pub schema: Option<String>,
    pub extractor: ExtractorConfig,
    pub indexing: IndexingConfig,
}

/// External parser settings. Without a command the built-in line matcher is used.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ExtractorConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct IndexingConfig {
    pub concurrency: Option<usize>,
    pub extensions: Vec<String>,
    pub exclude: Vec<String>,
}

impl RepodexConfig {
    /// Schema path relative to the root, falling back to `db/schema.rb`
    pub fn schema_path(&self) -> PathBuf {
        PathBuf::from(self.schema.as_deref().unwrap_or(DEFAULT_SCHEMA_PATH))
    }
}

impl ExtractorConfig {
    pub fn build(&self) -> anyhow::Result<Arc<dyn Extractor>> {
        match &self.command {
            Some(command) => {
                let mut extractor = CommandExtractor::new(command.clone(), self.args.clone());
                if let Some(secs) = self.timeout_secs {
                    extractor = extractor.with_timeout(Duration::from_secs(secs));
                }
                Ok(Arc::new(extractor))
            }
            None => Ok(Arc::new(LineExtractor::new()?)),
        }
    }
}

impl IndexingConfig {
    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1)
    }

    pub fn extensions(&self) -> Vec<String> {
        if self.extensions.is_empty() {
            vec!["rb".to_string()]
        } else {
            self.extensions.clone()
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("repodex.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".repodex").join("index.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<RepodexConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: RepodexConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &RepodexConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Add `.repodex/` to the project's `.gitignore` unless already listed
pub fn ensure_gitignore(project_root: &Path) -> anyhow::Result<()> {
    let gitignore_path = project_root.join(".gitignore");
    let entry = ".repodex/";

    let mut content = if gitignore_path.exists() {
        std::fs::read_to_string(&gitignore_path)?
    } else {
        String::new()
    };
    if content.lines().any(|line| line.trim() == entry) {
        return Ok(());
    }
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(entry);
    content.push('\n');
    std::fs::write(&gitignore_path, content)?;
    Ok(())
}
