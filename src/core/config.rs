//! Build configuration from YAML

use crate::plugins::collections::CollectionSpec;
use anyhow::Result;
use globset::Glob;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default spacing between watch-triggered rebuilds, in milliseconds
pub const DEFAULT_DEBOUNCE_MS: u64 = 2500;

/// What a pipeline does when a stage handler fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Log the failure and keep going with the value the stage received
    #[default]
    Continue,
    /// Stop the run and return the failure to the caller
    Abort,
}

/// Top-level build configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Pipeline name
    #[serde(default = "default_name")]
    pub name: String,

    /// Directory all globs and output paths are resolved against
    #[serde(default = "default_base")]
    pub base: PathBuf,

    /// Glob selecting the input files
    pub source: String,

    /// Output directory, relative to `base`
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Keep watching `source` and rebuild on change
    #[serde(default)]
    pub watch: bool,

    /// Minimum spacing between rebuilds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default)]
    pub on_stage_error: ErrorPolicy,

    /// Rewrite `page.html` to `page/index.html`
    #[serde(default)]
    pub clean_urls: bool,

    /// Add `.gz` siblings for text assets
    #[serde(default)]
    pub gzip: bool,

    /// Named collections: a glob, or a detailed spec
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionSpec>,
}

fn default_name() -> String {
    "site".to_string()
}

fn default_base() -> PathBuf {
    PathBuf::from(".")
}

fn default_output() -> PathBuf {
    PathBuf::from("dist")
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

impl BuildConfig {
    /// Minimal configuration for a source glob
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            name: default_name(),
            base: default_base(),
            source: source.into(),
            output: default_output(),
            watch: false,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            on_stage_error: ErrorPolicy::default(),
            clean_urls: false,
            gzip: false,
            collections: BTreeMap::new(),
        }
    }

    /// Load build configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse build configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: BuildConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the build configuration
    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            anyhow::bail!("Source glob must not be empty");
        }
        Glob::new(&self.source)
            .map_err(|e| anyhow::anyhow!("Invalid source glob '{}': {}", self.source, e))?;

        if self.output.as_os_str().is_empty() {
            anyhow::bail!("Output directory must not be empty");
        }
        if self.output.is_absolute() {
            anyhow::bail!(
                "Output directory '{}' must be relative to the base directory",
                self.output.display()
            );
        }

        if self.debounce_ms == 0 {
            anyhow::bail!("debounce_ms must be greater than zero");
        }

        for (name, spec) in &self.collections {
            Glob::new(spec.pattern()).map_err(|e| {
                anyhow::anyhow!("Collection '{}' has an invalid pattern: {}", name, e)
            })?;
        }

        Ok(())
    }

    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
name: "blog"
base: "site"
source: "content/**/*"
output: "public"
watch: true
debounce_ms: 500
on_stage_error: abort
clean_urls: true
collections:
  posts: "posts/*.md"
  notes:
    pattern: "notes/**/*.md"
    sort_by: "title"
    reverse: false
"#;

        let config = BuildConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name, "blog");
        assert_eq!(config.base, PathBuf::from("site"));
        assert_eq!(config.output, PathBuf::from("public"));
        assert!(config.watch);
        assert_eq!(config.debounce(), std::time::Duration::from_millis(500));
        assert_eq!(config.on_stage_error, ErrorPolicy::Abort);
        assert!(config.clean_urls);
        assert_eq!(config.collections.len(), 2);
        assert_eq!(config.collections["posts"].pattern(), "posts/*.md");
        assert_eq!(config.collections["notes"].sort_by(), Some("title"));
        assert!(!config.collections["notes"].reverse());
    }

    #[test]
    fn test_defaults() {
        let config = BuildConfig::from_yaml("source: \"src/**/*\"").unwrap();
        assert_eq!(config.name, "site");
        assert_eq!(config.output, PathBuf::from("dist"));
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert_eq!(config.on_stage_error, ErrorPolicy::Continue);
        assert!(!config.watch);
    }

    #[test]
    fn test_missing_source_fails() {
        assert!(BuildConfig::from_yaml("name: \"x\"").is_err());
    }

    #[test]
    fn test_invalid_glob_fails() {
        let err = BuildConfig::from_yaml("source: \"src/[\"").unwrap_err();
        assert!(err.to_string().contains("Invalid source glob"));
    }

    #[test]
    fn test_absolute_output_fails() {
        let yaml = r#"
source: "src/*"
output: "/tmp/out"
"#;
        assert!(BuildConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_zero_debounce_fails() {
        let yaml = r#"
source: "src/*"
debounce_ms: 0
"#;
        assert!(BuildConfig::from_yaml(yaml).is_err());
    }
}
