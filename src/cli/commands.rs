//! CLI command definitions

use crate::core::{BuildConfig, ErrorPolicy};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

/// Build a site
#[derive(Debug, Args, Clone, Default)]
pub struct BuildCommand {
    /// Path to build YAML file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Glob selecting the input files (overrides the config file)
    #[arg(short, long)]
    pub source: Option<String>,

    /// Output directory, relative to the base directory
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Base directory
    #[arg(long)]
    pub base: Option<PathBuf>,

    /// Keep running and rebuild when sources change
    #[arg(short, long)]
    pub watch: bool,

    /// Minimum milliseconds between rebuilds
    #[arg(long)]
    pub debounce_ms: Option<u64>,

    /// Rewrite page.html to page/index.html
    #[arg(long)]
    pub clean_urls: bool,

    /// Write gzipped copies of text assets next to them
    #[arg(long)]
    pub gzip: bool,

    /// Stop at the first failing stage
    #[arg(long)]
    pub abort_on_error: bool,
}

impl BuildCommand {
    /// Merge the config file (if any) with the command-line overrides
    pub fn resolve(&self) -> Result<BuildConfig> {
        let mut config = match (&self.config, &self.source) {
            (Some(path), _) => BuildConfig::from_file(path)
                .with_context(|| format!("Failed to load build config {}", path.display()))?,
            (None, Some(source)) => BuildConfig::new(source.clone()),
            (None, None) => anyhow::bail!("Either --config or --source is required"),
        };

        if let Some(source) = &self.source {
            config.source = source.clone();
        }
        if let Some(out) = &self.out {
            config.output = out.clone();
        }
        if let Some(base) = &self.base {
            config.base = base.clone();
        }
        if let Some(debounce_ms) = self.debounce_ms {
            config.debounce_ms = debounce_ms;
        }
        config.watch |= self.watch;
        config.clean_urls |= self.clean_urls;
        config.gzip |= self.gzip;
        if self.abort_on_error {
            config.on_stage_error = ErrorPolicy::Abort;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Validate a build configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to build YAML file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.yaml");
        std::fs::write(&path, "source: \"content/**/*\"\noutput: public\n").unwrap();

        let cmd = BuildCommand {
            config: Some(path),
            out: Some(PathBuf::from("dist")),
            debounce_ms: Some(100),
            abort_on_error: true,
            ..Default::default()
        };
        let config = cmd.resolve().unwrap();
        assert_eq!(config.source, "content/**/*");
        assert_eq!(config.output, PathBuf::from("dist"));
        assert_eq!(config.debounce_ms, 100);
        assert_eq!(config.on_stage_error, ErrorPolicy::Abort);
    }

    #[test]
    fn test_source_without_config() {
        let cmd = BuildCommand {
            source: Some("*.md".to_string()),
            ..Default::default()
        };
        assert_eq!(cmd.resolve().unwrap().source, "*.md");
    }

    #[test]
    fn test_missing_source_is_an_error() {
        assert!(BuildCommand::default().resolve().is_err());
    }
}
