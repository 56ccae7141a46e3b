//! Assembling a content pipeline from a build configuration

use crate::core::BuildConfig;
use crate::execution::Pipeline;
use crate::io::{self, FileItem, Selection};
use crate::plugins;
use anyhow::Result;

/// Build the pipeline described by `config`:
/// read (or watch) → collections → paths → gzip → write
pub fn pipeline(config: &BuildConfig) -> Result<Pipeline<FileItem>> {
    config.validate()?;

    // Never read back what a previous build wrote
    let selection = Selection::new(config.source.as_str()).ignoring(&config.output);
    let input = if config.watch {
        io::watch_with(selection, config.debounce())
    } else {
        io::read_matching(selection)
    };

    let mut pipeline = Pipeline::new(&config.base)
        .named(config.name.as_str())
        .with_error_policy(config.on_stage_error)
        .append(input)?;

    if !config.collections.is_empty() {
        pipeline = pipeline.append(plugins::collections(config.collections.clone())?)?;
    }

    pipeline = pipeline.append(plugins::paths(config.clean_urls))?;
    if config.gzip {
        pipeline = pipeline.append(plugins::gzip())?;
    }

    Ok(pipeline.append(io::write(&config.output))?)
}
