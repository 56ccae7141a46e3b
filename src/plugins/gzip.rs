//! Precompressed copies of text assets

use crate::core::Stage;
use crate::io::{compile_glob, FileItem};
use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

/// Files worth compressing
pub const COMPRESSIBLE: &str = "**/*.{html,css,js,json,xml,svg,txt}";

/// Gzip `contents` at the default level
pub fn compress(contents: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(contents)?;
    Ok(encoder.finish()?)
}

/// A `.gz` sibling of `file` holding its compressed contents
fn zipped(file: &FileItem) -> Result<FileItem> {
    let contents =
        compress(&file.contents).with_context(|| format!("Failed to gzip {}", file.filename))?;
    let mut path = file.path.clone().into_os_string();
    path.push(".gz");
    Ok(FileItem {
        filename: format!("{}.gz", file.filename),
        path: PathBuf::from(path),
        contents,
        ..file.clone()
    })
}

/// ALL stage appending a gzipped copy of every compressible item
pub fn gzip() -> Stage<FileItem> {
    Stage::all(|mut files: Vec<FileItem>, _| async move {
        let matcher = compile_glob(COMPRESSIBLE)?;
        let selected: Vec<FileItem> = files
            .iter()
            .filter(|file| matcher.is_match(&file.filename))
            .cloned()
            .collect();

        let siblings = tokio::task::spawn_blocking(move || {
            selected.iter().map(zipped).collect::<Result<Vec<_>>>()
        })
        .await??;
        debug!("Compressed {} files", siblings.len());

        files.extend(siblings);
        Ok(files)
    })
    .named("gzip")
}
