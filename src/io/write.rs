//! Writing items to disk

use crate::core::Stage;
use crate::io::FileItem;
use anyhow::Context;
use std::path::PathBuf;
use tracing::info;

/// MAP_SERIES stage writing every item to `base/dir/filename`
///
/// Items are written one at a time; the summary is logged once the last
/// item of the sequence is on disk.
pub fn write(dir: impl Into<PathBuf>) -> Stage<FileItem> {
    let dir = dir.into();
    Stage::map_series(move |mut file: FileItem, files: std::sync::Arc<[FileItem]>, ctx| {
        let target = ctx.base().join(&dir).join(&file.filename);
        async move {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            tokio::fs::write(&target, &file.contents)
                .await
                .with_context(|| format!("Failed to write {}", target.display()))?;

            let is_last = files
                .last()
                .is_some_and(|last| last.filename == file.filename);
            if is_last {
                info!("Wrote {} files to disk", files.len());
            }

            file.path = target;
            Ok(file)
        }
    })
    .named("write")
}
