//! Watch mode source

use crate::core::{Stage, StageContext};
use crate::execution::{RebuildScheduler, DEFAULT_DEBOUNCE};
use crate::io::{enumerate, frontmatter, strip_glob_base, FileItem, Selection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// ALL stage that reads every selected file on the first run and keeps
/// watching them; later runs, triggered by the watch, only read the files
/// that changed. Ignored directories are neither read nor watched.
pub fn watch(selection: impl Into<Selection>) -> Stage<FileItem> {
    watch_with(selection, DEFAULT_DEBOUNCE)
}

/// [`watch`] with a custom debounce window
pub fn watch_with(selection: impl Into<Selection>, window: Duration) -> Stage<FileItem> {
    let selection = selection.into();
    let scheduler: Arc<OnceCell<RebuildScheduler>> = Arc::new(OnceCell::new());

    Stage::all(move |mut files: Vec<FileItem>, ctx: StageContext| {
        let selection = selection.clone();
        let scheduler = Arc::clone(&scheduler);
        async move {
            ctx.metadata().insert("watch", true).await;

            let base = ctx.base().canonicalize().unwrap_or_else(|_| ctx.base().to_path_buf());
            let scheduler = scheduler
                .get_or_try_init(|| async {
                    let scheduler = RebuildScheduler::new(&base)
                        .with_window(window)
                        .with_pattern(selection.pattern())?;
                    Ok::<_, anyhow::Error>(
                        selection
                            .ignored()
                            .iter()
                            .fold(scheduler, |scheduler, dir| scheduler.with_ignore(dir)),
                    )
                })
                .await?;

            let paths = if scheduler.start(&ctx) {
                let base = base.clone();
                let selection = selection.clone();
                tokio::task::spawn_blocking(move || enumerate(&base, &selection)).await??
            } else {
                scheduler.take_active()
            };
            debug!("Watch reading {} files", paths.len());

            files.extend(read_all(&base, paths).await.into_iter().map(|mut file| {
                file.filename = strip_glob_base(&file.filename, selection.pattern());
                file
            }));
            Ok(files)
        }
    })
    .named("watch")
}

/// Read every non-hidden path, skipping the ones that cannot be read
async fn read_all(base: &Path, paths: Vec<PathBuf>) -> Vec<FileItem> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = FileItem::at(base, path);
        if file.basename().starts_with('.') {
            continue;
        }
        match file.load().await {
            Ok(mut file) => {
                if let Err(e) = frontmatter::apply(&mut file) {
                    warn!("Invalid front matter in {}: {}", file.filename, e);
                }
                files.push(file);
            }
            Err(e) => warn!("Skipping changed file: {:#}", e),
        }
    }
    files
}
