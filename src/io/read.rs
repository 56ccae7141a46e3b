//! Reading files into items

use crate::core::{ErrorPolicy, Stage, StageContext};
use crate::execution::Pipeline;
use crate::io::{dotfiles, frontmatter, source, strip_glob_base, FileItem, Selection};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Read one file under `base` into an item named relative to `base`
pub async fn read_file(base: &Path, path: impl Into<PathBuf>) -> Result<FileItem> {
    FileItem::at(base, path).load().await
}

/// MAP stage filling in contents and modification time of every item
pub fn load() -> Stage<FileItem> {
    Stage::map(|file: FileItem, _, _| file.load()).named("load")
}

/// Read files into items.
///
/// With a glob, every matching non-hidden file is read, its front matter
/// parsed, its filename made relative to the glob's base, and the result
/// appended to the incoming items. Without one, the incoming items
/// themselves are read and replace the sequence.
pub fn read(pattern: Option<&str>) -> Stage<FileItem> {
    read_stage(pattern.map(Selection::from))
}

/// [`read`] with a glob that may leave out some directories
pub fn read_matching(selection: impl Into<Selection>) -> Stage<FileItem> {
    read_stage(Some(selection.into()))
}

fn read_stage(selection: Option<Selection>) -> Stage<FileItem> {
    Stage::all(move |files: Vec<FileItem>, ctx: StageContext| {
        let selection = selection.clone();
        async move {
            let nested = Pipeline::new(ctx.base()).named("read").with_error_policy(ErrorPolicy::Abort);
            let nested = match &selection {
                Some(selection) => nested.append(source(selection.clone()))?,
                None => {
                    let incoming = files.clone();
                    nested.from(move |_| {
                        let incoming = incoming.clone();
                        async move { Ok(incoming) }
                    })
                }
            };
            let read = nested
                .append(dotfiles())?
                .append(load())?
                .append(frontmatter())?
                .run()
                .await?
                .into_sequence(crate::core::OperationKind::All)?;

            Ok(match selection {
                Some(selection) => files
                    .into_iter()
                    .chain(read.into_iter().map(|mut file| {
                        file.filename = strip_glob_base(&file.filename, selection.pattern());
                        file
                    }))
                    .collect(),
                None => read,
            })
        }
    })
    .named("read")
}
