//! File enumeration and the FROM / FILTER stages built on it

use crate::core::Stage;
use crate::io::FileItem;
use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Leading directories of `pattern` that contain no glob syntax
///
/// `posts/**/*.md` has base `posts`, `*.md` has an empty base.
pub fn glob_base(pattern: &str) -> &str {
    let literal = pattern.find(GLOB_META).unwrap_or(pattern.len());
    pattern[..literal].rfind('/').map_or("", |i| &pattern[..i])
}

/// Compile a glob where `*` stays within one path component
pub fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .with_context(|| format!("Invalid glob: {}", pattern))?;
    Ok(glob.compile_matcher())
}

/// Rename `filename` so it is relative to the base of `pattern`
pub fn strip_glob_base(filename: &str, pattern: &str) -> String {
    let base = glob_base(pattern);
    let stripped = if base.is_empty() || base == "." {
        filename
    } else {
        filename.strip_prefix(base).unwrap_or(filename)
    };
    stripped.trim_start_matches('/').to_string()
}

/// Files to pick up under a base directory: a glob, minus ignored directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pattern: String,
    ignore: Vec<PathBuf>,
}

impl Selection {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ignore: Vec::new(),
        }
    }

    /// Skip everything under `dir`, relative to the base
    pub fn ignoring(mut self, dir: impl AsRef<Path>) -> Self {
        let dir: PathBuf = dir
            .as_ref()
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        if !dir.as_os_str().is_empty() {
            self.ignore.push(dir);
        }
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Ignored directories, relative to the base
    pub fn ignored(&self) -> &[PathBuf] {
        &self.ignore
    }

    fn is_ignored(&self, relative: &Path) -> bool {
        self.ignore.iter().any(|dir| relative.starts_with(dir))
    }
}

impl From<&str> for Selection {
    fn from(pattern: &str) -> Self {
        Self::new(pattern)
    }
}

impl From<String> for Selection {
    fn from(pattern: String) -> Self {
        Self::new(pattern)
    }
}

/// Every file under `base` matching `selection`, in path order
pub fn enumerate(base: &Path, selection: &Selection) -> Result<Vec<PathBuf>> {
    let matcher = compile_glob(&selection.pattern)?;
    let start = base.join(glob_base(&selection.pattern));
    if !start.exists() {
        return Ok(Vec::new());
    }

    let relative = |path: &Path| path.strip_prefix(base).unwrap_or(path).to_path_buf();
    let mut files = Vec::new();
    for entry in WalkDir::new(&start)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !selection.is_ignored(&relative(e.path())))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if matcher.is_match(relative(entry.path())) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// FROM stage: one unread item per selected file under the base
pub fn source(selection: impl Into<Selection>) -> Stage<FileItem> {
    let selection = selection.into();
    Stage::source(move |ctx| {
        let selection = selection.clone();
        let base = ctx.base().to_path_buf();
        async move {
            let paths = {
                let base = base.clone();
                tokio::task::spawn_blocking(move || enumerate(&base, &selection)).await??
            };
            Ok(paths
                .into_iter()
                .map(|path| FileItem::at(&base, path))
                .collect())
        }
    })
    .named("source")
}

/// FILTER stage dropping hidden files
pub fn dotfiles() -> Stage<FileItem> {
    Stage::filter(|file: FileItem, _, _| async move { Ok(!file.basename().starts_with('.')) })
        .named("dotfiles")
}
