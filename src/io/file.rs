//! File item - the record flowing through content pipelines

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// One file of a content pipeline
///
/// `filename` is the identity of the item: a `/`-separated path relative to
/// the pipeline base (or to the output directory once written).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileItem {
    pub filename: String,

    /// Where the file lives on disk, once read or written
    pub path: PathBuf,

    #[serde(skip)]
    pub contents: Vec<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,

    /// Free-form attachments (front matter, collection, computed paths)
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl FileItem {
    /// An unread item for `path`, named relative to `base`
    pub fn at(base: &Path, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            filename: relative_name(base, &path),
            path,
            ..Self::default()
        }
    }

    /// An in-memory item, not backed by any file
    pub fn with_contents(filename: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            contents: contents.into(),
            ..Self::default()
        }
    }

    /// Read contents and modification time from disk
    pub async fn load(mut self) -> Result<Self> {
        self.contents = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let meta = tokio::fs::metadata(&self.path)
            .await
            .with_context(|| format!("Failed to stat {}", self.path.display()))?;
        self.modified = meta.modified().ok().map(DateTime::<Utc>::from);
        Ok(self)
    }

    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.contents).ok()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// File name without its directories
    pub fn basename(&self) -> &str {
        self.filename.rsplit('/').next().unwrap_or(&self.filename)
    }
}

/// `path` relative to `base`, with forward slashes
pub fn relative_name(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_is_relative_to_base() {
        let item = FileItem::at(Path::new("/site"), "/site/posts/hello.md");
        assert_eq!(item.filename, "posts/hello.md");
        assert_eq!(item.basename(), "hello.md");
    }

    #[test]
    fn test_serialized_item_omits_contents() {
        let mut item = FileItem::with_contents("index.html", "<h1>hi</h1>");
        item.set("title", "Home");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["filename"], "index.html");
        assert_eq!(json["data"]["title"], "Home");
        assert!(json.get("contents").is_none());
    }
}
