//! YAML front matter

use crate::core::Stage;
use crate::io::FileItem;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::warn;

fn block() -> &'static Regex {
    static BLOCK: OnceLock<Regex> = OnceLock::new();
    BLOCK.get_or_init(|| {
        Regex::new(r"(?s)\A---[ \t]*\r?\n(.*?)(?:\r?\n)?---[ \t]*(?:\r?\n|\z)(.*)\z")
            .expect("front matter pattern is valid")
    })
}

/// Split a leading `---` block off `text`, returning the block and the body
pub fn split(text: &str) -> Option<(&str, &str)> {
    let captures = block().captures(text)?;
    let yaml = captures.get(1).map_or("", |m| m.as_str());
    let body = captures.get(2).map_or("", |m| m.as_str());
    Some((yaml, body))
}

/// Parse the front matter of one item into its data and strip it from the
/// contents. Items that are not UTF-8 or carry no block are left alone.
pub fn apply(file: &mut FileItem) -> anyhow::Result<()> {
    let Some(text) = file.text() else {
        return Ok(());
    };
    let Some((yaml, body)) = split(text) else {
        return Ok(());
    };

    let data: Map<String, Value> = if yaml.trim().is_empty() {
        Map::new()
    } else {
        serde_yaml::from_str(yaml)?
    };
    let body = body.as_bytes().to_vec();

    file.data.extend(data);
    file.contents = body;
    Ok(())
}

/// ALL stage applying [`apply`] to every item
pub fn frontmatter() -> Stage<FileItem> {
    Stage::all(|mut files: Vec<FileItem>, _| async move {
        for file in files.iter_mut() {
            if let Err(e) = apply(file) {
                warn!("Invalid front matter in {}: {}", file.filename, e);
            }
        }
        Ok(files)
    })
    .named("frontmatter")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_front_matter_is_parsed_and_stripped() {
        let mut file = FileItem::with_contents(
            "post.md",
            "---\ntitle: Hello\ntags: [a, b]\n---\n# Body\n",
        );
        apply(&mut file).unwrap();
        assert_eq!(file.get("title"), Some(&json!("Hello")));
        assert_eq!(file.get("tags"), Some(&json!(["a", "b"])));
        assert_eq!(file.text(), Some("# Body\n"));
    }

    #[test]
    fn test_empty_block() {
        let mut file = FileItem::with_contents("post.md", "---\n---\nbody");
        apply(&mut file).unwrap();
        assert!(file.data.is_empty());
        assert_eq!(file.text(), Some("body"));
    }

    #[test]
    fn test_without_block_contents_are_untouched() {
        let mut file = FileItem::with_contents("post.md", "no front matter\n---\n");
        apply(&mut file).unwrap();
        assert_eq!(file.text(), Some("no front matter\n---\n"));
    }

    #[test]
    fn test_binary_contents_are_skipped() {
        let mut file = FileItem::with_contents("logo.png", vec![0xff, 0xd8, 0xff]);
        apply(&mut file).unwrap();
        assert_eq!(file.contents, vec![0xff, 0xd8, 0xff]);
    }
}
