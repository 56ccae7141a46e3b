//! Output paths and links for pages

use crate::core::Stage;
use crate::io::FileItem;
use regex::Regex;
use serde_json::json;
use std::sync::OnceLock;

fn html_suffix() -> &'static Regex {
    static HTML: OnceLock<Regex> = OnceLock::new();
    HTML.get_or_init(|| Regex::new(r"\.html$").expect("html suffix pattern is valid"))
}

/// `about.html` becomes `about/index.html`; index pages stay where they are
pub fn clean_url(filename: &str) -> String {
    let basename = filename.rsplit('/').next().unwrap_or(filename);
    if basename == "index.html" {
        return filename.to_string();
    }
    html_suffix().replace(filename, "/index.html").into_owned()
}

/// Rewrite the filename when `clean` and attach `path`, `dhref` and `href`
pub fn apply(file: &mut FileItem, clean: bool) {
    if clean {
        file.filename = clean_url(&file.filename);
    }

    let (dir, base) = match file.filename.rsplit_once('/') {
        Some((dir, base)) => (dir.to_string(), base.to_string()),
        None => (String::new(), file.filename.clone()),
    };
    let (name, ext) = match base.rsplit_once('.') {
        Some((name, ext)) if !name.is_empty() => (name.to_string(), format!(".{}", ext)),
        _ => (base.clone(), String::new()),
    };
    let href = if dir.is_empty() {
        base.clone()
    } else {
        format!("{}/{}", dir, base)
    };

    file.set(
        "path",
        json!({ "dir": dir, "base": base, "name": name, "ext": ext }),
    );
    file.set("dhref", dir);
    file.set("href", href);
}

/// MAP stage applying [`apply`] to every item
pub fn paths(clean: bool) -> Stage<FileItem> {
    Stage::map(move |mut file: FileItem, _, _| async move {
        apply(&mut file, clean);
        Ok(file)
    })
    .named("paths")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_url() {
        assert_eq!(clean_url("about.html"), "about/index.html");
        assert_eq!(clean_url("blog/post.html"), "blog/post/index.html");
        assert_eq!(clean_url("blog/index.html"), "blog/index.html");
        assert_eq!(clean_url("style.css"), "style.css");
    }

    #[test]
    fn test_links_for_clean_page() {
        let mut file = FileItem::with_contents("blog/post.html", "");
        apply(&mut file, true);
        assert_eq!(file.filename, "blog/post/index.html");
        assert_eq!(file.get("dhref"), Some(&json!("blog/post")));
        assert_eq!(file.get("href"), Some(&json!("blog/post/index.html")));
        assert_eq!(file.get("path").unwrap()["name"], "index");
        assert_eq!(file.get("path").unwrap()["ext"], ".html");
    }

    #[test]
    fn test_links_without_clean_urls() {
        let mut file = FileItem::with_contents("about.html", "");
        apply(&mut file, false);
        assert_eq!(file.filename, "about.html");
        assert_eq!(file.get("dhref"), Some(&json!("")));
        assert_eq!(file.get("href"), Some(&json!("about.html")));
    }
}
