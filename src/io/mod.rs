//! File collaborators: enumerate, read, parse, write and watch files, plus
//! fetching items over HTTP

pub mod fetch;
pub mod file;
pub mod frontmatter;
pub mod read;
pub mod source;
pub mod watch;
pub mod write;

pub use fetch::fetch;
pub use file::FileItem;
pub use frontmatter::frontmatter;
pub use read::{load, read, read_file, read_matching};
pub use source::{
    compile_glob, dotfiles, enumerate, glob_base, source, strip_glob_base, Selection,
};
pub use watch::{watch, watch_with};
pub use write::write;
