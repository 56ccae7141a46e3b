//! Content collaborators that work on item data rather than markup

pub mod collections;
pub mod gzip;
pub mod paths;

pub use collections::{collections, CollectionSpec};
pub use gzip::gzip;
pub use paths::{clean_url, paths};
