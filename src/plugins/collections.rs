//! Named collections of items, published through pipeline metadata

use crate::core::{Stage, StageContext};
use crate::io::{compile_glob, FileItem};
use anyhow::Result;
use globset::GlobMatcher;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

const DEFAULT_SORT_BY: &str = "date";

/// How one collection is selected: a bare glob, or a glob with ordering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CollectionSpec {
    Pattern(String),
    Detailed {
        pattern: String,
        #[serde(default = "default_sort_by")]
        sort_by: Option<String>,
        #[serde(default = "default_reverse")]
        reverse: bool,
    },
}

fn default_sort_by() -> Option<String> {
    Some(DEFAULT_SORT_BY.to_string())
}

fn default_reverse() -> bool {
    true
}

impl CollectionSpec {
    pub fn pattern(&self) -> &str {
        match self {
            CollectionSpec::Pattern(pattern) => pattern,
            CollectionSpec::Detailed { pattern, .. } => pattern,
        }
    }

    /// Data key the collection is ordered by
    pub fn sort_by(&self) -> Option<&str> {
        match self {
            CollectionSpec::Pattern(_) => Some(DEFAULT_SORT_BY),
            CollectionSpec::Detailed { sort_by, .. } => sort_by.as_deref(),
        }
    }

    /// Newest (largest) first
    pub fn reverse(&self) -> bool {
        match self {
            CollectionSpec::Pattern(_) => default_reverse(),
            CollectionSpec::Detailed { reverse, .. } => *reverse,
        }
    }
}

struct Collection {
    spec: Option<CollectionSpec>,
    matcher: Option<GlobMatcher>,
    members: BTreeMap<String, FileItem>,
}

impl Collection {
    fn sorted(&self) -> Vec<&FileItem> {
        let mut members: Vec<&FileItem> = self.members.values().collect();
        let Some(spec) = &self.spec else {
            return members;
        };
        if let Some(key) = spec.sort_by() {
            members.sort_by(|a, b| compare_values(a.get(key), b.get(key)));
        }
        if spec.reverse() {
            members.reverse();
        }
        members
    }
}

/// ALL stage grouping items into named collections.
///
/// An item's own `collection` data wins over the configured patterns.
/// Membership is kept across runs, so a rebuild that only sees the changed
/// files still publishes complete collections under
/// `metadata["collections"]`. The sequence itself passes through unchanged.
pub fn collections(specs: BTreeMap<String, CollectionSpec>) -> Result<Stage<FileItem>> {
    let mut store = BTreeMap::new();
    for (name, spec) in specs {
        let matcher = compile_glob(spec.pattern())?;
        store.insert(
            name,
            Collection {
                spec: Some(spec),
                matcher: Some(matcher),
                members: BTreeMap::new(),
            },
        );
    }
    let store = Arc::new(Mutex::new(store));

    Ok(Stage::all(move |files: Vec<FileItem>, ctx: StageContext| {
        let store = Arc::clone(&store);
        async move {
            let mut store = store.lock().await;
            for file in &files {
                match file.get("collection").and_then(Value::as_str) {
                    Some(name) => {
                        store
                            .entry(name.to_string())
                            .or_insert_with(|| Collection {
                                spec: None,
                                matcher: None,
                                members: BTreeMap::new(),
                            })
                            .members
                            .insert(file.filename.clone(), file.clone());
                    }
                    None => {
                        for collection in store.values_mut() {
                            let matched = collection
                                .matcher
                                .as_ref()
                                .is_some_and(|m| m.is_match(&file.filename));
                            if matched {
                                collection
                                    .members
                                    .insert(file.filename.clone(), file.clone());
                            }
                        }
                    }
                }
            }

            let mut published = Map::new();
            for (name, collection) in store.iter() {
                let members = collection
                    .sorted()
                    .into_iter()
                    .map(serde_json::to_value)
                    .collect::<serde_json::Result<Vec<_>>>()?;
                debug!("Collection {} has {} items", name, members.len());
                published.insert(name.clone(), Value::Array(members));
            }
            ctx.metadata().insert("collections", published).await;

            Ok(files)
        }
    })
    .named("collections"))
}

/// Order two optional data values; missing values sort first
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}
