//! Seeding a pipeline from a JSON endpoint

use crate::core::Stage;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

const TIMEOUT: Duration = Duration::from_secs(30);

/// GET `url` and decode the body as a JSON array of items
pub async fn fetch_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<T>> {
    let items: Vec<T> = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Request to {} failed", url))?
        .error_for_status()
        .with_context(|| format!("Request to {} was rejected", url))?
        .json()
        .await
        .with_context(|| format!("Response from {} is not a JSON array of items", url))?;
    debug!("Fetched {} items from {}", items.len(), url);
    Ok(items)
}

/// FROM stage producing the items served as a JSON array at `url`
pub fn fetch<T>(url: impl Into<String>) -> Stage<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    let url = url.into();
    Stage::source(move |_| {
        let url = url.clone();
        async move {
            let client = reqwest::Client::builder().timeout(TIMEOUT).build()?;
            fetch_json(&client, &url).await
        }
    })
    .named("fetch")
}
