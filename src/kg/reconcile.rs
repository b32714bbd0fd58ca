//! Suggestion services consulted when a label finds nothing in the graph:
//! the entity search API proposes alternate labels, and the reconciliation
//! service proposes a single best-guess name. Both are best effort, so
//! failures degrade to empty results.

use serde::Deserialize;
use tracing::debug;

use super::client::KgClient;
use super::types::SUGGEST_TIMEOUT;
use crate::TARGET_KG_REQUEST;

pub const ALTERNATE_LIMIT: usize = 3;

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    label: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReconcileResponse {
    #[serde(default)]
    result: Vec<ReconcileCandidate>,
}

#[derive(Debug, Deserialize)]
struct ReconcileCandidate {
    name: Option<String>,
}

/// Labels of the closest entities by search relevance.
pub async fn alternate_labels(client: &KgClient, endpoint: &str, label: &str) -> Vec<String> {
    let limit = ALTERNATE_LIMIT.to_string();
    let params = [
        ("action", "wbsearchentities"),
        ("search", label),
        ("language", "en"),
        ("format", "json"),
        ("limit", limit.as_str()),
    ];
    match client.get_json(endpoint, &params, SUGGEST_TIMEOUT).await {
        Ok(value) => match serde_json::from_value::<SearchResponse>(value) {
            Ok(response) => response
                .search
                .into_iter()
                .filter_map(|hit| hit.label)
                .collect(),
            Err(error) => {
                debug!(
                    target: TARGET_KG_REQUEST,
                    "malformed entity search response for \"{label}\": {error}"
                );
                Vec::new()
            }
        },
        Err(error) => {
            debug!(target: TARGET_KG_REQUEST, "entity search failed for \"{label}\": {error}");
            Vec::new()
        }
    }
}

/// The best name the reconciliation service proposes, if any.
pub async fn best_guess(client: &KgClient, endpoint: &str, label: &str) -> Option<String> {
    let params = [("query", label)];
    match client.get_json(endpoint, &params, SUGGEST_TIMEOUT).await {
        Ok(value) => serde_json::from_value::<ReconcileResponse>(value)
            .ok()
            .and_then(|response| response.result.into_iter().next())
            .and_then(|candidate| candidate.name),
        Err(error) => {
            debug!(target: TARGET_KG_REQUEST, "reconciliation failed for \"{label}\": {error}");
            None
        }
    }
}
