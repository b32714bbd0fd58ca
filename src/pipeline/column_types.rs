//! Column type estimation: the most frequent types seen per column so far.
//! The type-constrained and datatype stages use these to scope queries.

use std::collections::BTreeMap;

use super::aggregate::FirstSeenCounter;
use super::types::Evidence;
use crate::kg::terminal_id;

pub const TYPES_PER_COLUMN: usize = 2;

/// Top estimated types per column of one table, reduced to bare identifiers
/// ready for embedding in queries.
pub fn estimate_column_types(evidence: &Evidence, table: &str) -> BTreeMap<usize, Vec<String>> {
    let mut counters: BTreeMap<usize, FirstSeenCounter<String>> = BTreeMap::new();
    for vote in &evidence.type_votes {
        if vote.table != table {
            continue;
        }
        counters
            .entry(vote.column)
            .or_default()
            .add(terminal_id(&vote.class_uri).to_string());
    }
    counters
        .into_iter()
        .map(|(column, counter)| {
            let types = counter
                .top(TYPES_PER_COLUMN)
                .into_iter()
                .map(|(id, _)| id)
                .collect();
            (column, types)
        })
        .collect()
}
