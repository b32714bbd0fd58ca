//! Vote aggregation: collapses accumulated evidence into one annotation per
//! key by frequency, with first-seen order breaking ties.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use tracing::warn;

use super::types::{
    Annotations, EntityAnnotation, EntityTargets, Evidence, PropertyAnnotation, PropertyTargets,
    TypeAnnotation, TypeTargets,
};
use crate::kg::{terminal_id, KnowledgeSource, GENERIC_ROOT_CLASS};
use crate::TARGET_PIPELINE;

/// A frequency counter that remembers insertion order, so equally frequent
/// keys rank by when they were first seen.
#[derive(Debug)]
pub struct FirstSeenCounter<K> {
    counts: HashMap<K, usize>,
    order: Vec<K>,
}

impl<K: Eq + Hash + Clone> FirstSeenCounter<K> {
    pub fn new() -> Self {
        FirstSeenCounter {
            counts: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn add(&mut self, key: K) {
        use std::collections::hash_map::Entry;
        match self.counts.entry(key) {
            Entry::Occupied(mut entry) => *entry.get_mut() += 1,
            Entry::Vacant(entry) => {
                self.order.push(entry.key().clone());
                entry.insert(1);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The `n` most frequent keys with their counts. The sort is stable, so
    /// ties stay in first-seen order.
    pub fn top(&self, n: usize) -> Vec<(K, usize)> {
        let mut entries: Vec<(K, usize)> = self
            .order
            .iter()
            .map(|key| (key.clone(), self.counts.get(key).copied().unwrap_or(0)))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.truncate(n);
        entries
    }

    pub fn leader(&self) -> Option<K> {
        self.top(1).into_iter().next().map(|(key, _)| key)
    }
}

impl<K: Eq + Hash + Clone> Default for FirstSeenCounter<K> {
    fn default() -> Self {
        FirstSeenCounter::new()
    }
}

/// One predicate per (table, subject column, column) group. A populated
/// target set drops groups outside it.
pub fn aggregate_properties(
    evidence: &Evidence,
    targets: Option<&PropertyTargets>,
) -> Vec<PropertyAnnotation> {
    let mut groups: BTreeMap<(String, usize, usize), FirstSeenCounter<String>> = BTreeMap::new();
    for vote in &evidence.property_votes {
        let key = (vote.table.clone(), vote.subject_column, vote.column);
        if let Some(targets) = targets {
            if !targets.contains(&key) {
                continue;
            }
        }
        groups.entry(key).or_default().add(vote.predicate.clone());
    }
    groups
        .into_iter()
        .filter_map(|((table, subject_column, column), counter)| {
            counter.leader().map(|predicate| PropertyAnnotation {
                table,
                subject_column,
                column,
                predicate,
            })
        })
        .collect()
}

/// One entity per (table, row, column) group.
pub fn aggregate_entities(
    evidence: &Evidence,
    targets: Option<&EntityTargets>,
) -> Vec<EntityAnnotation> {
    let mut groups: BTreeMap<(String, usize, usize), FirstSeenCounter<String>> = BTreeMap::new();
    for vote in &evidence.entity_votes {
        let key = (vote.table.clone(), vote.row, vote.column);
        if let Some(targets) = targets {
            if !targets.contains(&key) {
                continue;
            }
        }
        groups.entry(key).or_default().add(vote.entity.clone());
    }
    groups
        .into_iter()
        .filter_map(|((table, row, column), counter)| {
            counter.leader().map(|entity| EntityAnnotation {
                table,
                row,
                column,
                entity,
            })
        })
        .collect()
}

/// One class per (table, column) group, counted over type votes. A two-way
/// frequency tie resolves through the nearest common superclass; three or
/// more tied types skip the column.
pub async fn aggregate_types<S: KnowledgeSource>(
    source: &S,
    evidence: &Evidence,
    targets: Option<&TypeTargets>,
) -> Vec<TypeAnnotation> {
    let mut groups: BTreeMap<(String, usize), FirstSeenCounter<String>> = BTreeMap::new();
    for vote in &evidence.type_votes {
        let key = (vote.table.clone(), vote.column);
        if let Some(targets) = targets {
            if !targets.contains(&key) {
                continue;
            }
        }
        groups.entry(key).or_default().add(vote.class_uri.clone());
    }

    let mut annotations = Vec::new();
    for ((table, column), counter) in groups {
        let Some(class_uri) = resolve_column_type(source, &table, column, &counter).await else {
            continue;
        };
        annotations.push(TypeAnnotation {
            table,
            column,
            class_uri,
        });
    }
    annotations
}

async fn resolve_column_type<S: KnowledgeSource>(
    source: &S,
    table: &str,
    column: usize,
    counter: &FirstSeenCounter<String>,
) -> Option<String> {
    let top = counter.top(3);
    match top.as_slice() {
        [] => None,
        [(class_uri, _)] => Some(class_uri.clone()),
        [(first, first_count), (second, second_count), rest @ ..] => {
            if rest.first().is_some_and(|(_, count)| count == first_count) {
                warn!(
                    target: TARGET_PIPELINE,
                    "more than two tied types for {table} column {column}, skipping"
                );
                return None;
            }
            if first_count > second_count {
                return Some(first.clone());
            }
            match source.common_class(first, second).await {
                // The root of the hierarchy says nothing about the column.
                Some(ancestor) if terminal_id(&ancestor) == GENERIC_ROOT_CLASS => {
                    Some(first.clone())
                }
                Some(ancestor) => Some(ancestor),
                None => Some(first.clone()),
            }
        }
    }
}

/// Runs all three reductions against the evidence.
pub async fn finalize<S: KnowledgeSource>(
    source: &S,
    evidence: &Evidence,
    property_targets: Option<&PropertyTargets>,
    entity_targets: Option<&EntityTargets>,
    type_targets: Option<&TypeTargets>,
) -> Annotations {
    Annotations {
        properties: aggregate_properties(evidence, property_targets),
        entities: aggregate_entities(evidence, entity_targets),
        types: aggregate_types(source, evidence, type_targets).await,
    }
}
