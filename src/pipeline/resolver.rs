//! The primary resolution stage: each row is resolved through its subject
//! cell, and every other column is matched against the statements of the
//! subject's candidates.

use std::collections::{BTreeSet, HashSet};
use std::hash::Hash;

use tracing::debug;

use super::aggregate::FirstSeenCounter;
use super::types::{EntityVote, Evidence, PropertyVote, TypeVote, UnresolvedSubject};
use crate::kg::{normalize_predicate, CandidateBinding, KnowledgeSource};
use crate::matcher::match_candidates;
use crate::table::Table;
use crate::TARGET_PIPELINE;

/// What the primary stage learned about one table: the rows still needing a
/// fallback, and the columns holding graph entities.
#[derive(Debug, Default)]
pub struct RowResolution {
    pub unresolved_rows: Vec<usize>,
    pub entity_columns: Vec<usize>,
}

/// First occurrence of each item, in input order.
pub(crate) fn distinct<T: Eq + Hash + Clone>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
    out
}

/// Distinct (normalized predicate, subject) pairs of the bindings.
pub(crate) fn distinct_property_pairs(bindings: &[&CandidateBinding]) -> Vec<(String, String)> {
    distinct(
        bindings
            .iter()
            .map(|b| (normalize_predicate(&b.predicate), b.subject.clone())),
    )
}

pub(crate) fn distinct_subjects(bindings: &[&CandidateBinding]) -> Vec<String> {
    distinct(bindings.iter().map(|b| b.subject.clone()))
}

pub(crate) fn distinct_subject_types(bindings: &[&CandidateBinding]) -> Vec<String> {
    distinct(bindings.iter().filter_map(|b| b.subject_type.clone()))
}

/// Distinct graph-entity values and their types among the bindings.
pub(crate) fn entity_values(bindings: &[&CandidateBinding]) -> (Vec<String>, Vec<String>) {
    let graph: Vec<&CandidateBinding> = bindings
        .iter()
        .copied()
        .filter(|b| b.value_in_graph())
        .collect();
    (
        distinct(graph.iter().map(|b| b.value.clone())),
        distinct(graph.iter().filter_map(|b| b.value_type.clone())),
    )
}

/// The most frequently voted subject wins the row; property votes emitted
/// since `row_start` for any other subject are dropped. Entity votes are
/// left alone.
pub(crate) fn apply_majority_filter(
    property_votes: &mut Vec<PropertyVote>,
    row_start: usize,
    row_subjects: &[String],
) {
    let mut counter = FirstSeenCounter::new();
    for subject in row_subjects {
        counter.add(subject.clone());
    }
    let Some(winner) = counter.leader() else {
        return;
    };
    let tail = property_votes.split_off(row_start);
    property_votes.extend(tail.into_iter().filter(|vote| vote.subject == winner));
}

/// Resolves every data row of the table, appending votes to the evidence.
pub async fn resolve_rows<S: KnowledgeSource>(
    source: &S,
    table: &Table,
    evidence: &mut Evidence,
) -> RowResolution {
    let mut unresolved_rows = Vec::new();
    let mut entity_columns: BTreeSet<usize> = BTreeSet::new();

    for row in table.data_rows() {
        let Some(subject) = table.cell(row, 0) else {
            unresolved_rows.push(row);
            continue;
        };
        if subject.is_empty() {
            evidence.unresolved_subjects.push(UnresolvedSubject {
                table: table.name().to_string(),
                row,
                literal: String::new(),
            });
            unresolved_rows.push(row);
            continue;
        }

        let Some(candidates) = source.mention_with_alternates(subject).await else {
            debug!(
                target: TARGET_PIPELINE,
                "no candidates for \"{subject}\" in {} row {row}",
                table.name()
            );
            evidence.unresolved_subjects.push(UnresolvedSubject {
                table: table.name().to_string(),
                row,
                literal: subject.to_string(),
            });
            unresolved_rows.push(row);
            continue;
        };

        let row_start = evidence.property_votes.len();
        let mut row_subjects = Vec::new();
        let mut matched_columns = 0;

        for column in 1..table.column_count() {
            let Some(cell) = table.cell(row, column) else {
                continue;
            };
            let matched = match_candidates(&candidates, cell);
            if matched.is_empty() {
                continue;
            }

            let property_bindings: Vec<&CandidateBinding> = matched
                .iter()
                .copied()
                .filter(|b| b.predicate_in_graph() && !b.subject_is_statement())
                .collect();

            let pairs = distinct_property_pairs(&property_bindings);
            if !pairs.is_empty() {
                matched_columns += 1;
            }
            for (predicate, subject_entity) in pairs {
                evidence.property_votes.push(PropertyVote {
                    table: table.name().to_string(),
                    row,
                    subject_column: 0,
                    column,
                    predicate,
                    subject: subject_entity,
                    method: candidates.method,
                });
            }
            for subject_entity in distinct_subjects(&property_bindings) {
                row_subjects.push(subject_entity.clone());
                evidence.entity_votes.push(EntityVote {
                    table: table.name().to_string(),
                    row,
                    column: 0,
                    entity: subject_entity,
                    method: candidates.method,
                });
            }
            for class_uri in distinct_subject_types(&property_bindings) {
                evidence.type_votes.push(TypeVote {
                    table: table.name().to_string(),
                    column: 0,
                    class_uri,
                    method: candidates.method,
                });
            }

            let (values, value_types) = entity_values(&matched);
            if !values.is_empty() {
                entity_columns.insert(column);
            }
            for value in values {
                evidence.entity_votes.push(EntityVote {
                    table: table.name().to_string(),
                    row,
                    column,
                    entity: value,
                    method: candidates.method,
                });
            }
            for class_uri in value_types {
                evidence.type_votes.push(TypeVote {
                    table: table.name().to_string(),
                    column,
                    class_uri,
                    method: candidates.method,
                });
            }
        }

        apply_majority_filter(&mut evidence.property_votes, row_start, &row_subjects);

        if matched_columns + 1 < table.column_count() {
            unresolved_rows.push(row);
        }
    }

    RowResolution {
        unresolved_rows,
        entity_columns: entity_columns.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kg::entity_uri;
    use crate::pipeline::testing::{city_bindings, StubSource};
    use crate::pipeline::MatchMethod;

    fn table(rows: &[&[&str]]) -> Table {
        Table::from_rows(
            "cities",
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_row_fully_resolved() {
        let mut source = StubSource::default();
        source.add_mention("Paris", city_bindings("Q90", "Q142", "France", "2165423"));

        let table = table(&[&["col0", "col1", "col2"], &["Paris", "France", "2165423"]]);
        let mut evidence = Evidence::default();
        let resolution = resolve_rows(&source, &table, &mut evidence).await;

        assert!(resolution.unresolved_rows.is_empty());
        assert_eq!(resolution.entity_columns, vec![1]);

        // country and population properties, both for Q90
        assert_eq!(evidence.property_votes.len(), 2);
        assert!(evidence
            .property_votes
            .iter()
            .all(|vote| vote.subject == entity_uri("Q90")));
        assert_eq!(
            evidence.property_votes[0].predicate,
            "http://www.wikidata.org/prop/direct/P17"
        );
        // population predicate arrives statement-qualified and is normalized
        assert_eq!(
            evidence.property_votes[1].predicate,
            "http://www.wikidata.org/prop/direct/P1082"
        );

        // subject votes at column 0 for each matched column, value vote at column 1
        let subject_votes: Vec<&EntityVote> = evidence
            .entity_votes
            .iter()
            .filter(|vote| vote.column == 0)
            .collect();
        assert_eq!(subject_votes.len(), 2);
        let value_votes: Vec<&EntityVote> = evidence
            .entity_votes
            .iter()
            .filter(|vote| vote.column == 1)
            .collect();
        assert_eq!(value_votes.len(), 1);
        assert_eq!(value_votes[0].entity, entity_uri("Q142"));

        // subject type at column 0, value type at column 1
        assert!(evidence
            .type_votes
            .iter()
            .any(|vote| vote.column == 0 && vote.class_uri == entity_uri("Q515")));
        assert!(evidence
            .type_votes
            .iter()
            .any(|vote| vote.column == 1 && vote.class_uri == entity_uri("Q6256")));
    }

    #[tokio::test]
    async fn test_unresolved_row_recorded() {
        let source = StubSource::default();
        let table = table(&[&["col0", "col1"], &["Nowhere", "Nothing"]]);
        let mut evidence = Evidence::default();
        let resolution = resolve_rows(&source, &table, &mut evidence).await;

        assert_eq!(resolution.unresolved_rows, vec![1]);
        assert_eq!(evidence.unresolved_subjects.len(), 1);
        assert_eq!(evidence.unresolved_subjects[0].literal, "Nowhere");
    }

    #[tokio::test]
    async fn test_empty_subject_cell_is_unresolved() {
        let source = StubSource::default();
        let table = table(&[&["col0", "col1"], &["", "France"]]);
        let mut evidence = Evidence::default();
        let resolution = resolve_rows(&source, &table, &mut evidence).await;

        assert_eq!(resolution.unresolved_rows, vec![1]);
        assert_eq!(evidence.unresolved_subjects.len(), 1);
        assert!(evidence.unresolved_subjects[0].literal.is_empty());
    }

    #[tokio::test]
    async fn test_majority_filter_drops_minority_subject() {
        use crate::kg::CandidateBinding;

        // Two homonymous candidates: the city in France and the city in
        // Texas. Each matches one column.
        let mut bindings = Vec::new();
        bindings.push(
            CandidateBinding::new(
                &entity_uri("Q90"),
                "http://www.wikidata.org/prop/direct/P17",
                &entity_uri("Q142"),
            )
            .with_value_label("France"),
        );
        bindings.push(
            CandidateBinding::new(
                &entity_uri("Q830149"),
                "http://www.wikidata.org/prop/direct/P131",
                &entity_uri("Q1439"),
            )
            .with_value_label("Texas"),
        );
        let mut source = StubSource::default();
        source.add_mention("Paris", bindings);

        let table = table(&[&["col0", "col1", "col2"], &["Paris", "France", "Texas"]]);
        let mut evidence = Evidence::default();
        resolve_rows(&source, &table, &mut evidence).await;

        // Q90 was seen first, so the tie resolves in its favor and the
        // Q830149 property vote is dropped.
        assert_eq!(evidence.property_votes.len(), 1);
        assert_eq!(evidence.property_votes[0].subject, entity_uri("Q90"));
        // entity votes for both subjects survive
        let subject_votes: Vec<&EntityVote> = evidence
            .entity_votes
            .iter()
            .filter(|vote| vote.column == 0)
            .collect();
        assert_eq!(subject_votes.len(), 2);
    }

    #[tokio::test]
    async fn test_statement_subjects_excluded_from_property_votes() {
        use crate::kg::CandidateBinding;

        let bindings = vec![CandidateBinding::new(
            "http://www.wikidata.org/entity/statement/Q90-abc",
            "http://www.wikidata.org/prop/direct/P17",
            &entity_uri("Q142"),
        )
        .with_value_label("France")];
        let mut source = StubSource::default();
        source.add_mention("Paris", bindings);

        let table = table(&[&["col0", "col1"], &["Paris", "France"]]);
        let mut evidence = Evidence::default();
        let resolution = resolve_rows(&source, &table, &mut evidence).await;

        assert!(evidence.property_votes.is_empty());
        // the value still counts as a graph entity at column 1
        assert_eq!(evidence.entity_votes.len(), 1);
        assert_eq!(evidence.entity_votes[0].column, 1);
        // no property match anywhere, so the row stays unresolved
        assert_eq!(resolution.unresolved_rows, vec![1]);
    }

    #[test]
    fn test_distinct_keeps_first_seen_order() {
        let items = vec!["b", "a", "b", "c", "a"];
        assert_eq!(distinct(items), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_majority_filter_without_subjects_is_noop() {
        let mut votes = vec![PropertyVote {
            table: "t".to_string(),
            row: 1,
            subject_column: 0,
            column: 1,
            predicate: "http://www.wikidata.org/prop/direct/P17".to_string(),
            subject: entity_uri("Q90"),
            method: MatchMethod::DirectLookup,
        }];
        apply_majority_filter(&mut votes, 0, &[]);
        assert_eq!(votes.len(), 1);
    }
}
