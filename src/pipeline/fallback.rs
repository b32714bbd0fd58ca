//! Fallback stages. Each one revisits only the rows the primary stage left
//! unresolved, trading precision or cost for extra coverage.

use std::collections::BTreeMap;

use tracing::debug;

use super::aggregate::FirstSeenCounter;
use super::resolver::{
    apply_majority_filter, distinct, distinct_property_pairs, distinct_subject_types,
    distinct_subjects, entity_values, RowResolution,
};
use super::types::{EntityVote, Evidence, MatchMethod, PropertyVote, TypeVote};
use crate::kg::{entity_uri, terminal_id, CandidateBinding, CandidateSet, KnowledgeSource};
use crate::matcher::{is_numeric, is_slash_date, match_candidates};
use crate::similarity::close_matches;
use crate::table::Table;
use crate::TARGET_PIPELINE;

/// Cutoff for matching joint-lookup subjects against the subject cell.
pub const JOINT_CUTOFF: f64 = 0.81;
pub const JOINT_LIMIT: usize = 3;

/// Reverse lookups demand a near-exact subject label, with one relaxation.
pub const REVERSE_TIGHT_CUTOFF: f64 = 0.95;
pub const REVERSE_LOOSE_CUTOFF: f64 = 0.905;
pub const REVERSE_LIMIT: usize = 2;

/// The broad datatype stage degrades through these cutoffs until one yields
/// a match.
pub const DATATYPE_CUTOFFS: [f64; 4] = [0.95, 0.9, 0.8, 0.7];
pub const DATATYPE_LIMIT: usize = 15;

/// Resolves unresolved rows through the conjunction of their entity-column
/// cells and the predicates already estimated for those columns. Emits
/// entity votes only.
pub async fn joint_property_stage<S: KnowledgeSource>(
    source: &S,
    table: &Table,
    resolution: &RowResolution,
    evidence: &mut Evidence,
) {
    if resolution.entity_columns.is_empty() || resolution.unresolved_rows.is_empty() {
        return;
    }

    let mut dominant: BTreeMap<usize, String> = BTreeMap::new();
    for &column in &resolution.entity_columns {
        let mut counter = FirstSeenCounter::new();
        for vote in evidence
            .property_votes
            .iter()
            .filter(|vote| vote.table == table.name() && vote.column == column)
        {
            counter.add(terminal_id(&vote.predicate).to_string());
        }
        match counter.leader() {
            Some(predicate) => {
                dominant.insert(column, predicate);
            }
            None => {
                debug!(
                    target: TARGET_PIPELINE,
                    "no dominant predicate for {} column {column}, skipping joint lookup",
                    table.name()
                );
                return;
            }
        }
    }

    for &row in &resolution.unresolved_rows {
        let Some(subject) = table.cell(row, 0) else {
            continue;
        };
        let mut pairs = Vec::new();
        let mut complete = true;
        for &column in &resolution.entity_columns {
            match table.cell(row, column) {
                Some(cell) if !cell.is_empty() => {
                    // The map covers every entity column once we get here.
                    if let Some(predicate) = dominant.get(&column) {
                        pairs.push((predicate.clone(), cell.to_string()));
                    }
                }
                _ => {
                    complete = false;
                    break;
                }
            }
        }
        if !complete || pairs.is_empty() {
            continue;
        }

        let Some(candidates) = source.joint_property(&pairs).await else {
            continue;
        };
        let labels = candidates.subject_labels();
        let close = distinct(close_matches(subject, &labels, JOINT_LIMIT, JOINT_CUTOFF));
        if close.is_empty() {
            continue;
        }
        let reduced: Vec<CandidateBinding> = candidates
            .bindings
            .iter()
            .filter(|binding| {
                binding
                    .subject_label
                    .as_deref()
                    .is_some_and(|label| close.iter().any(|c| c == label))
            })
            .cloned()
            .collect();
        let reduced = CandidateSet::with_bindings(candidates.method, reduced);

        for column in 1..table.column_count() {
            let Some(cell) = table.cell(row, column) else {
                continue;
            };
            let matched = match_candidates(&reduced, cell);
            if matched.is_empty() {
                continue;
            }
            for subject_entity in distinct_subjects(&matched) {
                evidence.entity_votes.push(EntityVote {
                    table: table.name().to_string(),
                    row,
                    column: 0,
                    entity: subject_entity,
                    method: reduced.method,
                });
            }
            for class_uri in distinct_subject_types(&matched) {
                evidence.type_votes.push(TypeVote {
                    table: table.name().to_string(),
                    column: 0,
                    class_uri,
                    method: reduced.method,
                });
            }
            let (values, value_types) = entity_values(&matched);
            for value in values {
                evidence.entity_votes.push(EntityVote {
                    table: table.name().to_string(),
                    row,
                    column,
                    entity: value,
                    method: reduced.method,
                });
            }
            for class_uri in value_types {
                evidence.type_votes.push(TypeVote {
                    table: table.name().to_string(),
                    column,
                    class_uri,
                    method: reduced.method,
                });
            }
        }
    }
}

/// Resolves unresolved rows backwards: an entity-column cell is looked up
/// as a graph entity, and the subjects referencing it are accepted when
/// their label nearly equals the subject cell.
pub async fn reverse_tail_stage<S: KnowledgeSource>(
    source: &S,
    table: &Table,
    resolution: &RowResolution,
    evidence: &mut Evidence,
) {
    for &row in &resolution.unresolved_rows {
        let Some(subject) = table.cell(row, 0) else {
            continue;
        };
        for &column in &resolution.entity_columns {
            let Some(cell) = table.cell(row, column) else {
                continue;
            };
            // Numbers and dates label far too many entities to reverse.
            if cell.is_empty() || is_numeric(cell) || is_slash_date(cell) {
                continue;
            }
            let Some(candidates) = source.reverse_mention(cell).await else {
                continue;
            };
            let labels = candidates.subject_labels();
            let mut close = close_matches(subject, &labels, REVERSE_LIMIT, REVERSE_TIGHT_CUTOFF);
            if close.is_empty() {
                close = close_matches(subject, &labels, REVERSE_LIMIT, REVERSE_LOOSE_CUTOFF);
            }
            if close.is_empty() {
                continue;
            }
            let reduced: Vec<&CandidateBinding> = candidates
                .bindings
                .iter()
                .filter(|binding| {
                    binding
                        .subject_label
                        .as_deref()
                        .is_some_and(|label| close.iter().any(|c| c == label))
                })
                .collect();
            if reduced.is_empty() {
                continue;
            }

            // Reverse statements vote for properties in any vocabulary.
            for (predicate, subject_entity) in distinct_property_pairs(&reduced) {
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
            for subject_entity in distinct_subjects(&reduced) {
                evidence.entity_votes.push(EntityVote {
                    table: table.name().to_string(),
                    row,
                    column: 0,
                    entity: subject_entity,
                    method: candidates.method,
                });
            }
            for class_uri in distinct_subject_types(&reduced) {
                evidence.type_votes.push(TypeVote {
                    table: table.name().to_string(),
                    column: 0,
                    class_uri,
                    method: candidates.method,
                });
            }
            let (values, value_types) = entity_values(&reduced);
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
    }
}

/// Looks up entity-column cells constrained to the column's estimated
/// types. Anything found is accepted outright.
pub async fn type_constrained_stage<S: KnowledgeSource>(
    source: &S,
    table: &Table,
    resolution: &RowResolution,
    column_types: &BTreeMap<usize, Vec<String>>,
    evidence: &mut Evidence,
) {
    for &row in &resolution.unresolved_rows {
        for &column in &resolution.entity_columns {
            let Some(types) = column_types.get(&column) else {
                continue;
            };
            let Some(cell) = table.cell(row, column) else {
                continue;
            };
            if cell.is_empty() {
                continue;
            }
            for class_id in types {
                let Some(found) = source.typed_label(cell, class_id).await else {
                    continue;
                };
                let entities = distinct(found.into_iter().map(|(entity, _)| entity));
                if entities.is_empty() {
                    continue;
                }
                for entity in entities {
                    evidence.entity_votes.push(EntityVote {
                        table: table.name().to_string(),
                        row,
                        column,
                        entity,
                        method: MatchMethod::TypeConstrainedLookup,
                    });
                }
                evidence.type_votes.push(TypeVote {
                    table: table.name().to_string(),
                    column,
                    class_uri: entity_uri(class_id),
                    method: MatchMethod::TypeConstrainedLookup,
                });
            }
        }
    }
}

/// The broadest fallback: enumerate every entity of the subject column's
/// estimated types, fuzzy-match unresolved subject cells against those
/// labels, then re-run column matching on the candidates of each matched
/// label.
pub async fn datatype_stage<S: KnowledgeSource>(
    source: &S,
    table: &Table,
    resolution: &RowResolution,
    subject_types: &[String],
    evidence: &mut Evidence,
) {
    if subject_types.is_empty() || resolution.unresolved_rows.is_empty() {
        return;
    }

    for class_id in subject_types {
        let Some(labels) = source.class_labels(class_id).await else {
            continue;
        };
        for &row in &resolution.unresolved_rows {
            let Some(subject) = table.cell(row, 0) else {
                continue;
            };
            if subject.is_empty() {
                continue;
            }
            let mut matched_labels = Vec::new();
            for cutoff in DATATYPE_CUTOFFS {
                matched_labels = close_matches(subject, &labels, DATATYPE_LIMIT, cutoff);
                if !matched_labels.is_empty() {
                    break;
                }
            }
            if matched_labels.is_empty() {
                continue;
            }

            let mut combined = Vec::new();
            for label in distinct(matched_labels) {
                if let Some(set) = source.mention(&label, true).await {
                    combined.extend(set.bindings);
                }
            }
            if combined.is_empty() {
                continue;
            }
            let candidates = CandidateSet::with_bindings(MatchMethod::DatatypeLookup, combined);

            let row_start = evidence.property_votes.len();
            let mut row_subjects = Vec::new();
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
                    .filter(|b| b.predicate_in_graph())
                    .collect();
                for (predicate, subject_entity) in distinct_property_pairs(&property_bindings) {
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
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kg::entity_uri;
    use crate::pipeline::testing::{city_bindings, StubSource};

    fn table(rows: &[&[&str]]) -> Table {
        Table::from_rows(
            "cities",
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        )
    }

    fn seeded_property_vote(table: &str, column: usize) -> PropertyVote {
        PropertyVote {
            table: table.to_string(),
            row: 1,
            subject_column: 0,
            column,
            predicate: "http://www.wikidata.org/prop/direct/P17".to_string(),
            subject: entity_uri("Q90"),
            method: MatchMethod::DirectLookup,
        }
    }

    #[tokio::test]
    async fn test_joint_stage_emits_entity_votes_only() {
        let table = table(&[&["col0", "col1"], &["Paris", "France"], &["Lyon", "France"]]);
        let mut evidence = Evidence::default();
        evidence.property_votes.push(seeded_property_vote("cities", 1));

        let mut source = StubSource::default();
        source.add_joint(
            &[("P17".to_string(), "France".to_string())],
            vec![
                CandidateBinding::new(
                    &entity_uri("Q456"),
                    "http://www.wikidata.org/prop/direct/P17",
                    &entity_uri("Q142"),
                )
                .with_subject_label("Lyon")
                .with_subject_type(&entity_uri("Q515"))
                .with_value_label("France"),
                CandidateBinding::new(
                    &entity_uri("Q2863958"),
                    "http://www.wikidata.org/prop/direct/P17",
                    &entity_uri("Q142"),
                )
                .with_subject_label("unrelated place")
                .with_value_label("France"),
            ],
        );

        let resolution = RowResolution {
            unresolved_rows: vec![2],
            entity_columns: vec![1],
        };
        let before = evidence.property_votes.len();
        joint_property_stage(&source, &table, &resolution, &mut evidence).await;

        assert_eq!(evidence.property_votes.len(), before);
        // the close subject label won, the unrelated one did not
        let subjects: Vec<&EntityVote> = evidence
            .entity_votes
            .iter()
            .filter(|vote| vote.column == 0)
            .collect();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].entity, entity_uri("Q456"));
        assert_eq!(subjects[0].row, 2);
        assert!(evidence
            .entity_votes
            .iter()
            .any(|vote| vote.column == 1 && vote.entity == entity_uri("Q142")));
    }

    #[tokio::test]
    async fn test_joint_stage_requires_dominant_predicates() {
        let table = table(&[&["col0", "col1"], &["Paris", "France"], &["Lyon", "France"]]);
        let mut evidence = Evidence::default();
        let source = StubSource::default();
        let resolution = RowResolution {
            unresolved_rows: vec![2],
            entity_columns: vec![1],
        };
        joint_property_stage(&source, &table, &resolution, &mut evidence).await;
        assert!(evidence.entity_votes.is_empty());
    }

    #[tokio::test]
    async fn test_reverse_stage_accepts_near_exact_subjects() {
        // "Marseilles" scores just under the tight cutoff against
        // "Marseille" and is picked up by the relaxed one.
        let table = table(&[&["col0", "col1"], &["Marseilles", "Rhone"]]);
        let mut source = StubSource::default();
        source.add_reverse(
            "Rhone",
            vec![
                CandidateBinding::new(
                    &entity_uri("Q23482"),
                    "http://schema.org/containedInPlace",
                    &entity_uri("Q46130"),
                )
                .with_subject_label("Marseille")
                .with_subject_type(&entity_uri("Q515")),
                CandidateBinding::new(
                    &entity_uri("Q142"),
                    "http://www.wikidata.org/prop/direct/P36",
                    &entity_uri("Q46130"),
                )
                .with_subject_label("France"),
            ],
        );

        let mut evidence = Evidence::default();
        let resolution = RowResolution {
            unresolved_rows: vec![1],
            entity_columns: vec![1],
        };
        reverse_tail_stage(&source, &table, &resolution, &mut evidence).await;

        // property votes carry any vocabulary here
        assert_eq!(evidence.property_votes.len(), 1);
        assert_eq!(
            evidence.property_votes[0].predicate,
            "http://schema.org/containedInPlace"
        );
        assert_eq!(evidence.property_votes[0].subject, entity_uri("Q23482"));
        assert!(evidence
            .entity_votes
            .iter()
            .any(|vote| vote.column == 0 && vote.entity == entity_uri("Q23482")));
        assert!(evidence
            .entity_votes
            .iter()
            .any(|vote| vote.column == 1 && vote.entity == entity_uri("Q46130")));
    }

    #[tokio::test]
    async fn test_reverse_stage_skips_numeric_and_date_cells() {
        let table = table(&[
            &["col0", "col1", "col2"],
            &["Paris", "2165423", "2001/01/10"],
        ]);
        let source = StubSource::default();
        let mut evidence = Evidence::default();
        let resolution = RowResolution {
            unresolved_rows: vec![1],
            entity_columns: vec![1, 2],
        };
        reverse_tail_stage(&source, &table, &resolution, &mut evidence).await;
        assert!(evidence.entity_votes.is_empty());
    }

    #[tokio::test]
    async fn test_type_constrained_stage_accepts_outright() {
        let table = table(&[&["col0", "col1"], &["Paris", "Lyon"]]);
        let mut source = StubSource::default();
        source.add_typed("Lyon", "Q515", vec![(entity_uri("Q456"), "Lyon".to_string())]);

        let mut evidence = Evidence::default();
        let resolution = RowResolution {
            unresolved_rows: vec![1],
            entity_columns: vec![1],
        };
        let mut column_types = BTreeMap::new();
        column_types.insert(1, vec!["Q515".to_string()]);
        type_constrained_stage(&source, &table, &resolution, &column_types, &mut evidence).await;

        assert_eq!(evidence.entity_votes.len(), 1);
        assert_eq!(evidence.entity_votes[0].entity, entity_uri("Q456"));
        assert_eq!(evidence.entity_votes[0].column, 1);
        assert_eq!(
            evidence.entity_votes[0].method,
            MatchMethod::TypeConstrainedLookup
        );
        assert_eq!(evidence.type_votes.len(), 1);
        assert_eq!(evidence.type_votes[0].class_uri, entity_uri("Q515"));
    }

    #[tokio::test]
    async fn test_datatype_stage_resolves_through_enumeration() {
        let table = table(&[&["col0", "col1"], &["Pariis", "France"]]);
        let mut source = StubSource::default();
        source.add_class_labels("Q515", vec!["Paris".to_string(), "Lyon".to_string()]);
        source.add_mention("Paris", city_bindings("Q90", "Q142", "France", "2165423"));

        let mut evidence = Evidence::default();
        let resolution = RowResolution {
            unresolved_rows: vec![1],
            entity_columns: vec![1],
        };
        datatype_stage(
            &source,
            &table,
            &resolution,
            &["Q515".to_string()],
            &mut evidence,
        )
        .await;

        assert_eq!(evidence.property_votes.len(), 1);
        assert_eq!(
            evidence.property_votes[0].predicate,
            "http://www.wikidata.org/prop/direct/P17"
        );
        assert_eq!(evidence.property_votes[0].method, MatchMethod::DatatypeLookup);
        assert!(evidence
            .entity_votes
            .iter()
            .any(|vote| vote.column == 0 && vote.entity == entity_uri("Q90")));
        assert!(evidence
            .entity_votes
            .iter()
            .any(|vote| vote.column == 1 && vote.entity == entity_uri("Q142")));
    }

    #[tokio::test]
    async fn test_datatype_stage_skips_unmatched_subjects() {
        let table = table(&[&["col0", "col1"], &["Zzzzz", "France"]]);
        let mut source = StubSource::default();
        source.add_class_labels("Q515", vec!["Paris".to_string()]);

        let mut evidence = Evidence::default();
        let resolution = RowResolution {
            unresolved_rows: vec![1],
            entity_columns: vec![1],
        };
        datatype_stage(
            &source,
            &table,
            &resolution,
            &["Q515".to_string()],
            &mut evidence,
        )
        .await;
        assert!(evidence.entity_votes.is_empty());
    }
}
