//! Annotation targets: the coordinate sets a run is asked to annotate.
//! Each task ships as a headerless CSV naming tables by stem, and the
//! loaded sets both scope aggregation and drive the coverage report.

use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use tracing::info;

use crate::pipeline::{Annotations, EntityTargets, PropertyTargets, TypeTargets};
use crate::TARGET_STATS;

/// The target sets of one run. A task without a target file stays `None`
/// and its aggregation runs unscoped.
#[derive(Debug, Default)]
pub struct TargetStore {
    pub properties: Option<PropertyTargets>,
    pub entities: Option<EntityTargets>,
    pub types: Option<TypeTargets>,
}

impl TargetStore {
    pub fn load(
        property_path: Option<&Path>,
        entity_path: Option<&Path>,
        type_path: Option<&Path>,
    ) -> Result<Self> {
        let properties = match property_path {
            Some(path) => Some(
                property_targets_from_reader(open(path)?)
                    .with_context(|| format!("failed to parse {}", path.display()))?,
            ),
            None => None,
        };
        let entities = match entity_path {
            Some(path) => Some(
                entity_targets_from_reader(open(path)?)
                    .with_context(|| format!("failed to parse {}", path.display()))?,
            ),
            None => None,
        };
        let types = match type_path {
            Some(path) => Some(
                type_targets_from_reader(open(path)?)
                    .with_context(|| format!("failed to parse {}", path.display()))?,
            ),
            None => None,
        };
        Ok(TargetStore {
            properties,
            entities,
            types,
        })
    }

    /// Sorted union of every table named by any loaded target set.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = BTreeSet::new();
        if let Some(targets) = &self.properties {
            names.extend(targets.iter().map(|(table, _, _)| table.clone()));
        }
        if let Some(targets) = &self.entities {
            names.extend(targets.iter().map(|(table, _, _)| table.clone()));
        }
        if let Some(targets) = &self.types {
            names.extend(targets.iter().map(|(table, _)| table.clone()));
        }
        names.into_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_none() && self.entities.is_none() && self.types.is_none()
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("failed to open {}", path.display()))
}

/// Property targets: table, subject column, column.
pub fn property_targets_from_reader<R: io::Read>(reader: R) -> Result<PropertyTargets> {
    let mut targets = PropertyTargets::new();
    for (index, record) in records(reader).enumerate() {
        let record = record.with_context(|| format!("bad target record {index}"))?;
        let (table, first, second) = three_fields(&record, index)?;
        targets.insert((table, first, second));
    }
    Ok(targets)
}

/// Entity targets: table, row, column.
pub fn entity_targets_from_reader<R: io::Read>(reader: R) -> Result<EntityTargets> {
    let mut targets = EntityTargets::new();
    for (index, record) in records(reader).enumerate() {
        let record = record.with_context(|| format!("bad target record {index}"))?;
        let (table, first, second) = three_fields(&record, index)?;
        targets.insert((table, first, second));
    }
    Ok(targets)
}

/// Type targets: table, column.
pub fn type_targets_from_reader<R: io::Read>(reader: R) -> Result<TypeTargets> {
    let mut targets = TypeTargets::new();
    for (index, record) in records(reader).enumerate() {
        let record = record.with_context(|| format!("bad target record {index}"))?;
        let table = field(&record, 0, index)?.to_string();
        let column = parse_index(field(&record, 1, index)?, index)?;
        targets.insert((table, column));
    }
    Ok(targets)
}

fn records<R: io::Read>(reader: R) -> impl Iterator<Item = csv::Result<csv::StringRecord>> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader)
        .into_records()
}

fn three_fields(record: &csv::StringRecord, index: usize) -> Result<(String, usize, usize)> {
    let table = field(record, 0, index)?.to_string();
    let first = parse_index(field(record, 1, index)?, index)?;
    let second = parse_index(field(record, 2, index)?, index)?;
    Ok((table, first, second))
}

fn field<'r>(record: &'r csv::StringRecord, position: usize, index: usize) -> Result<&'r str> {
    record
        .get(position)
        .with_context(|| format!("target record {index} has no field {position}"))
}

fn parse_index(text: &str, index: usize) -> Result<usize> {
    text.trim()
        .parse()
        .with_context(|| format!("target record {index} has non-numeric field \"{text}\""))
}

/// Keeps `amount` table names starting at `offset`, for splitting a run
/// across processes.
pub fn shard(names: &[String], offset: usize, amount: Option<usize>) -> &[String] {
    let start = offset.min(names.len());
    let end = match amount {
        Some(amount) => start.saturating_add(amount).min(names.len()),
        None => names.len(),
    };
    &names[start..end]
}

/// Logs per-task coverage of the produced annotations against the targets.
pub fn report_coverage(store: &TargetStore, annotations: &Annotations) {
    if let Some(targets) = &store.entities {
        let matched = annotations
            .entities
            .iter()
            .filter(|a| targets.contains(&(a.table.clone(), a.row, a.column)))
            .count();
        log_task("cea", matched, targets.len());
    }
    if let Some(targets) = &store.types {
        let matched = annotations
            .types
            .iter()
            .filter(|a| targets.contains(&(a.table.clone(), a.column)))
            .count();
        log_task("cta", matched, targets.len());
    }
    if let Some(targets) = &store.properties {
        let matched = annotations
            .properties
            .iter()
            .filter(|a| targets.contains(&(a.table.clone(), a.subject_column, a.column)))
            .count();
        log_task("cpa", matched, targets.len());
    }
}

fn log_task(task: &str, matched: usize, total: usize) {
    let coverage = if total == 0 {
        0.0
    } else {
        matched as f64 / total as f64
    };
    info!(
        target: TARGET_STATS,
        "{task}: coverage {coverage:.4}, matched {matched}, total {total}, unmatched {unmatched}",
        unmatched = total - matched
    );
}
