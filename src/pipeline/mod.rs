//! The table annotation pipeline. A primary stage resolves each row through
//! its subject cell, optional fallback stages revisit whatever it left
//! unresolved, and aggregation reduces the accumulated votes to one
//! annotation per cell, column pair, and column.

mod aggregate;
mod column_types;
mod fallback;
mod resolver;
mod types;

pub use aggregate::{
    aggregate_entities, aggregate_properties, aggregate_types, finalize, FirstSeenCounter,
};
pub use column_types::estimate_column_types;
pub use fallback::{
    datatype_stage, joint_property_stage, reverse_tail_stage, type_constrained_stage,
};
pub use resolver::{resolve_rows, RowResolution};
pub use types::{
    Annotations, EntityAnnotation, EntityTargets, EntityVote, Evidence, MatchMethod,
    PropertyAnnotation, PropertyTargets, PropertyVote, StageConfig, TypeAnnotation, TypeTargets,
    TypeVote, UnresolvedSubject,
};

use tracing::info;

use crate::kg::KnowledgeSource;
use crate::table::Table;
use crate::TARGET_PIPELINE;

/// Runs the pipeline over one table, appending votes to the shared evidence.
/// Every stage beyond the primary one touches only the rows the primary
/// stage could not fully resolve, and column types are estimated after the
/// joint and reverse stages so their votes count toward the scoping of the
/// later ones.
pub async fn annotate_table<S: KnowledgeSource>(
    source: &S,
    table: &Table,
    stages: &StageConfig,
    evidence: &mut Evidence,
) {
    info!(
        target: TARGET_PIPELINE,
        "annotating {} ({} rows, {} columns)",
        table.name(),
        table.row_count(),
        table.column_count()
    );

    let resolution = resolve_rows(source, table, evidence).await;
    if resolution.unresolved_rows.is_empty() {
        return;
    }

    if stages.joint_property {
        joint_property_stage(source, table, &resolution, evidence).await;
    }
    if stages.reverse_tail {
        reverse_tail_stage(source, table, &resolution, evidence).await;
    }

    let column_types = estimate_column_types(evidence, table.name());
    if stages.type_constrained {
        type_constrained_stage(source, table, &resolution, &column_types, evidence).await;
    }
    if stages.datatype_broad {
        let subject_types = column_types.get(&0).cloned().unwrap_or_default();
        datatype_stage(source, table, &resolution, &subject_types, evidence).await;
    }

    info!(
        target: TARGET_PIPELINE,
        "{}: {} of {} data rows needed fallback stages",
        table.name(),
        resolution.unresolved_rows.len(),
        table.data_rows().len()
    );
}
