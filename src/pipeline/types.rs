//! Evidence and annotation types flowing through the pipeline. Stages emit
//! votes; aggregation turns votes into annotations.

use std::collections::HashSet;
use std::fmt;

/// How a candidate set was obtained. Tagged onto every vote so the logs can
/// show which stage resolved what.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchMethod {
    DirectLookup,
    AlternateNameLookup,
    ReconciliationLookup,
    JointPropertyLookup,
    ReverseTailLookup,
    TypeConstrainedLookup,
    DatatypeLookup,
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchMethod::DirectLookup => "direct-lookup",
            MatchMethod::AlternateNameLookup => "alternate-name-lookup",
            MatchMethod::ReconciliationLookup => "reconciliation-lookup",
            MatchMethod::JointPropertyLookup => "joint-property-lookup",
            MatchMethod::ReverseTailLookup => "reverse-tail-lookup",
            MatchMethod::TypeConstrainedLookup => "type-constrained-lookup",
            MatchMethod::DatatypeLookup => "datatype-lookup",
        };
        write!(f, "{name}")
    }
}

/// One piece of evidence that `predicate` links the subject column to
/// `column` in a row, contributed by `subject`.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyVote {
    pub table: String,
    pub row: usize,
    pub subject_column: usize,
    pub column: usize,
    pub predicate: String,
    pub subject: String,
    pub method: MatchMethod,
}

/// One piece of evidence that a cell refers to `entity`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityVote {
    pub table: String,
    pub row: usize,
    pub column: usize,
    pub entity: String,
    pub method: MatchMethod,
}

/// One piece of evidence that a column holds instances of a class. Counted
/// separately from entity votes, since one lookup may support several
/// classes and several entities at once.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeVote {
    pub table: String,
    pub column: usize,
    pub class_uri: String,
    pub method: MatchMethod,
}

/// A subject cell no stage has resolved yet.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedSubject {
    pub table: String,
    pub row: usize,
    pub literal: String,
}

/// Everything the stages have produced so far for a batch of tables.
#[derive(Debug, Default)]
pub struct Evidence {
    pub property_votes: Vec<PropertyVote>,
    pub entity_votes: Vec<EntityVote>,
    pub type_votes: Vec<TypeVote>,
    pub unresolved_subjects: Vec<UnresolvedSubject>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyAnnotation {
    pub table: String,
    pub subject_column: usize,
    pub column: usize,
    pub predicate: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityAnnotation {
    pub table: String,
    pub row: usize,
    pub column: usize,
    pub entity: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
    pub table: String,
    pub column: usize,
    pub class_uri: String,
}

#[derive(Debug, Default)]
pub struct Annotations {
    pub properties: Vec<PropertyAnnotation>,
    pub entities: Vec<EntityAnnotation>,
    pub types: Vec<TypeAnnotation>,
}

/// Which fallback stages run after row resolution. The type-scoped stages
/// run by default; the joint and reverse lookups are opt-in.
#[derive(Debug, Clone, Copy)]
pub struct StageConfig {
    pub joint_property: bool,
    pub reverse_tail: bool,
    pub type_constrained: bool,
    pub datatype_broad: bool,
}

impl Default for StageConfig {
    fn default() -> Self {
        StageConfig {
            joint_property: false,
            reverse_tail: false,
            type_constrained: true,
            datatype_broad: true,
        }
    }
}

/// Target keys for the three annotation tasks. A populated target set
/// restricts output to exactly those keys; absence means annotate all.
pub type PropertyTargets = HashSet<(String, usize, usize)>;
pub type EntityTargets = HashSet<(String, usize, usize)>;
pub type TypeTargets = HashSet<(String, usize)>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_method_display() {
        assert_eq!(MatchMethod::DirectLookup.to_string(), "direct-lookup");
        assert_eq!(MatchMethod::DatatypeLookup.to_string(), "datatype-lookup");
    }

    #[test]
    fn test_stage_config_defaults() {
        let config = StageConfig::default();
        assert!(!config.joint_property);
        assert!(!config.reverse_tail);
        assert!(config.type_constrained);
        assert!(config.datatype_broad);
    }
}
