mod client;
mod reconcile;
mod source;
mod sparql;
mod types;

pub use source::{KnowledgeSource, WikidataSource};
pub use types::{
    entity_uri, normalize_predicate, terminal_id, CandidateBinding, CandidateSet, LookupError,
    GENERIC_ROOT_CLASS,
};
