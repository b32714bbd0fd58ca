//! Core types shared across the knowledge-graph layer: candidate bindings
//! returned by lookups, the errors lookups can raise, and the entity URI
//! helpers the rest of the pipeline leans on.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::pipeline::MatchMethod;

pub const ENTITY_NS: &str = "http://www.wikidata.org/entity/";

/// Root of the class hierarchy. An ancestor lookup that lands here is as
/// uninformative as no answer at all.
pub const GENERIC_ROOT_CLASS: &str = "Q35120";

/// Per-query timeouts. Mention lookups dominate wall time and get the most
/// room; the enumeration query pages through entire classes and gets almost
/// a minute.
pub const MENTION_TIMEOUT: Duration = Duration::from_millis(12_500);
pub const REVERSE_TIMEOUT: Duration = Duration::from_millis(2_500);
pub const JOINT_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const TYPED_TIMEOUT: Duration = Duration::from_millis(2_000);
pub const ENUMERATION_TIMEOUT: Duration = Duration::from_millis(59_000);
pub const SUGGEST_TIMEOUT: Duration = Duration::from_millis(1_000);
pub const ANCESTOR_TIMEOUT: Duration = Duration::from_millis(5_000);

/// One statement-shaped row from a lookup: a subject entity, the predicate
/// linking it to a value, and optional types and labels for both ends.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateBinding {
    pub subject: String,
    pub subject_type: Option<String>,
    pub subject_label: Option<String>,
    pub predicate: String,
    pub value: String,
    pub value_type: Option<String>,
    pub value_label: Option<String>,
}

impl CandidateBinding {
    pub fn new(subject: &str, predicate: &str, value: &str) -> Self {
        CandidateBinding {
            subject: subject.to_string(),
            subject_type: None,
            subject_label: None,
            predicate: predicate.to_string(),
            value: value.to_string(),
            value_type: None,
            value_label: None,
        }
    }

    pub fn with_subject_type(mut self, subject_type: &str) -> Self {
        self.subject_type = Some(subject_type.to_string());
        self
    }

    pub fn with_subject_label(mut self, subject_label: &str) -> Self {
        self.subject_label = Some(subject_label.to_string());
        self
    }

    pub fn with_value_type(mut self, value_type: &str) -> Self {
        self.value_type = Some(value_type.to_string());
        self
    }

    pub fn with_value_label(mut self, value_label: &str) -> Self {
        self.value_label = Some(value_label.to_string());
        self
    }

    /// True when the predicate lives in the Wikidata namespace rather than
    /// schema.org or another vocabulary.
    pub fn predicate_in_graph(&self) -> bool {
        self.predicate.contains("http://www.wikidata.org/")
    }

    pub fn subject_is_statement(&self) -> bool {
        self.subject.contains("/statement/")
    }

    pub fn value_is_statement(&self) -> bool {
        self.value.contains("/statement/")
    }

    /// True when the value is itself a graph node rather than a literal.
    pub fn value_in_graph(&self) -> bool {
        self.value.contains("wikidata.org") && !self.value_is_statement()
    }
}

/// The bindings one lookup produced, tagged with the stage that made them.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    pub bindings: Vec<CandidateBinding>,
    pub method: MatchMethod,
}

impl CandidateSet {
    pub fn with_bindings(method: MatchMethod, bindings: Vec<CandidateBinding>) -> Self {
        CandidateSet { bindings, method }
    }

    pub fn subject_labels(&self) -> Vec<String> {
        self.bindings
            .iter()
            .filter_map(|binding| binding.subject_label.clone())
            .collect()
    }

    /// A lookup that resolved only to Wikipedia page nodes carries no usable
    /// statements and is discarded whole.
    pub fn all_wiki_pages(&self) -> bool {
        !self.bindings.is_empty()
            && self
                .bindings
                .iter()
                .all(|binding| binding.subject.contains("wikipedia"))
    }
}

/// Final path segment of an entity or property URI: "Q90" out of
/// "http://www.wikidata.org/entity/Q90". Bare identifiers pass through.
pub fn terminal_id(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

/// Rewrites statement-qualified and normalized predicate forms onto the
/// direct form, so votes for the same property pool together.
pub fn normalize_predicate(predicate: &str) -> String {
    predicate
        .replace("http://www.wikidata.org/prop/P", "http://www.wikidata.org/prop/direct/P")
        .replace("/direct-normalized/", "/direct/")
}

pub fn entity_uri(id: &str) -> String {
    format!("{ENTITY_NS}{id}")
}

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response status: {0}")]
    Status(StatusCode),
    #[error("failed to decode response: {0}")]
    Decode(String),
}
