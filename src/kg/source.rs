//! The lookup interface the annotation pipeline drives, and its live
//! implementation against the Wikidata endpoints. Every method returns
//! `None` for "no candidates", whether the query failed, timed out, or
//! genuinely matched nothing, so callers can fall through to the next
//! strategy without caring why.

use std::time::Duration;

use tracing::{debug, warn};

use super::client::KgClient;
use super::reconcile;
use super::sparql::{self, SparqlResponse};
use super::types::{
    terminal_id, CandidateSet, LookupError, ANCESTOR_TIMEOUT, ENUMERATION_TIMEOUT, JOINT_TIMEOUT,
    MENTION_TIMEOUT, REVERSE_TIMEOUT, TYPED_TIMEOUT,
};
use crate::environment;
use crate::pipeline::MatchMethod;
use crate::TARGET_KG_REQUEST;

#[allow(async_fn_in_trait)]
pub trait KnowledgeSource {
    /// Statements of entities carrying the literal as a label.
    async fn mention(&self, literal: &str, with_subject_labels: bool) -> Option<CandidateSet>;

    /// Mention lookup that falls back to alternate labels from the search
    /// API, then to the reconciliation best guess.
    async fn mention_with_alternates(&self, literal: &str) -> Option<CandidateSet>;

    /// Subjects whose statements point at an entity labeled by the literal.
    async fn reverse_mention(&self, literal: &str) -> Option<CandidateSet>;

    /// Statements of entities satisfying every (property, literal) pair.
    async fn joint_property(&self, pairs: &[(String, String)]) -> Option<CandidateSet>;

    /// (entity, label) pairs for the literal constrained to one class.
    async fn typed_label(&self, literal: &str, class_id: &str) -> Option<Vec<(String, String)>>;

    /// English labels of every instance of the class.
    async fn class_labels(&self, class_id: &str) -> Option<Vec<String>>;

    /// Nearest common superclass of two classes, as a full entity URI.
    async fn common_class(&self, first: &str, second: &str) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct WikidataSource {
    client: KgClient,
    sparql_endpoint: String,
    reconcile_endpoint: String,
    search_endpoint: String,
}

impl WikidataSource {
    pub fn new() -> Result<Self, LookupError> {
        Ok(WikidataSource {
            client: KgClient::new()?,
            sparql_endpoint: environment::sparql_endpoint(),
            reconcile_endpoint: environment::reconcile_endpoint(),
            search_endpoint: environment::search_endpoint(),
        })
    }

    async fn run_sparql(&self, query: &str, timeout: Duration) -> Option<SparqlResponse> {
        let params = [("format", "json"), ("query", query)];
        match self
            .client
            .get_json(&self.sparql_endpoint, &params, timeout)
            .await
        {
            Ok(value) => match serde_json::from_value::<SparqlResponse>(value) {
                Ok(response) => Some(response),
                Err(error) => {
                    warn!(target: TARGET_KG_REQUEST, "malformed sparql response: {error}");
                    None
                }
            },
            Err(error) => {
                debug!(target: TARGET_KG_REQUEST, "sparql query failed: {error}");
                None
            }
        }
    }
}

impl KnowledgeSource for WikidataSource {
    async fn mention(&self, literal: &str, with_subject_labels: bool) -> Option<CandidateSet> {
        let query = sparql::mention_query(literal, with_subject_labels);
        let response = self.run_sparql(&query, MENTION_TIMEOUT).await?;
        let bindings = sparql::decode_statements(response);
        if bindings.is_empty() {
            return None;
        }
        let set = CandidateSet::with_bindings(MatchMethod::DirectLookup, bindings);
        if set.all_wiki_pages() {
            debug!(
                target: TARGET_KG_REQUEST,
                "\"{literal}\" resolved only to wiki pages, discarding"
            );
            return None;
        }
        Some(set)
    }

    async fn mention_with_alternates(&self, literal: &str) -> Option<CandidateSet> {
        if let Some(set) = self.mention(literal, false).await {
            return Some(set);
        }

        // Alternates that merely echo the input would repeat the lookup
        // that just failed.
        let alternates =
            reconcile::alternate_labels(&self.client, &self.search_endpoint, literal).await;
        let mut combined = Vec::new();
        for alternate in &alternates {
            if alternate == literal {
                continue;
            }
            if let Some(mut set) = self.mention(alternate, false).await {
                combined.append(&mut set.bindings);
            }
        }
        if !combined.is_empty() {
            debug!(
                target: TARGET_KG_REQUEST,
                "\"{literal}\" resolved through {} alternate labels", alternates.len()
            );
            return Some(CandidateSet::with_bindings(
                MatchMethod::AlternateNameLookup,
                combined,
            ));
        }

        let best = reconcile::best_guess(&self.client, &self.reconcile_endpoint, literal).await?;
        let set = self.mention(&best, false).await?;
        debug!(target: TARGET_KG_REQUEST, "\"{literal}\" reconciled as \"{best}\"");
        Some(CandidateSet::with_bindings(
            MatchMethod::ReconciliationLookup,
            set.bindings,
        ))
    }

    async fn reverse_mention(&self, literal: &str) -> Option<CandidateSet> {
        let query = sparql::reverse_query(literal);
        let response = self.run_sparql(&query, REVERSE_TIMEOUT).await?;
        let mut bindings = sparql::decode_statements(response);
        if bindings.is_empty() {
            return None;
        }
        // The queried literal labels every matched tail.
        for binding in &mut bindings {
            binding.value_label = Some(literal.to_string());
        }
        Some(CandidateSet::with_bindings(
            MatchMethod::ReverseTailLookup,
            bindings,
        ))
    }

    async fn joint_property(&self, pairs: &[(String, String)]) -> Option<CandidateSet> {
        if pairs.is_empty() {
            return None;
        }
        let query = sparql::joint_query(pairs);
        let response = self.run_sparql(&query, JOINT_TIMEOUT).await?;
        let bindings = sparql::decode_statements(response);
        if bindings.is_empty() {
            return None;
        }
        Some(CandidateSet::with_bindings(
            MatchMethod::JointPropertyLookup,
            bindings,
        ))
    }

    async fn typed_label(&self, literal: &str, class_id: &str) -> Option<Vec<(String, String)>> {
        let query = sparql::typed_query(literal, terminal_id(class_id));
        let response = self.run_sparql(&query, TYPED_TIMEOUT).await?;
        let pairs = sparql::decode_typed(response);
        if pairs.is_empty() {
            None
        } else {
            Some(pairs)
        }
    }

    async fn class_labels(&self, class_id: &str) -> Option<Vec<String>> {
        let query = sparql::enumeration_query(terminal_id(class_id));
        let response = self.run_sparql(&query, ENUMERATION_TIMEOUT).await?;
        let labels = sparql::decode_labels(response);
        if labels.is_empty() {
            None
        } else {
            Some(labels)
        }
    }

    async fn common_class(&self, first: &str, second: &str) -> Option<String> {
        let query = sparql::common_class_query(terminal_id(first), terminal_id(second));
        let response = self.run_sparql(&query, ANCESTOR_TIMEOUT).await?;
        sparql::decode_ancestor(response)
    }
}
