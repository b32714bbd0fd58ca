//! SPARQL query construction and response decoding. Queries are built as
//! plain text against the Wikidata vocabulary; responses come back in the
//! standard SPARQL JSON shape and are flattened into candidate bindings.

use serde::Deserialize;

use super::types::CandidateBinding;

/// One cell of a SPARQL result row.
#[derive(Debug, Clone, Deserialize)]
pub struct SparqlValue {
    pub value: String,
}

/// A result row. Every field is optional because each query selects a
/// different subset of these variables.
#[derive(Debug, Default, Deserialize)]
pub struct SparqlRow {
    pub item: Option<SparqlValue>,
    #[serde(rename = "itemType")]
    pub item_type: Option<SparqlValue>,
    #[serde(rename = "itemLabel")]
    pub item_label: Option<SparqlValue>,
    pub p2: Option<SparqlValue>,
    pub value: Option<SparqlValue>,
    #[serde(rename = "valueType")]
    pub value_type: Option<SparqlValue>,
    #[serde(rename = "valueLabel")]
    pub value_label: Option<SparqlValue>,
    #[serde(rename = "psvalueLabel")]
    pub ps_value_label: Option<SparqlValue>,
    #[serde(rename = "super")]
    pub ancestor: Option<SparqlValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SparqlResults {
    pub bindings: Vec<SparqlRow>,
}

#[derive(Debug, Deserialize)]
pub struct SparqlResponse {
    pub results: SparqlResults,
}

fn escape_literal(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Statements of every entity carrying the label, via any predicate. The
/// optional statement-property block recovers clean labels for qualified
/// values. `with_subject_label` additionally pulls the English label of the
/// subject itself.
pub fn mention_query(label: &str, with_subject_label: bool) -> String {
    let label = escape_literal(label);
    let (extra, label_clause) = if with_subject_label {
        (
            "?itemLabel ",
            "\n    ?item rdfs:label ?itemLabel.\n    FILTER (lang(?itemLabel) = \"en\").",
        )
    } else {
        ("", "")
    };
    format!(
        r#"SELECT DISTINCT ?item {extra}?itemType ?p1 ?p2 ?value ?valueType ?valueLabel ?psvalueLabel WHERE {{
    ?item ?p1 "{label}"@en;
          ?p2 ?value.{label_clause}
    OPTIONAL {{ ?item wdt:P31 ?itemType. }}
    OPTIONAL {{ ?value wdt:P31 ?valueType. }}
    OPTIONAL {{
        ?wdproperty wikibase:claim ?p2 ;
                    wikibase:statementProperty ?psproperty .
        ?value ?psproperty ?psvalue .
    }}
    SERVICE wikibase:label {{ bd:serviceParam wikibase:language "en". }}
}}
LIMIT 100000"#
    )
}

/// Subjects pointing at the entity carrying the label, for resolving a row
/// through one of its tail cells.
pub fn reverse_query(label: &str) -> String {
    let label = escape_literal(label);
    format!(
        r#"SELECT REDUCED ?value ?valueType ?p2 ?item ?itemType ?itemLabel WHERE {{
    ?value rdfs:label "{label}"@en;
           wdt:P31 ?valueType.
    ?item ?p2 [ ?x "{label}"@en].
    ?item wdt:P31 ?itemType.
    ?item rdfs:label ?itemLabel.
    FILTER((LANG(?itemLabel)) = "en").
}}
LIMIT 10000"#
    )
}

/// Entities related to every (property, literal) pair at once, plus all of
/// their statements. Properties are bare identifiers like "P17".
pub fn joint_query(pairs: &[(String, String)]) -> String {
    let mut constraints = String::new();
    for (index, (property, literal)) in pairs.iter().enumerate() {
        let literal = escape_literal(literal);
        constraints.push_str(&format!(
            " wdt:{property} [ ?p \"{literal}\"@en ] ;\n          wdt:{property} ?value{index};\n         "
        ));
    }
    format!(
        r#"SELECT REDUCED ?item ?itemType ?itemLabel ?p2 ?value ?valueType ?valueLabel ?psvalueLabel WHERE {{
    ?item{constraints} ?p2 ?value.
    ?item wdt:P31 ?itemType;
          rdfs:label ?itemLabel.
    FILTER (lang(?itemLabel) = "en").
    OPTIONAL {{ ?value wdt:P31 ?valueType. }}
    OPTIONAL {{
        ?wdproperty wikibase:claim ?p2 ;
                    wikibase:statementProperty ?psproperty .
        ?value ?psproperty ?psvalue .
    }}
    SERVICE wikibase:label {{ bd:serviceParam wikibase:language "en". }}
}}
LIMIT 50000"#
    )
}

/// Entities carrying the label or alias that are instances of the class.
pub fn typed_query(label: &str, class_id: &str) -> String {
    let label = escape_literal(label);
    format!(
        r#"SELECT REDUCED ?item ?itemLabel WHERE {{
    {{?item rdfs:label "{label}"@en.}} UNION
    {{?item skos:altLabel "{label}"@en.}}
    ?item wdt:P31 wd:{class_id}.
    SERVICE wikibase:label {{ bd:serviceParam wikibase:language "en". }}
}}
LIMIT 10000"#
    )
}

/// English labels of every instance of the class.
pub fn enumeration_query(class_id: &str) -> String {
    format!(
        r#"SELECT REDUCED ?itemLabel WHERE {{
    ?item wdt:P31 wd:{class_id};
          rdfs:label ?itemLabel.
    FILTER (lang(?itemLabel) = "en").
}}
LIMIT 1000000"#
    )
}

/// Nearest common superclass of two classes via shortest paths over the
/// subclass hierarchy. Identifiers are bare, like "Q5".
pub fn common_class_query(first: &str, second: &str) -> String {
    let mut blocks = String::new();
    for id in [first, second] {
        blocks.push_str(&format!(
            r#"
    SERVICE gas:service {{
        gas:program gas:gasClass "com.bigdata.rdf.graph.analytics.SSSP" ;
                    gas:in wd:{id} ;
                    gas:traversalDirection "Forward" ;
                    gas:out ?super ;
                    gas:out1 ?len{id} ;
                    gas:maxIterations 10 ;
                    gas:linkType wdt:P279 .
    }}"#
        ));
    }
    format!(
        r#"PREFIX gas: <http://www.bigdata.com/rdf/gas#>
SELECT ?super (?len{first} + ?len{second} as ?length) WHERE {{{blocks}
}} ORDER BY ?length
LIMIT 1"#
    )
}

/// Flattens statement-shaped rows into candidate bindings. Rows missing the
/// subject, predicate, or value are dropped. The statement-property label
/// wins over the plain value label when both are present.
pub fn decode_statements(response: SparqlResponse) -> Vec<CandidateBinding> {
    let mut bindings = Vec::new();
    for row in response.results.bindings {
        let (Some(item), Some(p2), Some(value)) = (row.item, row.p2, row.value) else {
            continue;
        };
        let mut binding = CandidateBinding::new(&item.value, &p2.value, &value.value);
        binding.subject_type = row.item_type.map(|v| v.value);
        binding.subject_label = row.item_label.map(|v| v.value);
        binding.value_type = row.value_type.map(|v| v.value);
        binding.value_label = row.ps_value_label.or(row.value_label).map(|v| v.value);
        bindings.push(binding);
    }
    bindings
}

/// (entity, label) pairs from the typed-label query.
pub fn decode_typed(response: SparqlResponse) -> Vec<(String, String)> {
    response
        .results
        .bindings
        .into_iter()
        .filter_map(|row| match (row.item, row.item_label) {
            (Some(item), Some(label)) => Some((item.value, label.value)),
            _ => None,
        })
        .collect()
}

/// Bare labels from the enumeration query.
pub fn decode_labels(response: SparqlResponse) -> Vec<String> {
    response
        .results
        .bindings
        .into_iter()
        .filter_map(|row| row.item_label.map(|v| v.value))
        .collect()
}

/// The single ancestor row of the common-class query, if any.
pub fn decode_ancestor(response: SparqlResponse) -> Option<String> {
    response
        .results
        .bindings
        .into_iter()
        .next()
        .and_then(|row| row.ancestor.map(|v| v.value))
}
