//! The value-matching ladder that decides which candidate labels a cell
//! refers to. Steps run strictest first, and the first step that matches
//! anything wins.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

use crate::kg::{CandidateBinding, CandidateSet};
use crate::similarity::close_matches;

/// Tight and loose cutoffs for the fuzzy step, and how many labels it keeps.
pub const FUZZY_TIGHT_CUTOFF: f64 = 0.95;
pub const FUZZY_LOOSE_CUTOFF: f64 = 0.5;
pub const FUZZY_LIMIT: usize = 3;

/// A date candidate must be strictly closer than this many days.
pub const DATE_TOLERANCE_DAYS: i64 = 183;

/// Numeric candidates must lie within this fraction of the target value.
pub const NUMERIC_TOLERANCE: f64 = 0.02;

lazy_static! {
    static ref ISO_DATE_PREFIX: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap();
    static ref SLASH_DATE: Regex = Regex::new(r"^(\d{4})/(\d{2})/(\d{2})$").unwrap();
    static ref INITIALED_NAME: Regex = Regex::new(r"^(\w\. )+([\w\-']+)$").unwrap();
    static ref MIXED_INITIAL_NAME: Regex = Regex::new(r"^([\w\-']+ )+(\w\. )+([\w\-']+)$").unwrap();
}

/// Parses a number the way cells carry them, with thousands separators
/// stripped first.
pub fn parse_numeric(text: &str) -> Option<f64> {
    let stripped = text.replace(',', "");
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

pub fn is_numeric(text: &str) -> bool {
    parse_numeric(text).is_some()
}

/// True for `YYYY/MM/DD` cells, which are normalized to dashes before
/// matching.
pub fn is_slash_date(text: &str) -> bool {
    SLASH_DATE.is_match(text)
}

/// Parses the leading `YYYY-MM-DD` of a label or target. Stored datetime
/// labels carry a time suffix that is ignored here.
fn parse_iso_prefix(text: &str) -> Option<NaiveDate> {
    if !ISO_DATE_PREFIX.is_match(text) {
        return None;
    }
    let prefix = text.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// Reduces an initialed person name to its core: "V. Futter" becomes
/// "Futter" and "Ellen V. Futter" becomes "Ellen Futter". Returns `None`
/// when the target is not name-shaped.
fn core_name(target: &str) -> Option<String> {
    if let Some(caps) = INITIALED_NAME.captures(target) {
        return Some(caps[2].to_string());
    }
    if let Some(caps) = MIXED_INITIAL_NAME.captures(target) {
        return Some(format!("{}{}", &caps[1], &caps[3]));
    }
    None
}

/// Runs the matching ladder over candidate labels and returns the labels the
/// target matches. An empty result means no step matched. The target is
/// classified once (numeric, date, plain) and that classification selects
/// which of the looser steps may run.
pub fn match_labels(labels: &[String], target: &str) -> Vec<String> {
    if labels.is_empty() || target.is_empty() {
        return Vec::new();
    }

    let slash_normalized;
    let target = match SLASH_DATE.captures(target) {
        Some(caps) => {
            slash_normalized = format!("{}-{}-{}", &caps[1], &caps[2], &caps[3]);
            slash_normalized.as_str()
        }
        None => target,
    };

    let numeric = parse_numeric(target);
    let comma_stripped;
    let target = if numeric.is_some() && target.contains(',') {
        comma_stripped = target.replace(',', "");
        comma_stripped.as_str()
    } else {
        target
    };

    // 1. exact label equality
    let exact: Vec<String> = labels.iter().filter(|l| l.as_str() == target).cloned().collect();
    if !exact.is_empty() {
        return exact;
    }

    // 2. case-insensitive equality, meaningless for numbers
    if numeric.is_none() {
        let target_lower = target.to_lowercase();
        let ci: Vec<String> = labels
            .iter()
            .filter(|l| l.to_lowercase() == target_lower)
            .cloned()
            .collect();
        if !ci.is_empty() {
            return ci;
        }
    }

    if let Some(value) = numeric {
        return match_numeric(labels, value);
    }
    if let Some(date) = parse_iso_prefix(target) {
        return match_nearest_date(labels, date);
    }

    // 3. fuzzy similarity, tight cutoff before loose
    let fuzzy = close_matches(target, labels, FUZZY_LIMIT, FUZZY_TIGHT_CUTOFF);
    if !fuzzy.is_empty() {
        return fuzzy;
    }
    let fuzzy = close_matches(target, labels, FUZZY_LIMIT, FUZZY_LOOSE_CUTOFF);
    if !fuzzy.is_empty() {
        return fuzzy;
    }

    // 4. initialed-name reduction
    match_core_name(labels, target)
}

/// Matches candidate bindings by their value labels, returning the bindings
/// whose label the ladder accepted.
pub fn match_candidates<'a>(set: &'a CandidateSet, target: &str) -> Vec<&'a CandidateBinding> {
    let labels: Vec<String> = set
        .bindings
        .iter()
        .filter_map(|binding| binding.value_label.clone())
        .collect();
    let matched = match_labels(&labels, target);
    if matched.is_empty() {
        return Vec::new();
    }
    set.bindings
        .iter()
        .filter(|binding| {
            binding
                .value_label
                .as_deref()
                .is_some_and(|label| matched.iter().any(|m| m == label))
        })
        .collect()
}

fn match_core_name(labels: &[String], target: &str) -> Vec<String> {
    let Some(core) = core_name(target) else {
        return Vec::new();
    };
    let tokens: Vec<String> = core.to_lowercase().split_whitespace().map(str::to_string).collect();
    if tokens.is_empty() {
        return Vec::new();
    }
    labels
        .iter()
        .filter(|label| {
            let lower = label.to_lowercase();
            tokens.iter().all(|token| lower.contains(token.as_str()))
        })
        .cloned()
        .collect()
}

/// Selects the single date label closest to the target, but only when it is
/// strictly within the tolerance. Ties keep the earlier candidate.
fn match_nearest_date(labels: &[String], target: NaiveDate) -> Vec<String> {
    let mut best: Option<(i64, &String)> = None;
    for label in labels {
        let Some(date) = parse_iso_prefix(label) else {
            continue;
        };
        let distance = (date - target).num_days().abs();
        if best.map_or(true, |(closest, _)| distance < closest) {
            best = Some((distance, label));
        }
    }
    match best {
        Some((distance, label)) if distance < DATE_TOLERANCE_DAYS => vec![label.clone()],
        _ => Vec::new(),
    }
}

/// Keeps every numeric label within the relative tolerance of the target.
fn match_numeric(labels: &[String], target: f64) -> Vec<String> {
    labels
        .iter()
        .filter(|label| {
            parse_numeric(label)
                .is_some_and(|value| (value - target).abs() <= NUMERIC_TOLERANCE * target.abs())
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MatchMethod;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_match_wins() {
        let candidates = labels(&["Paris", "paris", "Pariss"]);
        assert_eq!(match_labels(&candidates, "Paris"), vec!["Paris"]);
    }

    #[test]
    fn test_case_insensitive_when_exact_misses() {
        let candidates = labels(&["PARIS", "Prague"]);
        assert_eq!(match_labels(&candidates, "paris"), vec!["PARIS"]);
    }

    #[test]
    fn test_fuzzy_tight_before_loose() {
        // "Ellen Futterr" passes the tight cutoff, so the loose-only
        // "Ellen" is not considered at all.
        let candidates = labels(&["Ellen Futterr", "Ellen"]);
        assert_eq!(
            match_labels(&candidates, "Ellen Futter"),
            vec!["Ellen Futterr"]
        );
    }

    #[test]
    fn test_fuzzy_loose_when_tight_misses() {
        let candidates = labels(&["Paris France", "Prague"]);
        assert_eq!(match_labels(&candidates, "Paris"), vec!["Paris France"]);
    }

    #[test]
    fn test_initialed_name_reduction() {
        // The long label is too dissimilar for even the loose fuzzy rung,
        // but it contains the core name token.
        let candidates = labels(&[
            "Barnard College president Ellen Futter",
            "Peter Cook",
        ]);
        let matched = match_labels(&candidates, "E. V. Futter");
        assert_eq!(matched, vec!["Barnard College president Ellen Futter"]);
    }

    #[test]
    fn test_mixed_initial_name_reduction() {
        let candidates = labels(&[
            "Futter, Ellen V., president of Barnard College",
            "Ellen Swallow",
        ]);
        assert_eq!(
            match_labels(&candidates, "Ellen V. Futter"),
            vec!["Futter, Ellen V., president of Barnard College"]
        );
    }

    #[test]
    fn test_date_picks_single_nearest() {
        let candidates = labels(&["2001-06-01", "2001-01-10"]);
        assert_eq!(match_labels(&candidates, "2001-01-01"), vec!["2001-01-10"]);
    }

    #[test]
    fn test_date_tolerance_is_strict() {
        // 2001-07-03 is exactly 183 days after 2001-01-01.
        assert!(match_labels(&labels(&["2001-07-03"]), "2001-01-01").is_empty());
        assert_eq!(
            match_labels(&labels(&["2001-07-02"]), "2001-01-01"),
            vec!["2001-07-02"]
        );
    }

    #[test]
    fn test_date_matches_datetime_labels() {
        let candidates = labels(&["2001-01-10T00:00:00Z"]);
        assert_eq!(
            match_labels(&candidates, "2001-01-01"),
            vec!["2001-01-10T00:00:00Z"]
        );
    }

    #[test]
    fn test_slash_date_normalized() {
        let candidates = labels(&["2001-01-10"]);
        assert_eq!(match_labels(&candidates, "2001/01/10"), vec!["2001-01-10"]);
    }

    #[test]
    fn test_numeric_tolerance() {
        let candidates = labels(&["101", "102", "130"]);
        assert_eq!(match_labels(&candidates, "100"), vec!["101", "102"]);
    }

    #[test]
    fn test_numeric_commas_stripped() {
        let candidates = labels(&["1234"]);
        assert_eq!(match_labels(&candidates, "1,234"), vec!["1234"]);
    }

    #[test]
    fn test_numeric_does_not_fuzzy_match() {
        // Without the numeric classification these would pass the loose
        // fuzzy cutoff.
        let candidates = labels(&["130", "190"]);
        assert!(match_labels(&candidates, "100").is_empty());
    }

    #[test]
    fn test_empty_inputs() {
        assert!(match_labels(&[], "Paris").is_empty());
        assert!(match_labels(&labels(&["Paris"]), "").is_empty());
    }

    #[test]
    fn test_match_candidates_filters_bindings() {
        let set = CandidateSet::with_bindings(
            MatchMethod::DirectLookup,
            vec![
                CandidateBinding::new(
                    "http://www.wikidata.org/entity/Q90",
                    "http://www.wikidata.org/prop/direct/P17",
                    "http://www.wikidata.org/entity/Q142",
                )
                .with_value_label("France"),
                CandidateBinding::new(
                    "http://www.wikidata.org/entity/Q90",
                    "http://www.wikidata.org/prop/direct/P1082",
                    "2165423",
                )
                .with_value_label("2165423"),
            ],
        );
        let matched = match_candidates(&set, "France");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].value_label.as_deref(), Some("France"));
    }

    #[test]
    fn test_is_slash_date() {
        assert!(is_slash_date("2001/01/10"));
        assert!(!is_slash_date("2001-01-10"));
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric("1,234"), Some(1234.0));
        assert_eq!(parse_numeric("12.5"), Some(12.5));
        assert_eq!(parse_numeric("Paris"), None);
        assert_eq!(parse_numeric(""), None);
    }
}
