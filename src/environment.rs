use std::env;

use tracing::warn;
use url::Url;

pub const DEFAULT_SPARQL_ENDPOINT: &str = "https://query.wikidata.org/sparql";
pub const DEFAULT_RECONCILE_ENDPOINT: &str = "https://wikidata.reconci.link/en/api";
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://www.wikidata.org/w/api.php";

/// Retrieves an environment variable, falling back to a default when it is
/// unset or blank.
///
/// # Arguments
/// - `var`: The name of the environment variable.
/// - `default`: The value used when the variable is unset or blank.
///
/// # Returns
/// - `String`
pub fn get_env_var_or(var: &str, default: &str) -> String {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}

/// Reads an endpoint URL from the environment, rejecting anything that is not
/// http(s) in favor of the built-in default.
fn endpoint_from_env(var: &str, default: &str) -> String {
    let value = get_env_var_or(var, default);
    match Url::parse(&value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => value,
        _ => {
            warn!("{} is not a valid http(s) URL ({}), using {}", var, value, default);
            default.to_string()
        }
    }
}

/// The SPARQL endpoint queried for candidate lookups.
pub fn sparql_endpoint() -> String {
    endpoint_from_env("ARACHNE_SPARQL_ENDPOINT", DEFAULT_SPARQL_ENDPOINT)
}

/// The W3C reconciliation service consulted when direct lookups miss.
pub fn reconcile_endpoint() -> String {
    endpoint_from_env("ARACHNE_RECONCILE_ENDPOINT", DEFAULT_RECONCILE_ENDPOINT)
}

/// The MediaWiki API used for alternate-name suggestions.
pub fn search_endpoint() -> String {
    endpoint_from_env("ARACHNE_SEARCH_ENDPOINT", DEFAULT_SEARCH_ENDPOINT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_default_when_unset() {
        assert_eq!(
            get_env_var_or("ARACHNE_TEST_UNSET_VAR", "fallback"),
            "fallback"
        );
    }

    #[test]
    fn test_env_var_trims_value() {
        env::set_var("ARACHNE_TEST_TRIM_VAR", "  value  ");
        assert_eq!(get_env_var_or("ARACHNE_TEST_TRIM_VAR", "fallback"), "value");
        env::remove_var("ARACHNE_TEST_TRIM_VAR");
    }

    #[test]
    fn test_invalid_endpoint_falls_back() {
        env::set_var("ARACHNE_TEST_BAD_ENDPOINT", "not a url");
        assert_eq!(
            endpoint_from_env("ARACHNE_TEST_BAD_ENDPOINT", DEFAULT_SPARQL_ENDPOINT),
            DEFAULT_SPARQL_ENDPOINT
        );
        env::remove_var("ARACHNE_TEST_BAD_ENDPOINT");
    }
}
