//! HTTP plumbing shared by every remote lookup: timeouts wrapped around the
//! request, a single retry when the endpoint rate-limits, and a randomized
//! user agent so throttling does not pin a fixed identity.

use std::time::Duration;

use rand::Rng;
use reqwest::header::{ACCEPT, RETRY_AFTER, USER_AGENT};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use super::types::LookupError;
use crate::TARGET_KG_REQUEST;

const RETRY_AFTER_FALLBACK: Duration = Duration::from_secs(1);

/// Leading letter, a fixed middle, then four to eight lowercase letters.
fn random_user_agent() -> String {
    const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    let lead = LETTERS[rng.random_range(0..LETTERS.len())] as char;
    let suffix: String = (0..rng.random_range(4..9))
        .map(|_| LOWER[rng.random_range(0..LOWER.len())] as char)
        .collect();
    format!("{lead}arachne-{suffix}")
}

#[derive(Debug, Clone)]
pub struct KgClient {
    http: reqwest::Client,
}

impl KgClient {
    pub fn new() -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(KgClient { http })
    }

    /// GET a JSON document. A rate-limited response is retried exactly once
    /// after waiting out the server's Retry-After.
    pub async fn get_json(
        &self,
        url: &str,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Value, LookupError> {
        match self.get_json_once(url, params, timeout).await {
            Err(LookupError::RateLimited { retry_after }) => {
                warn!(
                    target: TARGET_KG_REQUEST,
                    "rate limited by {url}, retrying after {retry_after:?}"
                );
                tokio::time::sleep(retry_after).await;
                self.get_json_once(url, params, timeout).await
            }
            other => other,
        }
    }

    async fn get_json_once(
        &self,
        url: &str,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Value, LookupError> {
        debug!(target: TARGET_KG_REQUEST, "GET {url} with timeout {timeout:?}");
        let request = self
            .http
            .get(url)
            .query(params)
            .header(USER_AGENT, random_user_agent())
            .header(ACCEPT, "application/sparql-results+json, application/json");

        let response = match tokio::time::timeout(timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => return Err(LookupError::Http(error)),
            Err(_) => return Err(LookupError::Timeout(timeout)),
        };

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(RETRY_AFTER_FALLBACK);
            return Err(LookupError::RateLimited { retry_after });
        }
        if !response.status().is_success() {
            return Err(LookupError::Status(response.status()));
        }

        match tokio::time::timeout(timeout, response.json::<Value>()).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(LookupError::Decode(error.to_string())),
            Err(_) => Err(LookupError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_user_agent_shape() {
        for _ in 0..25 {
            let agent = random_user_agent();
            let mut chars = agent.chars();
            let lead = chars.next().unwrap();
            assert!(lead.is_ascii_alphabetic());
            let rest: String = chars.collect();
            assert!(rest.starts_with("arachne-"));
            let suffix = &rest["arachne-".len()..];
            assert!((4..=8).contains(&suffix.len()));
            assert!(suffix.chars().all(|c| c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn test_client_builds() {
        assert!(KgClient::new().is_ok());
    }
}
