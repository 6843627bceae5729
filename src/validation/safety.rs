use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::config::{ApiKey, Config};
use crate::types::SafetyResult;

const THREAT_TYPES: &[&str] = &[
    "MALWARE",
    "SOCIAL_ENGINEERING",
    "UNWANTED_SOFTWARE",
    "POTENTIALLY_HARMFUL_APPLICATION",
];
const PLATFORM_TYPES: &[&str] = &["ANY_PLATFORM"];
const THREAT_ENTRY_TYPES: &[&str] = &["URL"];

// Matched case-insensitively against the whole URL.
const SUSPICIOUS_PATTERNS: &[&str] = &["phishing", "malware", "scam", "suspicious"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThreatMatchRequest<'a> {
    client: ClientInfo<'a>,
    threat_info: ThreatInfo<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientInfo<'a> {
    client_id: &'a str,
    client_version: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThreatInfo<'a> {
    threat_types: &'a [&'a str],
    platform_types: &'a [&'a str],
    threat_entry_types: &'a [&'a str],
    threat_entries: Vec<ThreatEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct ThreatEntry<'a> {
    url: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ThreatMatchResponse {
    #[serde(default)]
    matches: Vec<ThreatMatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreatMatch {
    threat_type: String,
}

/// Screens signed URLs for obvious threats before they are fetched.
///
/// Without an API key the check is skipped, and the verdict says so. With a key the URL
/// goes through local heuristics and then the threat-matching API. Endpoint
/// unavailability degrades to a "skipped" verdict and is logged, never raised.
#[derive(Debug, Clone)]
pub struct UrlSafetyValidator {
    client: reqwest::Client,
    endpoint: String,
    client_id: String,
    client_version: String,
}

impl UrlSafetyValidator {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_milliseconds))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.safe_browsing_endpoint.clone(),
            client_id: config.safe_browsing_client_id.clone(),
            client_version: config.safe_browsing_client_version.clone(),
        })
    }

    pub async fn check(&self, url: &str, api_key: Option<&ApiKey>) -> SafetyResult {
        let Some(api_key) = api_key else {
            debug!("no Safe Browsing API key configured, safety check skipped.");
            return SafetyResult::skipped();
        };

        if let Err(e) = Url::parse(url) {
            return SafetyResult::unsafe_because(format!("Invalid URL format: {e}"));
        }

        if let Some(pattern) = suspicious_pattern(url) {
            return SafetyResult::unsafe_because(format!(
                "URL contains suspicious pattern: {pattern}"
            ));
        }

        match self.find_threat_matches(url, api_key).await {
            Ok(matches) if matches.is_empty() => SafetyResult::safe(),
            Ok(matches) => {
                let threat_types = matches
                    .into_iter()
                    .map(|m| m.threat_type)
                    .collect::<Vec<_>>()
                    .join(", ");
                warn!(threat_types = %threat_types, "signed URL flagged by Safe Browsing.");
                SafetyResult::unsafe_because(format!("Threat detected: {threat_types}"))
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Safe Browsing check degraded, treated as skipped.");
                SafetyResult::degraded(&format!("{e:#}"))
            }
        }
    }

    async fn find_threat_matches(&self, url: &str, api_key: &ApiKey) -> Result<Vec<ThreatMatch>> {
        let request = ThreatMatchRequest {
            client: ClientInfo {
                client_id: &self.client_id,
                client_version: &self.client_version,
            },
            threat_info: ThreatInfo {
                threat_types: THREAT_TYPES,
                platform_types: PLATFORM_TYPES,
                threat_entry_types: THREAT_ENTRY_TYPES,
                threat_entries: vec![ThreatEntry { url }],
            },
        };

        // The key travels in the query string; errors must not carry the request URL.
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", api_key.expose())])
            .json(&request)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Safe Browsing request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("Safe Browsing API returned {status}"));
        }

        let body = response
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .context("failed to read Safe Browsing response")?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        let parsed: ThreatMatchResponse =
            serde_json::from_str(&body).context("failed to parse Safe Browsing response")?;
        debug!(matches = parsed.matches.len(), "Safe Browsing lookup completed.");
        Ok(parsed.matches)
    }
}

fn suspicious_pattern(url: &str) -> Option<&'static str> {
    let lowered = url.to_lowercase();
    SUSPICIOUS_PATTERNS
        .iter()
        .find(|pattern| lowered.contains(*pattern))
        .copied()
}
