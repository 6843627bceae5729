use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use tracing::debug;

use crate::config::Config;
use crate::types::HttpResult;

/// Issues single GET/POST requests against a signed URL and classifies the status.
///
/// Every request is bounded by the configured timeout. Transport failures are returned
/// as [`HttpResult`] values, never as errors.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("gsverify/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(Duration::from_millis(config.http_timeout_milliseconds))
    }

    /// GET the URL. Any status below 500 completes the request; success means exactly 200.
    pub async fn get(&self, url: &str) -> HttpResult {
        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                debug!(method = "GET", status = status.as_u16(), "HTTP probe completed.");
                if status.is_server_error() {
                    return HttpResult {
                        succeeded: false,
                        status_code: Some(status.as_u16()),
                        error: Some(format!("Request failed with status code {}", status.as_u16())),
                    };
                }
                completed(status)
            }
            Err(e) => transport_failure("GET", e),
        }
    }

    /// POST an empty JSON body to the URL. Every status completes the request.
    pub async fn post(&self, url: &str) -> HttpResult {
        match self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{}")
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status();
                debug!(method = "POST", status = status.as_u16(), "HTTP probe completed.");
                completed(status)
            }
            Err(e) => transport_failure("POST", e),
        }
    }
}

fn completed(status: StatusCode) -> HttpResult {
    HttpResult {
        succeeded: status == StatusCode::OK,
        status_code: Some(status.as_u16()),
        error: None,
    }
}

fn transport_failure(method: &str, e: reqwest::Error) -> HttpResult {
    debug!(method = method, error = %e, "HTTP probe failed.");
    HttpResult {
        succeeded: false,
        status_code: e.status().map(|s| s.as_u16()),
        error: Some(e.to_string()),
    }
}
