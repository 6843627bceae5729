//! Signed URL extraction and expiration parsing.
//!
//! Two expiration encodings are recognised, in this order:
//! - `Expires=<unix seconds>`
//! - `X-Goog-Date=<YYYYMMDDTHHMMSSZ>` plus `X-Goog-Expires=<offset seconds>`
//!
//! A URL carrying neither has an unknown expiration. Unknown is a value, not an error,
//! and is never to be read as "not expired".

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use once_cell::sync::OnceCell;
use tracing::trace;
use url::Url;

use crate::types::ExpiryStatus;

pub mod duration;
#[cfg(test)]
mod expiration_properties;

pub const SIGNED_URL_HOST_MARKER: &str = "https://storage.googleapis.com";

const EXPIRES_PARAM: &str = "Expires";
const GOOG_DATE_PARAM: &str = "X-Goog-Date";
const GOOG_EXPIRES_PARAM: &str = "X-Goog-Expires";
const SIGNED_URL_LABEL: &str = "signed_url:";
const COMPACT_DATE_LENGTH: usize = 15;

/// A signed URL with its expiration instant computed on first use.
#[derive(Debug, Clone)]
pub struct SignedUrl {
    url: String,
    expiration: OnceCell<Option<DateTime<Utc>>>,
}

impl SignedUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            expiration: OnceCell::new(),
        }
    }

    /// Extract the signed URL from `sign-url` command output.
    pub fn from_output(stdout: &str) -> Option<Self> {
        extract_signed_url(stdout).map(Self::new)
    }

    pub fn from_output_for_host(stdout: &str, host: &str) -> Option<Self> {
        extract_signed_url_for_host(stdout, host).map(Self::new)
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        *self.expiration.get_or_init(|| parse_expiration(&self.url))
    }

    pub fn expiry_status(&self, now: DateTime<Utc>) -> ExpiryStatus {
        status_from(self.expiration(), now)
    }
}

/// Return the first line of `stdout` that carries a signed storage URL.
///
/// Lines are matched on the storage host and must start with `https://` once trimmed.
/// A leading `signed_url:` label, as printed by the CLI's default format, is skipped.
pub fn extract_signed_url(stdout: &str) -> Option<String> {
    extract_signed_url_for_host(stdout, SIGNED_URL_HOST_MARKER)
}

/// Like [`extract_signed_url`], for a storage endpoint other than the public one.
///
/// The candidate must start with the scheme of `host`.
pub fn extract_signed_url_for_host(stdout: &str, host: &str) -> Option<String> {
    let scheme = match host.split_once("://") {
        Some((scheme, _)) => format!("{scheme}://"),
        None => "https://".to_string(),
    };

    stdout
        .lines()
        .filter(|line| line.contains(host))
        .find_map(|line| {
            let trimmed = line.trim();
            let candidate = trimmed
                .strip_prefix(SIGNED_URL_LABEL)
                .map(str::trim)
                .unwrap_or(trimmed);
            candidate
                .starts_with(scheme.as_str())
                .then(|| candidate.to_string())
        })
}

/// Parse the absolute expiration instant of a signed URL.
///
/// Returns `None` when the URL is malformed, carries neither encoding, or carries a
/// field that does not parse.
pub fn parse_expiration(url: &str) -> Option<DateTime<Utc>> {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => {
            trace!(error = %e, "signed URL does not parse.");
            return None;
        }
    };

    let query_value = |name: &str| {
        parsed
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    };

    if let Some(expires) = query_value(EXPIRES_PARAM).filter(|v| !v.is_empty()) {
        let seconds = expires.parse::<i64>().ok()?;
        return Utc.timestamp_opt(seconds, 0).single();
    }

    let date = query_value(GOOG_DATE_PARAM)?;
    let offset = query_value(GOOG_EXPIRES_PARAM)?;

    let base = parse_compact_utc(&date)?;
    let offset = offset.parse::<i64>().ok()?;
    base.checked_add_signed(Duration::try_seconds(offset)?)
}

/// Parse `YYYYMMDDTHHMMSSZ` positionally as a UTC instant.
fn parse_compact_utc(value: &str) -> Option<DateTime<Utc>> {
    let bytes = value.as_bytes();
    if bytes.len() != COMPACT_DATE_LENGTH
        || !value.is_ascii()
        || bytes[8] != b'T'
        || bytes[14] != b'Z'
    {
        return None;
    }

    let field = |range: std::ops::Range<usize>| -> Option<u32> {
        let digits = &value[range];
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    };

    let year = field(0..4)? as i32;
    let month = field(4..6)?;
    let day = field(6..8)?;
    let hour = field(9..11)?;
    let minute = field(11..13)?;
    let second = field(13..15)?;

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    Some(naive.and_utc())
}

/// Whether `url` is past its expiration at `now`. At the exact instant it is still valid.
pub fn expiry_status(url: &str, now: DateTime<Utc>) -> ExpiryStatus {
    status_from(parse_expiration(url), now)
}

fn status_from(expiration: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ExpiryStatus {
    match expiration {
        Some(expiration) if expiration < now => ExpiryStatus::Expired,
        Some(_) => ExpiryStatus::NotExpired,
        None => ExpiryStatus::Unknown,
    }
}
