use chrono::{DateTime, Utc};
use tracing::debug;

use crate::signed_url::parse_expiration;

/// Whether the remaining lifetime of `url` is `expected_seconds` give or take
/// `tolerance_seconds`, measured against the current clock.
///
/// Fails closed: an unknown expiration is never within tolerance.
pub fn is_within_tolerance(url: &str, expected_seconds: i64, tolerance_seconds: i64) -> bool {
    is_within_tolerance_at(url, expected_seconds, tolerance_seconds, Utc::now())
}

pub fn is_within_tolerance_at(
    url: &str,
    expected_seconds: i64,
    tolerance_seconds: i64,
    now: DateTime<Utc>,
) -> bool {
    let Some(expiration) = parse_expiration(url) else {
        debug!("expiration unknown, duration check fails closed.");
        return false;
    };

    let actual_seconds = remaining_seconds(expiration, now);
    let within = actual_seconds
        .checked_sub(expected_seconds)
        .map(|diff| diff.unsigned_abs() <= tolerance_seconds.max(0) as u64)
        .unwrap_or(false);

    debug!(
        actual_seconds = actual_seconds,
        expected_seconds = expected_seconds,
        tolerance_seconds = tolerance_seconds,
        within = within,
        "signed URL duration checked."
    );
    within
}

/// Whole seconds left until `expiration`, rounded toward negative infinity.
pub fn remaining_seconds(expiration: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiration - now).num_milliseconds().div_euclid(1000)
}
