//! Property-based tests for signed URL expiration parsing and the duration check.

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;

    use crate::signed_url::duration::is_within_tolerance_at;
    use crate::signed_url::{expiry_status, parse_expiration};
    use crate::types::ExpiryStatus;

    const BASE: &str = "https://storage.googleapis.com/main-bucket/object.json";

    // 2000-01-01 .. 2100-01-01
    fn epoch_seconds() -> impl Strategy<Value = i64> {
        946_684_800i64..4_102_444_800i64
    }

    fn compact(instant: DateTime<Utc>) -> String {
        instant.format("%Y%m%dT%H%M%SZ").to_string()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// The absolute-epoch encoding yields exactly `Expires * 1000` milliseconds.
        #[test]
        fn prop_absolute_epoch_is_exact(expires in epoch_seconds()) {
            let url = format!("{BASE}?GoogleAccessId=sa&Expires={expires}&Signature=x");
            let parsed = parse_expiration(&url).unwrap();
            prop_assert_eq!(parsed.timestamp_millis(), expires * 1000);
        }

        /// The base-plus-offset encoding yields `date + offset`, exact to the second.
        #[test]
        fn prop_base_plus_offset_is_exact(
            base in epoch_seconds(),
            offset in 0i64..604_800,
        ) {
            let date = Utc.timestamp_opt(base, 0).unwrap();
            let url = format!(
                "{BASE}?X-Goog-Algorithm=GOOG4-RSA-SHA256&X-Goog-Date={}&X-Goog-Expires={offset}&X-Goog-Signature=x",
                compact(date)
            );
            let parsed = parse_expiration(&url).unwrap();
            prop_assert_eq!(parsed, date + Duration::seconds(offset));
        }

        /// The tolerance check agrees with `|expiration - now - expected| <= tolerance`.
        #[test]
        fn prop_tolerance_law(
            now in epoch_seconds(),
            lifetime in -3_600i64..86_400,
            expected in 0i64..86_400,
            tolerance in 0i64..600,
        ) {
            let url = format!("{BASE}?Expires={}", now + lifetime);
            let now = Utc.timestamp_opt(now, 0).unwrap();
            prop_assert_eq!(
                is_within_tolerance_at(&url, expected, tolerance, now),
                (lifetime - expected).abs() <= tolerance
            );
        }

        /// Without a recognised encoding the check fails and the status stays unknown.
        #[test]
        fn prop_unknown_encoding_fails_closed(
            path in "[a-z0-9/_-]{1,40}",
            expected in any::<i32>(),
            tolerance in 0i64..i64::MAX,
        ) {
            let url = format!("https://storage.googleapis.com/{path}?X-Goog-Signature=abc");
            let now = Utc::now();
            prop_assert!(!is_within_tolerance_at(&url, expected as i64, tolerance, now));
            prop_assert_eq!(expiry_status(&url, now), ExpiryStatus::Unknown);
        }
    }
}
