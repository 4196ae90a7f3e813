// [crates/cms-db/src/util.rs]
use chrono::{DateTime, Utc};

/// libSQL stores timestamps as `CURRENT_TIMESTAMP` strings (`%Y-%m-%d
/// %H:%M:%S`) or as RFC3339 when written by this crate; accept either.
pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}
