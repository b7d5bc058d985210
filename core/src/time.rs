use chrono::{DateTime, SecondsFormat, Utc};

/// Current time as an RFC 3339 UTC string, the form stored in the
/// translation database.
pub fn now_rfc3339() -> String {
    format_timestamp(Utc::now())
}

pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}
