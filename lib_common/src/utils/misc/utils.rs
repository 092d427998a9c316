use chrono::{DateTime, Utc};

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn current_datetime_rfc9557() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
