use crate::error::Result;
use chrono::{DateTime, Utc};

pub(crate) fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339()
}

pub(crate) fn parse_time(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|s| Ok(DateTime::parse_from_rfc3339(&s)?.with_timezone(&Utc)))
        .transpose()
}
