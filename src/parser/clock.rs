use crate::error::Result;
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;

const BMS_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}\s\d{2}:\d{2}:\d{2}").expect("valid timestamp regex")
});

/// First `YYYY-MM-DD HH:MM:SS` substring in a `time` response
pub fn parse_time(text: &str) -> Option<String> {
    TIME_RE.find(text).map(|m| m.as_str().to_string())
}

/// Interpret a timestamp returned by [`parse_time`]
pub fn parse_bms_datetime(stamp: &str) -> Result<NaiveDateTime> {
    let normalized = stamp.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(NaiveDateTime::parse_from_str(&normalized, BMS_TIME_FORMAT)?)
}

/// Render the console command that sets the BMS clock
pub fn format_set_time_command(at: &NaiveDateTime) -> String {
    at.format("time %y %m %d %H %M %S").to_string()
}
