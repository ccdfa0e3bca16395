//! Display formatting for relay and REST timestamps.

use chrono::NaiveDateTime;

/// Timestamp layouts the relay and REST API are known to produce.
const INPUT_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Layout used for display, e.g. `02:07 PM, 05 March, 2024`.
const DISPLAY_FORMAT: &str = "%I:%M %p, %d %B, %Y";

/// Turn a server timestamp into its display label.
///
/// Empty input and `"now"` (any case) become `"Now"`. Timestamps in one of
/// the known layouts are reformatted; fractional seconds are accepted.
/// Anything else is shown unchanged.
#[must_use]
pub fn format_time(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("now") {
        return "Now".to_string();
    }
    let without_fraction = trimmed.split('.').next().unwrap_or(trimmed);
    INPUT_FORMATS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(without_fraction, layout).ok())
        .map_or_else(
            || raw.to_string(),
            |parsed| parsed.format(DISPLAY_FORMAT).to_string(),
        )
}
