//! Report file naming for `analyze --output-dir`.
//!
//! Files are named `<race>_<candidate>_<UTC timestamp>.json`, stamped with the
//! report's `generated_at`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Timestamp layout used in report file names.
pub const REPORT_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Lowercase ASCII alphanumerics joined by single dashes.
fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// File name for one candidate's report generated at `generated_at`.
pub fn report_file_name(race_id: &str, candidate: &str, generated_at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}.json",
        slug(race_id),
        slug(candidate),
        generated_at.format(REPORT_TIMESTAMP_FORMAT)
    )
}

/// Full path of the report under `dir`.
pub fn report_path(
    dir: &Path,
    race_id: &str,
    candidate: &str,
    generated_at: DateTime<Utc>,
) -> PathBuf {
    dir.join(report_file_name(race_id, candidate, generated_at))
}
