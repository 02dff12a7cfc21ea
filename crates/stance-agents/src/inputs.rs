//! Readers for upstream extracted content and issue lists.
//!
//! Extracted content arrives as JSON Lines (one `ExtractedContent` object per
//! line) or as a single JSON array when the file ends in `.json`.

use std::io::BufRead;
use std::path::Path;

use triangulation::corpus::ExtractedContent;

use crate::config::{AgentsError, AgentsResult};

/// Parse JSON Lines; blank lines are skipped.
pub fn read_extracted_jsonl<R: BufRead>(reader: R) -> AgentsResult<Vec<ExtractedContent>> {
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let content: ExtractedContent = serde_json::from_str(&line)
            .map_err(|e| AgentsError::Parse(format!("line {}: {e}", idx + 1)))?;
        out.push(content);
    }
    Ok(out)
}

/// Read extracted content from a `.json` array or a JSON Lines file.
pub fn read_extracted_file(path: &Path) -> AgentsResult<Vec<ExtractedContent>> {
    let is_array = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_array {
        let text = std::fs::read_to_string(path)?;
        return serde_json::from_str(&text)
            .map_err(|e| AgentsError::Parse(format!("{}: {e}", path.display())));
    }
    let file = std::fs::File::open(path)?;
    read_extracted_jsonl(std::io::BufReader::new(file))
}

/// One issue per line; blank lines and `#` comments are skipped.
pub fn parse_issue_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
