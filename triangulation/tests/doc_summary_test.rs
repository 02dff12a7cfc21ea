//! Doc-comment summary check.
//!
//! Every `///` or `//!` block in the workspace's library and binary sources
//! opens with a summary paragraph that ends in a full stop (or a colon when
//! a list or table follows). Headings, tables and code fences are exempt.

use std::path::{Path, PathBuf};

fn rust_sources(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            rust_sources(&path, out);
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            out.push(path);
        }
    }
}

fn doc_body(line: &str) -> Option<(&str, &str, &str)> {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];
    for marker in ["///", "//!"] {
        if let Some(body) = trimmed.strip_prefix(marker) {
            return Some((indent, marker, body.trim()));
        }
    }
    None
}

/// Lines whose doc block opens with an unterminated summary paragraph.
fn unterminated_summaries(source: &str) -> Vec<usize> {
    let lines: Vec<&str> = source.lines().collect();
    let mut bad = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let Some((indent, marker, first)) = doc_body(lines[i]) else {
            i += 1;
            continue;
        };
        let mut last = (i, first);
        let mut in_summary = !first.is_empty();
        let mut j = i + 1;
        while j < lines.len() {
            match doc_body(lines[j]) {
                Some((ind, mark, body)) if ind == indent && mark == marker => {
                    if body.is_empty() {
                        in_summary = false;
                    } else if in_summary {
                        last = (j, body);
                    }
                    j += 1;
                }
                _ => break,
            }
        }
        let exempt = ["#", "|", "```", "-", "*"]
            .iter()
            .any(|prefix| first.starts_with(prefix));
        let terminated = [".", ":", "?", "!", "|", "```"]
            .iter()
            .any(|suffix| last.1.ends_with(suffix));
        if !first.is_empty() && !exempt && !terminated {
            bad.push(last.0 + 1);
        }
        i = j;
    }
    bad
}

#[test]
fn test_unterminated_summary_is_detected() {
    let source = "/// Opens the store\nfn a() {}\n\n/// Opens the store.\n///\n/// Details\nfn b() {}\n";
    assert_eq!(unterminated_summaries(source), vec![1]);

    let wrapped = "//! First line of a summary that\n//! wraps onto a second line\n";
    assert_eq!(unterminated_summaries(wrapped), vec![2]);

    let exempt = "//! # Heading\n//!\n//! | a | b |\n";
    assert!(unterminated_summaries(exempt).is_empty());
}

#[test]
fn test_workspace_doc_summaries_end_with_full_stop() {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut files = Vec::new();
    rust_sources(&manifest.join("src"), &mut files);
    rust_sources(&manifest.join("../crates/stance-agents/src"), &mut files);
    assert!(!files.is_empty());

    let mut offenders = Vec::new();
    for path in &files {
        let source = std::fs::read_to_string(path).unwrap();
        for line in unterminated_summaries(&source) {
            offenders.push(format!("{}:{line}", path.display()));
        }
    }
    assert!(offenders.is_empty(), "unterminated doc summaries:\n{}", offenders.join("\n"));
}
