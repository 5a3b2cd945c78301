use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

/// Read a newline-delimited label file.
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read labels from {}", path.display()))?;
    let labels = parse_labels(&raw);
    if labels.is_empty() {
        return Err(anyhow!("label file {} is empty", path.display()));
    }
    Ok(labels)
}

/// One label per non-blank line, surrounding whitespace trimmed.
pub fn parse_labels(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
