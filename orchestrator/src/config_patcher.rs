//! In-place, section-scoped value substitution for the clients' TOML config
//! files.
//!
//! Edits only ever replace the value of a key that is already present in the
//! file shipped by the client; they never insert keys or sections. Everything
//! outside the replaced value (indentation, spacing around `=`, comments on
//! other lines, line endings) is preserved byte for byte, which makes a repeat
//! application a no-op.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::errors::{OrchestratorError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEdit {
    /// `None` matches the first occurrence anywhere in the file
    pub section: Option<String>,
    pub key: String,
    /// Raw right-hand side as it should appear in the file
    pub value: String,
}

impl ConfigEdit {
    pub fn global(key: &str, value: impl Into<String>) -> Self {
        Self {
            section: None,
            key: key.to_string(),
            value: value.into(),
        }
    }

    pub fn scoped(section: &str, key: &str, value: impl Into<String>) -> Self {
        Self {
            section: Some(section.to_string()),
            key: key.to_string(),
            value: value.into(),
        }
    }

    fn label(&self) -> String {
        match &self.section {
            Some(section) => format!("[{}] {}", section, self.key),
            None => self.key.clone(),
        }
    }
}

/// Config file path -> ordered edits for that file
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    files: BTreeMap<PathBuf, Vec<ConfigEdit>>,
}

impl NodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: &Path, edit: ConfigEdit) {
        self.files.entry(path.to_path_buf()).or_default().push(edit);
    }

    pub fn edits_for(&self, path: &Path) -> Option<&[ConfigEdit]> {
        self.files.get(path).map(|edits| edits.as_slice())
    }

    pub fn files(&self) -> impl Iterator<Item = (&PathBuf, &Vec<ConfigEdit>)> {
        self.files.iter()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub path: PathBuf,
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
    /// Keys not present in the file; left alone
    pub missing: Vec<String>,
}

impl ApplyReport {
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}

enum EditOutcome {
    Changed,
    Unchanged,
    Missing,
}

/// Apply `edits` to the file at `path`. The file is only rewritten when its
/// content actually changes.
pub async fn apply(path: &Path, edits: &[ConfigEdit]) -> Result<ApplyReport> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(OrchestratorError::ConfigNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(OrchestratorError::ConfigApplyError {
                path: path.to_path_buf(),
                reason: format!("read failed: {}", e),
            })
        }
    };

    let (patched, mut report) = patch_content(&content, edits);
    report.path = path.to_path_buf();

    for key in &report.missing {
        warn!("Key {} not present in {}, edit skipped", key, path.display());
    }

    if patched != content {
        tokio::fs::write(path, patched)
            .await
            .map_err(|e| OrchestratorError::ConfigApplyError {
                path: path.to_path_buf(),
                reason: format!("write failed: {}", e),
            })?;
        info!(
            "✓ Updated {} ({} changed, {} already set)",
            path.display(),
            report.changed.len(),
            report.unchanged.len()
        );
    } else {
        debug!("{} already up to date", path.display());
    }

    Ok(report)
}

/// Apply every file's edits in path order. Stops at the first failing file.
pub async fn apply_all(config: &NodeConfig) -> Result<Vec<ApplyReport>> {
    let mut reports = Vec::new();
    for (path, edits) in config.files() {
        reports.push(apply(path, edits).await?);
    }
    Ok(reports)
}

/// Pure form of [`apply`]: returns the patched text and what happened to each edit.
pub fn patch_content(content: &str, edits: &[ConfigEdit]) -> (String, ApplyReport) {
    let mut lines: Vec<String> = content.split_inclusive('\n').map(str::to_string).collect();
    let mut report = ApplyReport::default();

    for edit in edits {
        let outcome = match locate(&lines, edit.section.as_deref(), &edit.key) {
            Some((idx, value_start)) => {
                let replaced = replace_value(&lines[idx], value_start, &edit.value);
                if replaced == lines[idx] {
                    EditOutcome::Unchanged
                } else {
                    lines[idx] = replaced;
                    EditOutcome::Changed
                }
            }
            None => EditOutcome::Missing,
        };

        match outcome {
            EditOutcome::Changed => report.changed.push(edit.label()),
            EditOutcome::Unchanged => report.unchanged.push(edit.label()),
            EditOutcome::Missing => report.missing.push(edit.label()),
        }
    }

    (lines.concat(), report)
}

/// Current raw value of `key`, located with the same rules as an edit
pub fn read_value(content: &str, section: Option<&str>, key: &str) -> Option<String> {
    let lines: Vec<String> = content.split_inclusive('\n').map(str::to_string).collect();
    let (idx, value_start) = locate(&lines, section, key)?;
    let (body, _) = split_line_ending(&lines[idx]);
    let rest = &body[value_start..];
    Some(rest[..value_len(rest)].trim().to_string())
}

/// Strips surrounding double quotes from a raw TOML string value
pub fn unquote(raw: &str) -> &str {
    raw.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw)
}

/// Index of the first matching line and the byte offset where its value begins.
/// A scoped search covers only the first `[section]` block.
fn locate(lines: &[String], section: Option<&str>, key: &str) -> Option<(usize, usize)> {
    let mut current: Option<String> = None;
    let mut entered = false;

    for (idx, line) in lines.iter().enumerate() {
        if let Some(header) = section_header(line) {
            if entered {
                // left the first matching block
                return None;
            }
            current = Some(header.to_string());
            continue;
        }

        let in_range = match section {
            None => true,
            Some(wanted) => {
                let inside = current.as_deref() == Some(wanted);
                entered |= inside;
                inside
            }
        };

        if in_range {
            if let Some(value_start) = value_offset(line, key) {
                return Some((idx, value_start));
            }
        }
    }

    None
}

fn section_header(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if !trimmed.starts_with('[') {
        return None;
    }
    let inner = trimmed.trim_start_matches('[');
    let end = inner.find(']')?;
    Some(inner[..end].trim())
}

fn value_offset(line: &str, key: &str) -> Option<usize> {
    let (body, _) = split_line_ending(line);
    let trimmed = body.trim_start();
    let indent = body.len() - trimmed.len();

    let rest = trimmed.strip_prefix(key)?;
    let rest_trimmed = rest.trim_start();
    let after_eq = rest_trimmed.strip_prefix('=')?;
    let spacing = after_eq.len() - after_eq.trim_start().len();

    Some(indent + key.len() + (rest.len() - rest_trimmed.len()) + 1 + spacing)
}

fn replace_value(line: &str, value_start: usize, value: &str) -> String {
    let (body, ending) = split_line_ending(line);
    let prefix = &body[..value_start];
    let value_end = value_start + value_len(&body[value_start..]);
    // an inline comment, with the spacing before it, survives the edit
    let comment = &body[value_end..];
    // `key =` with no value before the line or comment ends
    let separator = if prefix.ends_with('=') && value_end == value_start {
        " "
    } else {
        ""
    };
    let gap = if comment.is_empty() || comment.starts_with(char::is_whitespace) {
        ""
    } else {
        " "
    };
    format!("{}{}{}{}{}{}", prefix, separator, value, gap, comment, ending)
}

/// Length of the value text before any trailing `# comment`, ignoring `#`
/// inside quoted strings. Whitespace ahead of the comment is not counted.
fn value_len(rest: &str) -> usize {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in rest.char_indices() {
        match quote {
            Some('"') if escaped => escaped = false,
            Some('"') if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' => return rest[..i].trim_end().len(),
            None => {}
        }
    }
    rest.len()
}

fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}
