//! Plain-text order files: one entry per line, lowest priority first, active
//! entries prefixed with `*`.

use crate::library::Entry;
use anyhow::{Context, Result};
use std::{fs, path::Path};
use tracing::debug;

pub const ACTIVE_MARKER: char = '*';

/// Reads the raw lines of an order file. A missing file is an empty order.
fn load_lines(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        debug!(path = %path.display(), "order file missing, starting empty");
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read order file {}", path.display()))?;
    Ok(raw.lines().map(str::to_string).collect())
}

/// Splits a token into `(name, active)`. Blank tokens yield `None`.
pub fn parse_token(token: &str) -> Option<(&str, bool)> {
    let (name, active) = match token.strip_prefix(ACTIVE_MARKER) {
        Some(name) => (name, true),
        None => (token, false),
    };
    if name.trim().is_empty() {
        return None;
    }
    Some((name, active))
}

pub fn load(path: &Path) -> Result<Vec<Entry>> {
    Ok(load_lines(path)?
        .iter()
        .filter_map(|line| parse_token(line))
        .map(|(name, active)| Entry::new(name, active))
        .collect())
}

pub fn format_entry(entry: &Entry) -> String {
    if entry.active {
        format!("{ACTIVE_MARKER}{}", entry.name)
    } else {
        entry.name.clone()
    }
}

/// Overwrites the order file with `entries`, creating it and its parent if needed.
pub fn save(path: &Path, entries: &[Entry]) -> Result<()> {
    let contents = entries
        .iter()
        .map(format_entry)
        .collect::<Vec<_>>()
        .join("\n");
    write_atomic_text(path, &contents)
        .with_context(|| format!("write order file {}", path.display()))
}

fn write_atomic_text(path: &Path, contents: &str) -> Result<()> {
    let parent = path.parent().context("order file parent")?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent).context("create order file dir")?;
    }
    let file_name = path.file_name().context("order file name")?;
    let mut temp_name = std::ffi::OsString::from(file_name);
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);
    fs::write(&temp_path, contents).context("write order temp")?;
    fs::rename(&temp_path, path).context("finalize order file")?;
    Ok(())
}
