//! Ground truth from the filesystem. Nothing here consults an order file.

use crate::library::name_key;
use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

/// Plugin extensions, in the order their groups are emitted.
pub const PLUGIN_EXTENSIONS: [&str; 3] = ["esm", "esp", "esl"];

/// Plugin file names directly under `dir`: every `.esm`, then every `.esp`, then
/// every `.esl`, alphabetical within each group.
pub fn scan_plugins(dir: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read plugin dir {}", dir.display()))? {
        let entry = entry.context("read plugin dir entry")?;
        if !entry.file_type().context("plugin file type")?.is_file() {
            continue;
        }
        match entry.file_name().to_str() {
            Some(name) if is_plugin_file(name) => files.push(name.to_string()),
            _ => {}
        }
    }

    let mut plugins = Vec::with_capacity(files.len());
    for extension in PLUGIN_EXTENSIONS {
        let mut group: Vec<&String> = files
            .iter()
            .filter(|name| has_extension(name, extension))
            .collect();
        group.sort_by(|a, b| alphabetical(a, b));
        plugins.extend(group.into_iter().cloned());
    }
    Ok(plugins)
}

/// Immediate subdirectory names of `mods_root`, alphabetical. Creates the root if absent.
pub fn scan_mods(mods_root: &Path) -> Result<Vec<String>> {
    fs::create_dir_all(mods_root)
        .with_context(|| format!("create mods dir {}", mods_root.display()))?;
    let mut mods = Vec::new();
    for entry in fs::read_dir(mods_root).context("read mods dir")? {
        let entry = entry.context("read mods dir entry")?;
        if !entry.file_type().context("mod file type")?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            mods.push(name.to_string());
        }
    }
    mods.sort_by(|a, b| alphabetical(a, b));
    Ok(mods)
}

/// Mod folders under the mods root, looked up by case-insensitive name.
///
/// Order files may spell a mod differently from its folder; every path join goes
/// through here so the on-disk spelling is used.
#[derive(Debug, Clone, Default)]
pub struct ModFolders {
    root: PathBuf,
    by_key: HashMap<String, String>,
}

impl ModFolders {
    pub fn new(root: &Path, names: &[String]) -> Self {
        let mut by_key = HashMap::new();
        for name in names {
            by_key.entry(name_key(name)).or_insert_with(|| name.clone());
        }
        Self {
            root: root.to_path_buf(),
            by_key,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        let folder = self.by_key.get(&name_key(name)).map_or(name, String::as_str);
        self.root.join(folder)
    }
}

pub fn is_plugin_file(name: &str) -> bool {
    PLUGIN_EXTENSIONS
        .iter()
        .any(|extension| has_extension(name, extension))
}

fn has_extension(name: &str, extension: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

fn alphabetical(a: &str, b: &str) -> std::cmp::Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}
