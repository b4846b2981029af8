use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const GAME_NAME: &str = "Skyrim Special Edition";
pub const EXECUTABLE: &str = "SkyrimSE.exe";
pub const DATA_DIR: &str = "Data";
const STEAM_APP_ID: &str = "489830";

/// Masters the game always loads itself. Stored lower-case.
pub const CORE_PLUGINS: &[&str] = &[
    "skyrim.esm",
    "update.esm",
    "dawnguard.esm",
    "hearthfires.esm",
    "dragonborn.esm",
];

/// `Skyrim.ccc` takes precedence over plugins.txt when present in the game root.
pub const STRIPPED_FILES: &[&str] = &["Skyrim.ccc"];

pub fn looks_like_game_root(path: &Path) -> bool {
    path.join(EXECUTABLE).is_file()
}

pub fn find_game_root() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(home) = dirs_home() {
        candidates.push(home.join(".local/share/Steam"));
        candidates.push(home.join(".steam/steam"));
    }

    let mut libraries = Vec::new();
    for base in candidates {
        let vdf = base.join("steamapps/libraryfolders.vdf");
        if vdf.exists() {
            if let Ok(paths) = parse_steam_library_paths(&vdf) {
                libraries.extend(paths);
            }
        }
        libraries.push(base);
    }

    libraries
        .into_iter()
        .map(|lib| lib.join("steamapps/common").join(GAME_NAME))
        .find(|candidate| looks_like_game_root(candidate))
}

/// The game keeps plugins.txt under the (possibly emulated) Windows local app data dir.
pub fn find_plugin_order_file() -> Option<PathBuf> {
    if let Some(local) = std::env::var_os("LOCALAPPDATA") {
        let native = PathBuf::from(local).join(GAME_NAME);
        if native.is_dir() {
            return Some(native.join("plugins.txt"));
        }
    }

    let home = dirs_home()?;
    let proton = home
        .join(".local/share/Steam/steamapps/compatdata")
        .join(STEAM_APP_ID)
        .join("pfx/drive_c/users/steamuser/AppData/Local")
        .join(GAME_NAME);
    if proton.is_dir() {
        return Some(proton.join("plugins.txt"));
    }

    None
}

fn parse_steam_library_paths(path: &Path) -> Result<Vec<PathBuf>> {
    let raw = fs::read_to_string(path).context("read libraryfolders.vdf")?;
    let mut paths = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if !line.contains("\"path\"") {
            continue;
        }

        let parts: Vec<&str> = line.split('"').collect();
        if parts.len() >= 4 {
            let path = parts[3].replace("\\\\", "\\");
            paths.push(PathBuf::from(path));
        }
    }

    Ok(paths)
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
