use crate::skyrim;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameId {
    SkyrimSe,
}

impl Default for GameId {
    fn default() -> Self {
        GameId::SkyrimSe
    }
}

impl GameId {
    pub fn display_name(self) -> &'static str {
        match self {
            GameId::SkyrimSe => skyrim::GAME_NAME,
        }
    }

    pub fn executable(self) -> &'static str {
        match self {
            GameId::SkyrimSe => skyrim::EXECUTABLE,
        }
    }

    /// Subdirectory of the game root that mods are overlaid onto.
    pub fn data_dir_name(self) -> &'static str {
        match self {
            GameId::SkyrimSe => skyrim::DATA_DIR,
        }
    }

    pub fn core_plugins(self) -> &'static [&'static str] {
        match self {
            GameId::SkyrimSe => skyrim::CORE_PLUGINS,
        }
    }

    /// Files removed from a fresh overlay before launch.
    pub fn stripped_files(self) -> &'static [&'static str] {
        match self {
            GameId::SkyrimSe => skyrim::STRIPPED_FILES,
        }
    }
}

pub fn looks_like_game_root(game: GameId, path: &Path) -> bool {
    match game {
        GameId::SkyrimSe => skyrim::looks_like_game_root(path),
    }
}

pub fn detect_game_root(game: GameId) -> Option<PathBuf> {
    match game {
        GameId::SkyrimSe => skyrim::find_game_root(),
    }
}

pub fn detect_plugin_order_file(game: GameId) -> Option<PathBuf> {
    match game {
        GameId::SkyrimSe => skyrim::find_plugin_order_file(),
    }
}
