use crate::{
    error::ConfigError,
    game::{self, GameId},
};
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub game: GameId,
    #[serde(default)]
    pub game_source_dir: Option<PathBuf>,
    #[serde(default)]
    pub plugin_order_file: Option<PathBuf>,
    /// Root for mods, mods.txt and the deployed game. Defaults to the app data dir.
    #[serde(default)]
    pub manager_dir: Option<PathBuf>,
    #[serde(default)]
    pub mods_dir: Option<PathBuf>,
    #[serde(default)]
    pub mod_order_file: Option<PathBuf>,
    #[serde(default)]
    pub target_dir: Option<PathBuf>,
    #[serde(skip)]
    path: PathBuf,
}

/// Every location the manager reads or writes, resolved from [`AppConfig`].
#[derive(Debug, Clone, Serialize)]
pub struct ManagerPaths {
    pub game: GameId,
    pub game_source_dir: PathBuf,
    pub game_data_source_dir: PathBuf,
    pub plugin_order_file: PathBuf,
    pub manager_dir: PathBuf,
    pub mods_dir: PathBuf,
    pub mod_order_file: PathBuf,
    pub target_dir: PathBuf,
    pub target_data_dir: PathBuf,
}

impl AppConfig {
    pub fn load_or_create() -> Result<Self> {
        let base_dir = base_data_dir()?;
        fs::create_dir_all(&base_dir).context("create app data dir")?;
        Self::load_from(&base_dir.join("config.json"))
    }

    /// Loads `path`, seeding a new config from detected game paths when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path).context("read app config")?;
            let mut config: AppConfig = serde_json::from_str(&raw).context("parse app config")?;
            config.path = path.to_path_buf();
            return Ok(config);
        }

        let game = GameId::default();
        let config = AppConfig {
            game,
            game_source_dir: game::detect_game_root(game),
            plugin_order_file: game::detect_plugin_order_file(game),
            path: path.to_path_buf(),
            ..AppConfig::default()
        };
        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("create app config dir")?;
        }
        let raw = serde_json::to_string_pretty(self).context("serialize app config")?;
        fs::write(&self.path, raw).context("write app config")?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sets the game directory after checking it holds the game executable.
    pub fn set_game_source_dir(&mut self, dir: PathBuf) -> Result<()> {
        if !game::looks_like_game_root(self.game, &dir) {
            return Err(ConfigError::InvalidGameRoot {
                root: dir,
                executable: self.game.executable(),
            }
            .into());
        }
        self.game_source_dir = Some(dir);
        Ok(())
    }

    pub fn paths(&self) -> Result<ManagerPaths> {
        let game_source_dir = self
            .game_source_dir
            .clone()
            .ok_or(ConfigError::MissingKey("game_source_dir"))?;
        let plugin_order_file = self
            .plugin_order_file
            .clone()
            .ok_or(ConfigError::MissingKey("plugin_order_file"))?;
        let manager_dir = match &self.manager_dir {
            Some(dir) => dir.clone(),
            None => self
                .path
                .parent()
                .map(Path::to_path_buf)
                .context("config path has no parent")?,
        };

        let data_dir_name = self.game.data_dir_name();
        let target_dir = self
            .target_dir
            .clone()
            .unwrap_or_else(|| manager_dir.join("Game"));

        Ok(ManagerPaths {
            game: self.game,
            game_data_source_dir: game_source_dir.join(data_dir_name),
            game_source_dir,
            plugin_order_file,
            mods_dir: self
                .mods_dir
                .clone()
                .unwrap_or_else(|| manager_dir.join("mods")),
            mod_order_file: self
                .mod_order_file
                .clone()
                .unwrap_or_else(|| manager_dir.join("mods.txt")),
            target_data_dir: target_dir.join(data_dir_name),
            target_dir,
            manager_dir,
        })
    }
}

pub fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("linksmith"))
}
