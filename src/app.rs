//! Owner of the mod and plugin load orders.
//!
//! Every mutation goes through `&mut App`, so there is exactly one writer per
//! collection and nobody can observe a collection halfway through a rebuild.
//! Each mutation persists its collection before returning.

use crate::{
    config::{AppConfig, ManagerPaths},
    deploy::{self, DeployReport, HardLinker, NativeLinker},
    importer, launch,
    library::{CollectionKind, Entry, LoadOrder},
    order, reconcile,
    scan::{self, ModFolders},
};
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct App {
    pub paths: ManagerPaths,
    mods: LoadOrder,
    plugins: LoadOrder,
    folders: ModFolders,
    linker: Box<dyn HardLinker>,
}

impl App {
    pub fn initialize(config: &AppConfig) -> Result<Self> {
        let paths = config.paths()?;
        Self::with_paths(paths, Box::new(NativeLinker))
    }

    /// Builds the context and runs the startup reconciliation: mods, then plugins.
    pub fn with_paths(paths: ManagerPaths, linker: Box<dyn HardLinker>) -> Result<Self> {
        let mut app = Self {
            paths,
            mods: LoadOrder::new(CollectionKind::Mods),
            plugins: LoadOrder::new(CollectionKind::Plugins),
            folders: ModFolders::default(),
            linker,
        };
        app.reload()?;
        Ok(app)
    }

    pub fn mods(&self) -> &LoadOrder {
        &self.mods
    }

    pub fn plugins(&self) -> &LoadOrder {
        &self.plugins
    }

    pub fn collection(&self, kind: CollectionKind) -> &LoadOrder {
        match kind {
            CollectionKind::Mods => &self.mods,
            CollectionKind::Plugins => &self.plugins,
        }
    }

    pub fn reload(&mut self) -> Result<()> {
        self.reconcile_mods()?;
        self.reconcile_plugins()
    }

    pub fn reconcile_mods(&mut self) -> Result<()> {
        let persisted = order::load(&self.paths.mod_order_file)?;
        let existing = scan::scan_mods(&self.paths.mods_dir)?;
        self.folders = ModFolders::new(&self.paths.mods_dir, &existing);
        let result = reconcile::reconcile(persisted, &existing, &[]);
        self.mods.replace_all(result.entries.clone());
        log_pass(&self.mods, &result);
        self.persist(CollectionKind::Mods)
    }

    /// Plugins are the base game's plus those owned by every active mod.
    pub fn reconcile_plugins(&mut self) -> Result<()> {
        let persisted = order::load(&self.paths.plugin_order_file)?;
        let mut existing = scan::scan_plugins(&self.paths.game_data_source_dir)?;
        for name in self.mods.active_names() {
            existing.extend(scan::scan_plugins(&self.folders.path(name))?);
        }
        let result = reconcile::reconcile(persisted, &existing, self.paths.game.core_plugins());
        self.plugins.replace_all(result.entries.clone());
        log_pass(&self.plugins, &result);
        self.persist(CollectionKind::Plugins)
    }

    /// Toggling a mod changes which plugins exist, so plugins are reconciled again
    /// before the mod order is written. A failed plugin pass restores the flag.
    pub fn set_active(&mut self, kind: CollectionKind, name: &str, active: bool) -> Result<bool> {
        let index = self.index_of(kind, name)?;
        let changed = self.collection_mut(kind).set_active(index, active);
        if !changed {
            return Ok(false);
        }
        debug!(
            collection = kind.label(),
            name,
            active,
            revision = self.collection(kind).revision(),
            "active flag changed"
        );
        if kind == CollectionKind::Mods {
            if let Err(err) = self.reconcile_plugins() {
                self.mods.set_active(index, !active);
                return Err(err);
            }
        }
        self.persist(kind)?;
        Ok(true)
    }

    /// Moves an entry to `priority` (clamped) and returns where it landed.
    pub fn set_priority(&mut self, kind: CollectionKind, name: &str, priority: usize) -> Result<usize> {
        let index = self.index_of(kind, name)?;
        let landed = self
            .collection_mut(kind)
            .set_priority(index, priority)
            .context("entry vanished while reordering")?;
        if landed != index {
            debug!(collection = kind.label(), name, from = index, to = landed, "priority changed");
            self.persist(kind)?;
        }
        Ok(landed)
    }

    /// Rebuilds the overlay from scratch using the current active mods.
    pub fn deploy(&self) -> Result<DeployReport> {
        deploy::rebuild_overlay(&self.paths, &self.mods, &self.folders, self.linker.as_ref())
    }

    pub fn run_game(&self) -> Result<DeployReport> {
        let report = self.deploy()?;
        launch::launch_game(&self.paths.target_dir, self.paths.game.executable())?;
        Ok(report)
    }

    /// Installs an archive or folder as a new mod, then reconciles both collections.
    pub fn install_mod(&mut self, source: &Path) -> Result<PathBuf> {
        let installed = importer::install(source, &self.paths.mods_dir)?;
        self.reload()?;
        Ok(installed)
    }

    fn index_of(&self, kind: CollectionKind, name: &str) -> Result<usize> {
        self.collection(kind)
            .position(name)
            .ok_or_else(|| anyhow!("no {} entry named {name}", kind.label()))
    }

    fn collection_mut(&mut self, kind: CollectionKind) -> &mut LoadOrder {
        match kind {
            CollectionKind::Mods => &mut self.mods,
            CollectionKind::Plugins => &mut self.plugins,
        }
    }

    fn persist(&self, kind: CollectionKind) -> Result<()> {
        let path = match kind {
            CollectionKind::Mods => &self.paths.mod_order_file,
            CollectionKind::Plugins => &self.paths.plugin_order_file,
        };
        order::save(path, self.collection(kind).entries())
    }
}

fn log_pass(order: &LoadOrder, result: &reconcile::Reconciled) {
    info!(
        collection = order.kind().label(),
        entries = order.len(),
        revision = order.revision(),
        discovered = result.discovered,
        stale = result.stale,
        duplicates = result.duplicates,
        reserved = result.reserved,
        "reconciled load order"
    );
}

/// Owned snapshot of an entry with its derived priority, for display.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EntryView {
    pub priority: usize,
    pub name: String,
    pub active: bool,
}

impl EntryView {
    pub fn list(order: &LoadOrder) -> Vec<EntryView> {
        order
            .entries()
            .iter()
            .enumerate()
            .map(|(priority, Entry { name, active })| EntryView {
                priority,
                name: name.clone(),
                active: *active,
            })
            .collect()
    }
}
