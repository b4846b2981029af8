use crate::{
    config::ManagerPaths,
    error::DeployError,
    library::LoadOrder,
    scan::ModFolders,
};
use anyhow::{Context, Result};
use serde::Serialize;
#[cfg(unix)]
use std::os::unix::fs::MetadataExt;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Identity of the storage volume a path lives on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeId {
    #[cfg_attr(not(unix), allow(dead_code))]
    Device(u64),
    #[cfg_attr(unix, allow(dead_code))]
    Root(PathBuf),
}

/// Platform link capability. The overlay walk only goes through this.
pub trait HardLinker {
    /// Creates `new` as a hard link to `existing`. Must fail, leaving `new`
    /// untouched, when `new` already exists.
    fn create_hard_link(&self, existing: &Path, new: &Path) -> io::Result<()>;

    fn volume_id(&self, path: &Path) -> io::Result<VolumeId> {
        volume_id(path)
    }
}

/// `link(2)` on unix, `CreateHardLinkW` on Windows; both refuse to replace an existing file.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeLinker;

impl HardLinker for NativeLinker {
    fn create_hard_link(&self, existing: &Path, new: &Path) -> io::Result<()> {
        fs::hard_link(existing, new)
    }
}

#[cfg(unix)]
fn volume_id(path: &Path) -> io::Result<VolumeId> {
    let probe = nearest_existing(path);
    Ok(VolumeId::Device(fs::metadata(probe)?.dev()))
}

#[cfg(not(unix))]
fn volume_id(path: &Path) -> io::Result<VolumeId> {
    let probe = fs::canonicalize(nearest_existing(path))?;
    let root: PathBuf = probe
        .components()
        .take_while(|component| {
            matches!(
                component,
                std::path::Component::Prefix(_) | std::path::Component::RootDir
            )
        })
        .collect();
    Ok(VolumeId::Root(root))
}

/// Walks up until a path that exists; a deployment target usually does not yet.
fn nearest_existing(path: &Path) -> &Path {
    let mut current = path;
    loop {
        if current.exists() {
            return current;
        }
        match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => current = parent,
            _ => return Path::new("."),
        }
    }
}

/// One source tree linked into `target/mount`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayLayer {
    pub label: String,
    pub source: PathBuf,
    pub mount: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeployReport {
    pub layers: usize,
    pub linked: usize,
    /// Destination already claimed by an earlier layer.
    pub skipped: usize,
    pub failed: usize,
    pub stripped: usize,
    pub warnings: Vec<String>,
}

impl DeployReport {
    pub fn summary(&self) -> String {
        format!(
            "{} layer(s): {} linked, {} overridden, {} failed",
            self.layers, self.linked, self.skipped, self.failed
        )
    }
}

/// Refuses deployments that could not be hard-linked or would clobber a source.
pub fn preflight(
    base: &Path,
    layers: &[OverlayLayer],
    target: &Path,
    linker: &dyn HardLinker,
) -> Result<()> {
    let sources = std::iter::once(base).chain(layers.iter().map(|layer| layer.source.as_path()));
    let target_volume = linker
        .volume_id(target)
        .with_context(|| format!("stat deployment target {}", target.display()))?;

    for source in sources {
        if !source.is_dir() {
            return Err(DeployError::MissingSource(source.to_path_buf()).into());
        }
        if overlaps(source, target) {
            return Err(DeployError::UnsafeTarget {
                target: target.to_path_buf(),
                overlaps: source.to_path_buf(),
            }
            .into());
        }
        let source_volume = linker
            .volume_id(source)
            .with_context(|| format!("stat deployment source {}", source.display()))?;
        if source_volume != target_volume {
            return Err(DeployError::CrossVolume {
                base: source.to_path_buf(),
                target: target.to_path_buf(),
            }
            .into());
        }
    }
    Ok(())
}

/// Links every layer into `target` in the order given, then `base` at the root.
///
/// Links never overwrite, so the first layer to reach a relative path owns it and
/// `base` only fills what no layer provided. `target` should not hold a previous
/// deployment; stale links would win over the new composition.
pub fn deploy(
    base: &Path,
    layers: &[OverlayLayer],
    target: &Path,
    linker: &dyn HardLinker,
) -> Result<DeployReport> {
    preflight(base, layers, target, linker)?;
    fs::create_dir_all(target)
        .with_context(|| format!("create deployment target {}", target.display()))?;

    let mut report = DeployReport::default();
    for layer in layers {
        debug!(layer = %layer.label, source = %layer.source.display(), "linking layer");
        link_tree(&layer.source, &target.join(&layer.mount), linker, &mut report);
        report.layers += 1;
    }
    debug!(source = %base.display(), "linking base game");
    link_tree(base, target, linker, &mut report);
    report.layers += 1;

    Ok(report)
}

fn link_tree(source: &Path, dest_root: &Path, linker: &dyn HardLinker, report: &mut DeployReport) {
    let walker = WalkDir::new(source)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry
                .path()
                .strip_prefix(source)
                .map_or(true, |rel| !is_ignored_deploy_path(rel))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                record_failure(report, format!("walk {}: {err}", source.display()));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(source) else {
            continue;
        };
        let dest = dest_root.join(rel);
        if let Some(parent) = dest.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                record_failure(report, format!("create dir {}: {err}", parent.display()));
                continue;
            }
        }
        match linker.create_hard_link(entry.path(), &dest) {
            Ok(()) => report.linked += 1,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                debug!(path = %rel.display(), "destination already claimed");
                report.skipped += 1;
            }
            Err(err) => record_failure(
                report,
                format!("hardlink {} -> {}: {err}", entry.path().display(), dest.display()),
            ),
        }
    }
}

fn record_failure(report: &mut DeployReport, message: String) {
    warn!("{message}");
    report.failed += 1;
    report.warnings.push(message);
}

/// Active mods as layers, highest priority first so they claim paths before lower ones.
pub fn plan_layers(mods: &LoadOrder, folders: &ModFolders, mount: &Path) -> Vec<OverlayLayer> {
    mods.entries()
        .iter()
        .rev()
        .filter(|entry| entry.active)
        .map(|entry| OverlayLayer {
            label: entry.name.clone(),
            source: folders.path(&entry.name),
            mount: mount.to_path_buf(),
        })
        .collect()
}

/// Deletes the previous overlay and builds a fresh one from the active mods.
pub fn rebuild_overlay(
    paths: &ManagerPaths,
    mods: &LoadOrder,
    folders: &ModFolders,
    linker: &dyn HardLinker,
) -> Result<DeployReport> {
    let layers = plan_layers(mods, folders, Path::new(paths.game.data_dir_name()));
    let target = &paths.target_dir;

    preflight(&paths.game_source_dir, &layers, target, linker)?;
    if overlaps(&paths.mods_dir, target) {
        return Err(DeployError::UnsafeTarget {
            target: target.clone(),
            overlaps: paths.mods_dir.clone(),
        }
        .into());
    }

    if target.exists() {
        info!(path = %target.display(), "removing previous deployment");
        fs::remove_dir_all(target)
            .with_context(|| format!("remove previous deployment {}", target.display()))?;
    }

    let mut report = deploy(&paths.game_source_dir, &layers, target, linker)?;
    for name in paths.game.stripped_files() {
        let path = target.join(name);
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
            report.stripped += 1;
        }
    }

    info!(
        path = %target.display(),
        linked = report.linked,
        overridden = report.skipped,
        failed = report.failed,
        "deployment finished"
    );
    Ok(report)
}

/// True when either path is, or lies inside, the other.
pub fn overlaps(a: &Path, b: &Path) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    a.starts_with(&b) || b.starts_with(&a)
}

fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .map(|parent| parent.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

fn is_ignored_deploy_path(path: &Path) -> bool {
    path.components().any(|component| {
        let part = component.as_os_str().to_string_lossy();
        part.eq_ignore_ascii_case("__MACOSX")
            || part.eq_ignore_ascii_case(".ds_store")
            || part.eq_ignore_ascii_case("thumbs.db")
            || part == ".git"
            || part == ".svn"
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        game::GameId,
        library::{CollectionKind, Entry},
    };
    use std::cell::RefCell;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn layer(label: &str, source: &Path) -> OverlayLayer {
        OverlayLayer {
            label: label.to_string(),
            source: source.to_path_buf(),
            mount: PathBuf::new(),
        }
    }

    #[cfg(unix)]
    fn same_inode(a: &Path, b: &Path) -> bool {
        fs::metadata(a).unwrap().ino() == fs::metadata(b).unwrap().ino()
    }

    #[test]
    fn earlier_layer_keeps_colliding_path() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let base = dir.path().join("base");
        write(&a.join("meshes/shared.nif"), "from a");
        write(&b.join("meshes/shared.nif"), "from b");
        write(&b.join("meshes/only_b.nif"), "b only");
        fs::create_dir_all(&base).unwrap();
        let target = dir.path().join("out");

        let report = deploy(
            &base,
            &[layer("a", &a), layer("b", &b)],
            &target,
            &NativeLinker,
        )
        .unwrap();

        assert_eq!(
            fs::read_to_string(target.join("meshes/shared.nif")).unwrap(),
            "from a"
        );
        assert_eq!(
            fs::read_to_string(target.join("meshes/only_b.nif")).unwrap(),
            "b only"
        );
        assert_eq!(report.linked, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn mod_file_wins_over_base_game() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let mod_dir = dir.path().join("mod");
        write(&base.join("textures/a.dds"), "vanilla");
        write(&base.join("textures/b.dds"), "vanilla b");
        write(&mod_dir.join("textures/a.dds"), "retexture");
        let target = dir.path().join("out");

        deploy(&base, &[layer("mod", &mod_dir)], &target, &NativeLinker).unwrap();

        let deployed = target.join("textures/a.dds");
        assert_eq!(fs::read_to_string(&deployed).unwrap(), "retexture");
        assert_eq!(
            fs::read_to_string(target.join("textures/b.dds")).unwrap(),
            "vanilla b"
        );
        #[cfg(unix)]
        assert!(same_inode(&deployed, &mod_dir.join("textures/a.dds")));
    }

    #[test]
    fn junk_files_are_not_linked() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        write(&base.join("keep.txt"), "keep");
        write(&base.join(".git/HEAD"), "ref");
        write(&base.join("Thumbs.db"), "");
        let target = dir.path().join("out");

        let report = deploy(&base, &[], &target, &NativeLinker).unwrap();
        assert_eq!(report.linked, 1);
        assert!(!target.join(".git").exists());
    }

    struct FlakyLinker {
        refuse: &'static str,
        attempts: RefCell<Vec<PathBuf>>,
    }

    impl HardLinker for FlakyLinker {
        fn create_hard_link(&self, existing: &Path, new: &Path) -> io::Result<()> {
            self.attempts.borrow_mut().push(existing.to_path_buf());
            if new.ends_with(self.refuse) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            fs::hard_link(existing, new)
        }
    }

    #[test]
    fn link_failure_does_not_abort_walk() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        write(&base.join("one.txt"), "1");
        write(&base.join("two.txt"), "2");
        write(&base.join("three.txt"), "3");
        let target = dir.path().join("out");
        let linker = FlakyLinker {
            refuse: "two.txt",
            attempts: RefCell::new(Vec::new()),
        };

        let report = deploy(&base, &[], &target, &linker).unwrap();
        assert_eq!(linker.attempts.borrow().len(), 3);
        assert_eq!(report.linked, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(target.join("one.txt").exists());
        assert!(target.join("three.txt").exists());
    }

    struct SplitVolumeLinker {
        foreign: PathBuf,
    }

    impl HardLinker for SplitVolumeLinker {
        fn create_hard_link(&self, _existing: &Path, _new: &Path) -> io::Result<()> {
            panic!("no link may be attempted across volumes");
        }

        fn volume_id(&self, path: &Path) -> io::Result<VolumeId> {
            if path.starts_with(&self.foreign) {
                Ok(VolumeId::Device(2))
            } else {
                Ok(VolumeId::Device(1))
            }
        }
    }

    #[test]
    fn cross_volume_is_refused_before_linking() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        write(&base.join("file.txt"), "x");
        let target = dir.path().join("elsewhere").join("out");
        let linker = SplitVolumeLinker {
            foreign: dir.path().join("elsewhere"),
        };

        let err = deploy(&base, &[], &target, &linker).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::CrossVolume { .. })
        ));
        assert!(!target.exists());
    }

    #[test]
    fn target_inside_source_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        write(&base.join("file.txt"), "x");

        let err = deploy(&base, &[], &base.join("out"), &NativeLinker).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::UnsafeTarget { .. })
        ));
    }

    #[test]
    fn layers_follow_priority_and_skip_inactive() {
        let mut mods = LoadOrder::new(CollectionKind::Mods);
        mods.replace_all(vec![
            Entry::new("Low", true),
            Entry::new("Off", false),
            Entry::new("High", true),
        ]);

        let folders = ModFolders::new(
            Path::new("/mods"),
            &["high".to_string(), "Low".to_string(), "Off".to_string()],
        );

        let layers = plan_layers(&mods, &folders, Path::new("Data"));
        let labels: Vec<&str> = layers.iter().map(|layer| layer.label.as_str()).collect();
        assert_eq!(labels, vec!["High", "Low"]);
        assert_eq!(layers[0].source, Path::new("/mods/high"));
        assert_eq!(layers[0].mount, Path::new("Data"));
    }

    fn manager_paths(root: &Path) -> ManagerPaths {
        ManagerPaths {
            game: GameId::SkyrimSe,
            game_source_dir: root.join("Skyrim"),
            game_data_source_dir: root.join("Skyrim/Data"),
            plugin_order_file: root.join("plugins.txt"),
            manager_dir: root.join("manager"),
            mods_dir: root.join("manager/mods"),
            mod_order_file: root.join("manager/mods.txt"),
            target_dir: root.join("manager/Game"),
            target_data_dir: root.join("manager/Game/Data"),
        }
    }

    #[test]
    fn rebuild_replaces_previous_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let paths = manager_paths(dir.path());
        write(&paths.game_source_dir.join("SkyrimSE.exe"), "exe");
        write(&paths.game_source_dir.join("Skyrim.ccc"), "cc");
        write(&paths.game_data_source_dir.join("textures/a.dds"), "vanilla");
        write(&paths.mods_dir.join("Low/textures/a.dds"), "low");
        write(&paths.mods_dir.join("High/textures/a.dds"), "high");
        write(&paths.target_dir.join("stale.txt"), "old deployment");

        let mut mods = LoadOrder::new(CollectionKind::Mods);
        mods.replace_all(vec![Entry::new("Low", true), Entry::new("High", true)]);

        let folders = ModFolders::new(&paths.mods_dir, &["High".to_string(), "Low".to_string()]);

        let report = rebuild_overlay(&paths, &mods, &folders, &NativeLinker).unwrap();

        assert_eq!(
            fs::read_to_string(paths.target_data_dir.join("textures/a.dds")).unwrap(),
            "high"
        );
        assert!(paths.target_dir.join("SkyrimSE.exe").exists());
        assert!(!paths.target_dir.join("Skyrim.ccc").exists());
        assert!(paths.game_source_dir.join("Skyrim.ccc").exists());
        assert!(!paths.target_dir.join("stale.txt").exists());
        assert_eq!(report.stripped, 1);
        assert_eq!(report.layers, 3);
    }
}
