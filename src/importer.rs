use crate::{deploy::overlaps, error::ProcessError};
use anyhow::{bail, Context, Result};
use filetime::{set_file_mtime, FileTime};
use std::{
    fs, io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::UNIX_EPOCH,
};
use time::{Date, Month, PrimitiveDateTime, Time as TimeOfDay};
use tracing::{debug, info};
use walkdir::WalkDir;

/// External extractors tried in order before the in-process fallbacks.
const SEVEN_ZIP_TOOLS: &[&str] = &["7z", "7zzs"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Directory,
    Zip,
    SevenZip,
    Rar,
}

impl SourceKind {
    fn detect(path: &Path) -> Option<Self> {
        if path.is_dir() {
            return Some(SourceKind::Directory);
        }
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        match ext.as_str() {
            "zip" => Some(SourceKind::Zip),
            "7z" => Some(SourceKind::SevenZip),
            "rar" => Some(SourceKind::Rar),
            _ => None,
        }
    }
}

/// Installs an archive or folder as the mod `<mods_root>/<stem>` and returns its folder.
///
/// Files already in the destination are overwritten; anything else there is left alone.
pub fn install(source: &Path, mods_root: &Path) -> Result<PathBuf> {
    install_with_tools(source, mods_root, SEVEN_ZIP_TOOLS)
}

fn install_with_tools(source: &Path, mods_root: &Path, tools: &[&str]) -> Result<PathBuf> {
    if !source.exists() {
        bail!("install source does not exist: {}", source.display());
    }
    let Some(kind) = SourceKind::detect(source) else {
        bail!(
            "unsupported install source {} (expected a folder, .zip, .7z or .rar)",
            source.display()
        );
    };
    let name = mod_name_for(source, kind)?;
    let dest = mods_root.join(&name);
    if overlaps(source, &dest) {
        bail!(
            "refusing to install {} into {}: source and mod folder overlap",
            source.display(),
            dest.display()
        );
    }
    fs::create_dir_all(&dest).with_context(|| format!("create mod folder {}", dest.display()))?;

    info!(mod_name = %name, source = %source.display(), "installing mod");
    match kind {
        SourceKind::Directory => copy_dir(source, &dest)?,
        SourceKind::Zip => extract_zip(source, &dest, tools)?,
        SourceKind::SevenZip => extract_7z(source, &dest, tools)?,
        SourceKind::Rar => {
            if extract_with_7z(source, &dest, tools)?.is_none() {
                return Err(ProcessError::Unavailable {
                    tool: tools.join(" or "),
                }
                .into());
            }
        }
    }
    Ok(dest)
}

fn mod_name_for(source: &Path, kind: SourceKind) -> Result<String> {
    let name = match kind {
        SourceKind::Directory => source.file_name(),
        _ => source.file_stem(),
    };
    let name = name
        .map(|name| name.to_string_lossy().trim().to_string())
        .unwrap_or_default();
    if name.is_empty() {
        bail!("cannot derive a mod name from {}", source.display());
    }
    Ok(name)
}

fn is_ignored_path(path: &Path) -> bool {
    path.components().any(|component| {
        let part = component.as_os_str().to_string_lossy();
        part.eq_ignore_ascii_case("__MACOSX")
            || part.eq_ignore_ascii_case(".ds_store")
            || part.eq_ignore_ascii_case("thumbs.db")
            || part == ".git"
            || part == ".svn"
    })
}

fn extract_zip(path: &Path, dest: &Path, tools: &[&str]) -> Result<()> {
    if extract_with_7z(path, dest, tools)?.is_some() {
        return Ok(());
    }

    let file = fs::File::open(path).context("open zip")?;
    let mut archive = zip::ZipArchive::new(file).context("read zip")?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).context("zip entry")?;
        let Some(rel) = file.enclosed_name() else {
            continue;
        };
        if is_ignored_path(&rel) {
            continue;
        }

        let out_path = dest.join(rel);
        if file.is_dir() {
            fs::create_dir_all(&out_path).context("create zip dir")?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).context("create zip dir")?;
        }

        let mut out_file = fs::File::create(&out_path).context("write zip entry")?;
        io::copy(&mut file, &mut out_file).context("extract zip entry")?;
        if let Some(mtime) = file.last_modified().and_then(zip_time_to_unix) {
            let _ = set_file_mtime(&out_path, FileTime::from_unix_time(mtime, 0));
        }
    }

    Ok(())
}

fn zip_time_to_unix(dt: zip::DateTime) -> Option<i64> {
    let month = Month::try_from(dt.month()).ok()?;
    let date = Date::from_calendar_date(dt.year() as i32, month, dt.day()).ok()?;
    let time = TimeOfDay::from_hms(dt.hour(), dt.minute(), dt.second()).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp())
}

fn extract_7z(path: &Path, dest: &Path, tools: &[&str]) -> Result<()> {
    if extract_with_7z(path, dest, tools)?.is_some() {
        return Ok(());
    }
    sevenz_rust::decompress_file(path, dest)
        .with_context(|| format!("extract 7z archive {}", path.display()))
}

/// Runs the first available external extractor. `Ok(None)` means none is installed.
fn extract_with_7z(path: &Path, dest: &Path, tools: &[&str]) -> Result<Option<()>> {
    for tool in tools {
        let output = Command::new(tool)
            .arg("x")
            .arg("-y")
            .arg("-mmt=on")
            .arg(format!("-o{}", dest.display()))
            .arg(path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output();

        let output = match output {
            Ok(output) => output,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(tool, "extractor not found");
                continue;
            }
            Err(source) => {
                return Err(ProcessError::Spawn {
                    tool: tool.to_string(),
                    source,
                }
                .into());
            }
        };

        if !output.status.success() {
            return Err(ProcessError::Failed {
                tool: tool.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        debug!(tool, archive = %path.display(), "extracted with external tool");
        return Ok(Some(()));
    }
    Ok(None)
}

fn copy_dir(source: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(source)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry
                .path()
                .strip_prefix(source)
                .map_or(true, |rel| !is_ignored_path(rel))
        })
    {
        let entry = entry?;
        let rel = entry.path().strip_prefix(source).context("rel path")?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).context("create dir")?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).context("create file dir")?;
            }
            fs::copy(entry.path(), &target).context("copy file")?;
            preserve_mtime(entry.path(), &target);
        }
    }
    Ok(())
}

fn preserve_mtime(source: &Path, dest: &Path) {
    let Ok(modified) = fs::metadata(source).and_then(|meta| meta.modified()) else {
        return;
    };
    let Ok(duration) = modified.duration_since(UNIX_EPOCH) else {
        return;
    };
    let mtime = FileTime::from_unix_time(duration.as_secs() as i64, 0);
    let _ = set_file_mtime(dest, mtime);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const NO_TOOLS: &[&str] = &["linksmith-missing-extractor"];

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, contents) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn zip_installs_under_archive_stem() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("Better Armor.zip");
        write_zip(
            &archive,
            &[
                ("BetterArmor.esp", "plugin"),
                ("meshes/armor/cuirass.nif", "mesh"),
                ("__MACOSX/._BetterArmor.esp", "junk"),
            ],
        );
        let mods_root = dir.path().join("mods");

        let installed = install_with_tools(&archive, &mods_root, NO_TOOLS).unwrap();
        assert_eq!(installed, mods_root.join("Better Armor"));
        assert_eq!(
            fs::read_to_string(installed.join("meshes/armor/cuirass.nif")).unwrap(),
            "mesh"
        );
        assert!(installed.join("BetterArmor.esp").is_file());
        assert!(!installed.join("__MACOSX").exists());
    }

    #[test]
    fn reinstall_overwrites_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("Patch.zip");
        let mods_root = dir.path().join("mods");
        write_zip(&archive, &[("Patch.esp", "v1")]);
        install_with_tools(&archive, &mods_root, NO_TOOLS).unwrap();
        write_zip(&archive, &[("Patch.esp", "v2")]);
        install_with_tools(&archive, &mods_root, NO_TOOLS).unwrap();

        assert_eq!(
            fs::read_to_string(mods_root.join("Patch/Patch.esp")).unwrap(),
            "v2"
        );
    }

    #[test]
    fn folder_is_copied_without_junk() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Loose Mod");
        fs::create_dir_all(source.join("textures")).unwrap();
        fs::create_dir_all(source.join(".git")).unwrap();
        fs::write(source.join("textures/sky.dds"), "dds").unwrap();
        fs::write(source.join(".git/HEAD"), "ref").unwrap();
        fs::write(source.join("Thumbs.db"), "").unwrap();

        let installed = install(&source, &dir.path().join("mods")).unwrap();
        assert!(installed.join("textures/sky.dds").is_file());
        assert!(!installed.join(".git").exists());
        assert!(!installed.join("Thumbs.db").exists());
    }

    #[test]
    fn installing_a_folder_onto_itself_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mods_root = dir.path().join("mods");
        fs::create_dir_all(mods_root.join("Foo")).unwrap();
        fs::write(mods_root.join("Foo/Foo.esp"), "plugin data").unwrap();

        assert!(install(&mods_root.join("Foo"), &mods_root).is_err());
        assert!(install(&mods_root, &mods_root).is_err());
        assert_eq!(
            fs::read_to_string(mods_root.join("Foo/Foo.esp")).unwrap(),
            "plugin data"
        );
    }

    #[test]
    fn rar_without_extractor_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("Mod.rar");
        fs::write(&archive, b"Rar!").unwrap();

        let err = install_with_tools(&archive, &dir.path().join("mods"), NO_TOOLS).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProcessError>(),
            Some(ProcessError::Unavailable { .. })
        ));
    }

    #[test]
    fn unknown_sources_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("readme.txt");
        fs::write(&file, "hi").unwrap();
        assert!(install(&file, &dir.path().join("mods")).is_err());
        assert!(install(&dir.path().join("absent.zip"), &dir.path().join("mods")).is_err());
    }

    #[test]
    fn zip_times_convert_to_unix() {
        let dt = zip::DateTime::from_date_and_time(2020, 1, 2, 3, 4, 6).unwrap();
        assert_eq!(zip_time_to_unix(dt), Some(1_577_934_246));
    }
}
