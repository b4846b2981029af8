use crate::error::ProcessError;
use anyhow::Result;
use std::{
    path::Path,
    process::{Child, Command},
};
use tracing::info;

/// Starts the game from the deployed tree. Does not wait for it to exit.
pub fn launch_game(target: &Path, executable: &str) -> Result<Child> {
    let exe = target.join(executable);
    if !exe.is_file() {
        return Err(ProcessError::Unavailable {
            tool: exe.display().to_string(),
        }
        .into());
    }

    info!(exe = %exe.display(), "launching game");
    let child = Command::new(&exe)
        .current_dir(target)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            tool: executable.to_string(),
            source,
        })?;
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_executable_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = launch_game(dir.path(), "SkyrimSE.exe").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProcessError>(),
            Some(ProcessError::Unavailable { .. })
        ));
    }

    #[test]
    fn directory_named_like_executable_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("SkyrimSE.exe")).unwrap();
        assert!(launch_game(dir.path(), "SkyrimSE.exe").is_err());
    }
}
