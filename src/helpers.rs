//! Embedded helper-binary extraction.
//!
//! `rootlesskit` and `slirp4netns` are vendored as build-time byte slices
//! and written out to a fixed directory on first run, then that directory
//! is prepended to `PATH` so [`rootless::helper_command`](crate::rootless)
//! can find them without the orchestrator installing anything system-wide.
//!
//! This module is the only place that knows whether real prebuilt binaries
//! are linked in; `vendor/` holds placeholders until a packaging pipeline
//! supplies the real blobs (see `vendor/README.md`).

use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HelperError {
    #[error("failed to write helper binary {0:?}: {1}")]
    Write(PathBuf, #[source] std::io::Error),
}

const ROOTLESSKIT_BYTES: &[u8] = include_bytes!("../vendor/rootlesskit");
const SLIRP4NETNS_BYTES: &[u8] = include_bytes!("../vendor/slirp4netns");

const EXTRACT_DIR_PREFIX: &str = "rootbox-helpers";

fn extract_dir() -> PathBuf {
    env::temp_dir().join(EXTRACT_DIR_PREFIX)
}

fn write_executable(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), HelperError> {
    let path = dir.join(name);
    fs::write(&path, bytes).map_err(|e| HelperError::Write(path.clone(), e))?;
    let mut perms = fs::metadata(&path)
        .map_err(|e| HelperError::Write(path.clone(), e))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).map_err(|e| HelperError::Write(path.clone(), e))?;
    Ok(())
}

/// Writes the embedded helper binaries to a fixed directory (idempotent:
/// skips files already present) and prepends that directory to `PATH` for
/// the current process.
pub fn install() -> Result<(), HelperError> {
    let dir = extract_dir();
    fs::create_dir_all(&dir).map_err(|e| HelperError::Write(dir.clone(), e))?;

    if !dir.join("rootlesskit").exists() {
        write_executable(&dir, "rootlesskit", ROOTLESSKIT_BYTES)?;
    }
    if !dir.join("slirp4netns").exists() {
        write_executable(&dir, "slirp4netns", SLIRP4NETNS_BYTES)?;
    }

    let existing_path = env::var("PATH").unwrap_or_default();
    let new_path = format!("{}:{}", dir.display(), existing_path);
    env::set_var("PATH", new_path);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_dir_is_under_the_system_temp_directory() {
        assert!(extract_dir().starts_with(env::temp_dir()));
    }
}
