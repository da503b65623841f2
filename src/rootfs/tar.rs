//! Whiteout-aware OCI layer extraction.
//!
//! A naive "extract each tar in order" is insufficient: `.wh.<name>` entries
//! delete a sibling left by a lower layer, and `.wh..wh..opq` marks a
//! directory opaque (everything a lower layer put there is hidden before
//! the current layer's own entries land). `dev/*` entries are skipped; the
//! assembler bind-mounts the host's `/dev` instead.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;

const WHITEOUT_PREFIX: &str = ".wh.";
const OPAQUE_MARKER: &str = ".wh..wh..opq";

#[derive(Debug, Error)]
pub enum TarError {
    #[error("failed to read layer archive: {0}")]
    Io(#[from] std::io::Error),
    #[error("layer entry {0:?} escapes the rootfs")]
    PathEscape(PathBuf),
}

/// Extracts one gzipped layer tarball into `rootfs`, honoring whiteouts and
/// opaque-directory markers.
pub fn extract_layer<R: Read>(reader: R, rootfs: &Path) -> Result<(), TarError> {
    let gz = GzDecoder::new(reader);
    let mut archive = Archive::new(gz);
    archive.set_preserve_permissions(true);
    archive.set_unpack_xattrs(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();

        if entry_path.starts_with("dev") {
            continue;
        }

        let file_name = entry_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if file_name == OPAQUE_MARKER {
            let dir = entry_path.parent().unwrap_or(Path::new(""));
            clear_directory_contents(rootfs, dir)?;
            continue;
        }

        if let Some(target_name) = file_name.strip_prefix(WHITEOUT_PREFIX) {
            let parent = entry_path.parent().unwrap_or(Path::new(""));
            let victim = safe_join(rootfs, &parent.join(target_name))?;
            remove_path(&victim);
            continue;
        }

        let destination = safe_join(rootfs, &entry_path)?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&destination)?;
    }

    Ok(())
}

fn safe_join(rootfs: &Path, relative: &Path) -> Result<PathBuf, TarError> {
    for component in relative.components() {
        if component.as_os_str() == ".." {
            return Err(TarError::PathEscape(relative.to_path_buf()));
        }
    }
    Ok(rootfs.join(relative))
}

fn clear_directory_contents(rootfs: &Path, relative_dir: &Path) -> Result<(), TarError> {
    let dir = safe_join(rootfs, relative_dir)?;
    if let Ok(entries) = fs::read_dir(&dir) {
        for entry in entries.flatten() {
            remove_path(&entry.path());
        }
    }
    Ok(())
}

fn remove_path(path: &Path) {
    if let Ok(metadata) = fs::symlink_metadata(path) {
        if metadata.is_dir() {
            let _ = fs::remove_dir_all(path);
        } else {
            let _ = fs::remove_file(path);
        }
    }
}
