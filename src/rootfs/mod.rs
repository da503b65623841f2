//! Rootfs assembly: unpack an image's layers into a container rootfs and
//! record the merged run options and initial container details.

pub mod tar;

use std::fs;
use std::path::Path;

use chrono::Utc;
use thiserror::Error;

use crate::image::manifest::{ImageConfigFile, Manifest};
use crate::model::{ContainerDetails, ContainerStatus, RunOptions};
use crate::state::{Store, StateError};
use self::tar::TarError;

#[derive(Debug, Error)]
pub enum RootfsError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("failed to read cached image metadata: {0}")]
    Metadata(#[source] serde_json::Error),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Tar(#[from] TarError),
    #[error(transparent)]
    Digest(#[from] crate::digest::DigestError),
    #[error("image has no default command to run and runOptions.entrypoint is empty")]
    NoCommand,
    #[error("namespace helper failed to extract layer {0}")]
    Extract(String),
}

fn io_err(path: &std::path::Path, source: std::io::Error) -> RootfsError {
    RootfsError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Extracts one layer tarball into a rootfs. Production runs this inside
/// the same privilege-escalation helper the namespace launcher uses
/// ([`HelperExtractor`]), since a root-owned or uid-mapped tar entry may
/// fail to extract running directly in the unprivileged calling process.
pub trait LayerExtractor {
    fn extract(&self, layer_path: &Path, rootfs_dir: &Path) -> Result<(), RootfsError>;
}

/// Re-execs this binary's hidden `extract-layer` subcommand inside
/// `rootless::helper_command`'s freshly created namespaces.
pub struct HelperExtractor;

impl LayerExtractor for HelperExtractor {
    fn extract(&self, layer_path: &Path, rootfs_dir: &Path) -> Result<(), RootfsError> {
        let self_path = std::env::current_exe().map_err(|e| io_err(layer_path, e))?;
        let state_dir = std::env::temp_dir().join("rootbox-extract").join(
            layer_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );

        let mut cmd = crate::rootless::helper_command(&state_dir, false);
        cmd.arg(&self_path)
            .arg("extract-layer")
            .arg(layer_path)
            .arg(rootfs_dir);

        let status = cmd.status().map_err(|e| io_err(layer_path, e))?;
        if !status.success() {
            return Err(RootfsError::Extract(layer_path.display().to_string()));
        }
        Ok(())
    }
}

/// Idempotent: a previously persisted `runOptions` means the rootfs was
/// already assembled for this workspace id. Extracts layers through
/// [`HelperExtractor`]; see [`create_with`] to substitute a direct,
/// in-process extractor (used by this module's and the crate's tests, where
/// re-execing the test binary as `rootbox extract-layer` would not work).
pub fn create(store: &Store, id: &str, run_options: RunOptions) -> Result<(), RootfsError> {
    create_with(store, id, run_options, &HelperExtractor)
}

/// Same as [`create`], with the layer extraction strategy injected.
pub fn create_with(
    store: &Store,
    id: &str,
    mut run_options: RunOptions,
    extractor: &dyn LayerExtractor,
) -> Result<(), RootfsError> {
    if store.run_options_exists(id) {
        return Ok(());
    }

    let rootfs_dir = store.rootfs_dir(id);
    fs::create_dir_all(&rootfs_dir).map_err(|e| io_err(&rootfs_dir, e))?;
    let status_dir = store.status_dir(id);
    fs::create_dir_all(&status_dir).map_err(|e| io_err(&status_dir, e))?;

    let reference = crate::image::reference::parse(&run_options.image);
    let image_dir = store.image_dir(&reference.qualified());
    let manifest_raw = fs::read_to_string(image_dir.join("manifest.json"))
        .map_err(|e| io_err(&image_dir.join("manifest.json"), e))?;
    let manifest: Manifest = serde_json::from_str(&manifest_raw).map_err(RootfsError::Metadata)?;
    let config_raw = fs::read_to_string(image_dir.join("config.json"))
        .map_err(|e| io_err(&image_dir.join("config.json"), e))?;
    let config: ImageConfigFile = serde_json::from_str(&config_raw).map_err(RootfsError::Metadata)?;

    for layer in &manifest.layers {
        let hex = crate::digest::hex_of(&layer.digest)?;
        let layer_path = image_dir.join(format!("{}.tar.gz", hex));
        if !layer_path.exists() {
            return Err(io_err(
                &layer_path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "layer file missing"),
            ));
        }
        extractor.extract(&layer_path, &rootfs_dir)?;
    }

    for entry in &config.config.env {
        if let Some((key, value)) = entry.split_once('=') {
            run_options
                .env
                .entry(key.to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    run_options
        .env
        .entry("TERM".to_string())
        .or_insert_with(|| "xterm".to_string());

    if run_options.entrypoint.is_empty() {
        let mut default_cmd = config.config.entrypoint.clone();
        default_cmd.extend(config.config.cmd.clone());
        if default_cmd.is_empty() {
            return Err(RootfsError::NoCommand);
        }
        run_options.entrypoint = default_cmd[0].clone();
        run_options.cmd = default_cmd[1..].to_vec();
    }

    store.write_run_options(id, &run_options)?;

    let details = ContainerDetails {
        id: id.to_string(),
        status: ContainerStatus::Exited,
        created_at: Utc::now().to_rfc3339(),
        started_at: String::new(),
        labels: run_options.labels.clone(),
    };
    store.write_container_details(id, &details)?;

    Ok(())
}
