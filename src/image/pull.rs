//! Image fetch: resolve a reference, pull the manifest and config, download
//! each layer with cross-image hardlink deduplication.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::digest::{self, DigestError};
use crate::image::manifest::{Descriptor, Manifest};
use crate::image::reference::{self, Reference};
use crate::image::registry::{Registry, RegistryError, MANIFEST_ACCEPT};
use crate::state::Store;

#[derive(Debug, Error)]
pub enum PullError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to parse manifest: {0}")]
    ManifestJson(#[source] serde_json::Error),
    #[error("failed to get layer {0}: {1}")]
    GettingLayer(String, #[source] Box<PullError>),
    #[error(transparent)]
    Digest(#[from] DigestError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &Path, source: std::io::Error) -> PullError {
    PullError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Idempotent: returns immediately if the manifest is already cached.
pub fn pull(store: &Store, image: &str) -> Result<Reference, PullError> {
    let reference = reference::parse(image);
    let image_dir = store.image_dir(&reference.qualified());

    let manifest_path = image_dir.join("manifest.json");
    if manifest_path.exists() {
        return Ok(reference);
    }

    fs::create_dir_all(&image_dir).map_err(|e| io_err(&image_dir, e))?;

    let registry = Registry::new();
    let mut accept_headers = reqwest::header::HeaderMap::new();
    accept_headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static(MANIFEST_ACCEPT),
    );
    let manifest_response = registry.get(&reference.manifest_url(), Some(accept_headers))?;
    let manifest_bytes = manifest_response
        .bytes()
        .map_err(|e| PullError::Registry(RegistryError::Request(reference.manifest_url(), e)))?;
    let manifest: Manifest =
        serde_json::from_slice(&manifest_bytes).map_err(PullError::ManifestJson)?;

    let config_response = registry.get(&reference.blob_url(&manifest.config.digest), None)?;
    let config_bytes = config_response.bytes().map_err(|e| {
        PullError::Registry(RegistryError::Request(
            reference.blob_url(&manifest.config.digest),
            e,
        ))
    })?;

    let mut retained: Vec<String> = Vec::new();
    for layer in &manifest.layers {
        let name = download_layer(store, &registry, &reference, &image_dir, layer)
            .map_err(|e| PullError::GettingLayer(layer.digest.clone(), Box::new(e)))?;
        retained.push(name);
    }
    retained.push("manifest.json".to_string());
    retained.push("config.json".to_string());
    retained.push("image_name".to_string());

    // Prune files left behind by a previous failed attempt.
    if let Ok(entries) = fs::read_dir(&image_dir) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == ".temp" || retained.contains(&name) {
                continue;
            }
            let _ = fs::remove_file(entry.path());
        }
    }

    write_file(&image_dir.join("manifest.json"), &manifest_bytes)?;
    write_file(&image_dir.join("config.json"), &config_bytes)?;
    write_file(&image_dir.join("image_name"), reference.qualified().as_bytes())?;

    Ok(reference)
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), PullError> {
    fs::write(path, contents).map_err(|e| io_err(path, e))
}

fn layer_file_name(layer: &Descriptor) -> Result<String, PullError> {
    Ok(format!("{}.tar.gz", digest::hex_of(&layer.digest)?))
}

fn download_layer(
    store: &Store,
    registry: &Registry,
    reference: &Reference,
    image_dir: &Path,
    layer: &Descriptor,
) -> Result<String, PullError> {
    let name = layer_file_name(layer)?;
    let target = image_dir.join(&name);

    if target.exists() && digest::check_file_digest(&target, &layer.digest).is_ok() {
        return Ok(name);
    }

    // Cross-image deduplication: any identical layer already cached under a
    // sibling image directory can be hardlinked instead of re-downloaded.
    if let Ok(entries) = fs::read_dir(store.images_dir()) {
        for entry in entries.flatten() {
            let candidate = entry.path().join(&name);
            if candidate == target {
                continue;
            }
            if candidate.exists() && digest::check_file_digest(&candidate, &layer.digest).is_ok() {
                let _ = fs::remove_file(&target);
                fs::hard_link(&candidate, &target).map_err(|e| io_err(&target, e))?;
                return Ok(name);
            }
        }
    }

    let temp_dir = image_dir.join(".temp");
    fs::create_dir_all(&temp_dir).map_err(|e| io_err(&temp_dir, e))?;
    let temp_path = temp_dir.join(&name);

    let result = stream_layer(registry, reference, layer, &temp_path);
    if result.is_ok() {
        fs::rename(&temp_path, &target).map_err(|e| io_err(&target, e))?;
    }
    let _ = fs::remove_dir_all(&temp_dir);
    result?;

    Ok(name)
}

fn stream_layer(
    registry: &Registry,
    reference: &Reference,
    layer: &Descriptor,
    temp_path: &Path,
) -> Result<(), PullError> {
    let mut response = registry.get(&reference.blob_url(&layer.digest), None)?;

    let progress = ProgressBar::new(layer.size);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner} {bytes}/{total_bytes} {msg}")
    {
        progress.set_style(style);
    }
    progress.set_message(layer.digest.clone());

    let mut file = fs::File::create(temp_path).map_err(|e| io_err(temp_path, e))?;
    let mut buf = [0u8; 64 * 1024];
    loop {
        use std::io::Read;
        let n = response
            .read(&mut buf)
            .map_err(|e| PullError::Registry(RegistryError::Request(reference.blob_url(&layer.digest), e)))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(|e| io_err(temp_path, e))?;
        progress.inc(n as u64);
    }
    progress.finish_and_clear();

    digest::check_file_digest(temp_path, &layer.digest)?;
    Ok(())
}
