//! The on-disk state store: `T/images`, `T/rootfs/<id>`, `T/status/<id>`.
//!
//! Pure filesystem operations, no in-process locking. Callers must not
//! invoke lifecycle operations on the same workspace id concurrently.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

use crate::model::{ContainerDetails, ContainerStatus, RunOptions};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("container {0} does not exist")]
    NotFound(String),
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn image_dir(&self, reference: &str) -> PathBuf {
        self.images_dir().join(sanitize(reference))
    }

    pub fn rootfs_dir(&self, id: &str) -> PathBuf {
        self.root.join("rootfs").join(id)
    }

    pub fn status_dir(&self, id: &str) -> PathBuf {
        self.root.join("status").join(id)
    }

    pub fn run_options_path(&self, id: &str) -> PathBuf {
        self.status_dir(id).join("runOptions")
    }

    pub fn container_details_path(&self, id: &str) -> PathBuf {
        self.status_dir(id).join("containerDetails")
    }

    pub fn run_options_exists(&self, id: &str) -> bool {
        self.run_options_path(id).exists()
    }

    pub fn write_run_options(
        &self,
        id: &str,
        run_options: &RunOptions,
    ) -> Result<(), StateError> {
        fs::create_dir_all(self.status_dir(id)).map_err(|source| StateError::Write {
            path: self.status_dir(id).display().to_string(),
            source,
        })?;
        write_json_file(&self.run_options_path(id), run_options)
    }

    pub fn read_run_options(&self, id: &str) -> Result<RunOptions, StateError> {
        read_json_file(&self.run_options_path(id))
    }

    /// Stages into a sibling temp file and renames into place, so a
    /// concurrent `find` never observes a torn read.
    pub fn write_container_details(
        &self,
        id: &str,
        details: &ContainerDetails,
    ) -> Result<(), StateError> {
        let dir = self.status_dir(id);
        fs::create_dir_all(&dir).map_err(|source| StateError::Write {
            path: dir.display().to_string(),
            source,
        })?;

        let final_path = self.container_details_path(id);
        let tmp_path = dir.join("containerDetails.tmp");
        write_json_file(&tmp_path, details)?;
        fs::rename(&tmp_path, &final_path).map_err(|source| StateError::Write {
            path: final_path.display().to_string(),
            source,
        })
    }

    pub fn read_container_details(&self, id: &str) -> Result<ContainerDetails, StateError> {
        let path = self.container_details_path(id);
        if !path.exists() {
            return Err(StateError::NotFound(id.to_string()));
        }
        read_json_file(&path)
    }

    /// Reads `containerDetails`, sets `status` and unconditionally stamps
    /// `startedAt` to now, writes back atomically.
    pub fn set_status(&self, id: &str, status: ContainerStatus) -> Result<(), StateError> {
        let mut details = self.read_container_details(id)?;
        details.status = status;
        details.started_at = Utc::now().to_rfc3339();
        self.write_container_details(id, &details)
    }
}

fn sanitize(reference: &str) -> String {
    reference.replace('/', "_")
}

fn write_json_file<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| StateError::Json {
        path: path.display().to_string(),
        source,
    })?;
    fs::write(path, json).map_err(|source| StateError::Write {
        path: path.display().to_string(),
        source,
    })
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StateError> {
    let raw = fs::read_to_string(path).map_err(|source| StateError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| StateError::Json {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_run_options() -> RunOptions {
        RunOptions {
            image: "alpine:3.19".to_string(),
            entrypoint: "/bin/sh".to_string(),
            cmd: vec![],
            env: HashMap::new(),
            labels: vec![],
            workspace_mount: None,
            mounts: vec![],
            unsupported: Default::default(),
        }
    }

    #[test]
    fn run_options_round_trip_and_idempotent_check() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        assert!(!store.run_options_exists("w1"));

        store.write_run_options("w1", &sample_run_options()).unwrap();
        assert!(store.run_options_exists("w1"));

        let read_back = store.read_run_options("w1").unwrap();
        assert_eq!(read_back.image, "alpine:3.19");
    }

    #[test]
    fn container_details_write_is_atomic_rename() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        let details = ContainerDetails {
            id: "w1".to_string(),
            status: ContainerStatus::Exited,
            created_at: Utc::now().to_rfc3339(),
            started_at: String::new(),
            labels: vec![],
        };
        store.write_container_details("w1", &details).unwrap();
        assert!(!store.status_dir("w1").join("containerDetails.tmp").exists());

        let read_back = store.read_container_details("w1").unwrap();
        assert_eq!(read_back.status, ContainerStatus::Exited);
    }

    #[test]
    fn set_status_always_stamps_started_at() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        let details = ContainerDetails {
            id: "w1".to_string(),
            status: ContainerStatus::Created,
            created_at: Utc::now().to_rfc3339(),
            started_at: String::new(),
            labels: vec![],
        };
        store.write_container_details("w1", &details).unwrap();

        store.set_status("w1", ContainerStatus::Running).unwrap();
        let running = store.read_container_details("w1").unwrap();
        assert_eq!(running.status, ContainerStatus::Running);
        assert!(!running.started_at.is_empty());

        store.set_status("w1", ContainerStatus::Stopped).unwrap();
        let stopped = store.read_container_details("w1").unwrap();
        assert_eq!(stopped.status, ContainerStatus::Stopped);
        assert!(!stopped.started_at.is_empty());
    }

    #[test]
    fn find_on_missing_id_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        assert!(matches!(
            store.read_container_details("ghost"),
            Err(StateError::NotFound(_))
        ));
    }
}
