//! Find / Stop / Delete: the three lifecycle operations that consult
//! `/proc` and the state store without holding any process open.

use std::fs;
use std::path::PathBuf;

use nix::sys::signal::{self, Signal};
use thiserror::Error;

use crate::model::{ContainerDetails, ContainerStatus};
use crate::process::{self, ProcessError};
use crate::rootless;
use crate::state::{Store, StateError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("failed to run rootfs-removal helper: {0}")]
    HelperSpawn(#[source] std::io::Error),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &std::path::Path, source: std::io::Error) -> LifecycleError {
    LifecycleError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Re-reads `containerDetails`, overwriting `status` with the live
/// `/proc`-derived state.
pub fn find(store: &Store, id: &str) -> Result<ContainerDetails, LifecycleError> {
    let mut details = store.read_container_details(id)?;
    let running = match process::get_pid(id) {
        Ok(pid) => pid.as_raw() > 1,
        Err(ProcessError::NotRunning(_)) => false,
        Err(_) => false,
    };
    details.status = if running {
        ContainerStatus::Running
    } else {
        ContainerStatus::Stopped
    };
    Ok(details)
}

/// Sends `SIGKILL` to the container's helper PID. Tolerates "not running".
pub fn stop(id: &str) -> Result<(), LifecycleError> {
    match process::get_pid(id) {
        Ok(pid) => {
            let _ = signal::kill(pid, Signal::SIGKILL);
            Ok(())
        }
        Err(ProcessError::NotRunning(_)) => Ok(()),
        Err(other) => Err(LifecycleError::Io {
            path: id.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
        }),
    }
}

/// Stop (errors tolerated), then remove the status and rootfs directories.
/// Rootfs removal runs under the same privilege-escalation helper used for
/// creation, since UID-mapped files may not be removable directly.
pub fn delete(store: &Store, id: &str) -> Result<(), LifecycleError> {
    let _ = stop(id);

    let status_dir = store.status_dir(id);
    if status_dir.exists() {
        fs::remove_dir_all(&status_dir).map_err(|e| io_err(&status_dir, e))?;
    }

    let rootfs_dir = store.rootfs_dir(id);
    if rootfs_dir.exists() {
        remove_rootfs_privileged(&rootfs_dir)?;
    }

    Ok(())
}

fn remove_rootfs_privileged(rootfs_dir: &std::path::Path) -> Result<(), LifecycleError> {
    let state_dir = PathBuf::from("/tmp/rootbox-rm").join(
        rootfs_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    let mut cmd = rootless::helper_command(&state_dir, false);
    cmd.arg("rm").arg("-rf").arg(rootfs_dir);
    let status = cmd.status().map_err(LifecycleError::HelperSpawn)?;
    if !status.success() {
        // Fall back to a direct removal attempt; if this process already
        // owns every entry (e.g. running as root, or rootlesskit's uid
        // mapping matches), this still succeeds.
        fs::remove_dir_all(rootfs_dir).map_err(|e| io_err(rootfs_dir, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn stop_tolerates_a_container_that_is_not_running() {
        assert!(stop("no-such-container-id").is_ok());
    }

    #[test]
    fn find_on_a_stopped_container_reports_stopped_status() {
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

        let found = find(&store, "w1").unwrap();
        assert_eq!(found.status, ContainerStatus::Stopped);
    }

    #[test]
    fn delete_on_an_empty_store_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        assert!(delete(&store, "ghost").is_ok());
    }
}
