//! Namespace launcher: selects a privilege-escalation helper and detaches a
//! re-execution of this binary as the container's init process.

use std::env;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use thiserror::Error;

use crate::model::RunOptions;
use crate::process::{self, ProcessError};
use crate::rootless;
use crate::state::{Store, StateError};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("unsupported option(s) requested: {0:?}")]
    Unsupported(Vec<&'static str>),
    #[error("failed to spawn namespace helper: {0}")]
    Spawn(#[source] std::io::Error),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

const HELPER_STATE_DIR_PREFIX: &str = "rootbox";

/// Idempotent: returns immediately if the container is already running.
pub fn start(store: &Store, id: &str) -> Result<(), LaunchError> {
    if process::is_running(id) {
        return Ok(());
    }

    let run_options: RunOptions = store.read_run_options(id)?;
    let unsupported = run_options.unsupported_fields();
    if !unsupported.is_empty() {
        return Err(LaunchError::Unsupported(unsupported));
    }

    let state_dir = PathBuf::from("/tmp")
        .join(HELPER_STATE_DIR_PREFIX)
        .join(id);

    let mut cmd = rootless::helper_command(&state_dir, rootless::has_tun_device());
    let sentinel = process::sentinel_argv(id)?;
    cmd.arg(&sentinel[0]).arg(&sentinel[1]).arg(&sentinel[2]);
    cmd.env_clear();
    cmd.envs(env::vars());
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());

    // Detached: the caller is a short-lived CLI invocation, not a
    // supervisor. The init process does its own status updates.
    cmd.spawn().map_err(LaunchError::Spawn)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_fields_reported_before_any_spawn() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        let mut run_options = RunOptions {
            image: "alpine".to_string(),
            entrypoint: "/bin/sh".to_string(),
            cmd: vec![],
            env: Default::default(),
            labels: vec![],
            workspace_mount: None,
            mounts: vec![],
            unsupported: Default::default(),
        };
        run_options.unsupported.cap_add = vec!["SYS_ADMIN".to_string()];
        store.write_run_options("w1", &run_options).unwrap();

        let err = start(&store, "w1").unwrap_err();
        assert!(matches!(err, LaunchError::Unsupported(_)));
    }
}
