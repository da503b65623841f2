//! Process discovery via `/proc` scanning.
//!
//! No PID file is ever written. A container's init process is identified by
//! a self-describing sentinel argv: `<self-path>, "enter", base64(id)`. The
//! kernel's own `/proc` tree is the source of truth.

use std::fs;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use nix::unistd::Pid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("container {0} is not running")]
    NotRunning(String),
    #[error("failed to determine current executable path: {0}")]
    SelfExe(#[source] std::io::Error),
}

/// Builds the sentinel argv for a given workspace id: `[self_path, "enter",
/// base64(id)]`.
pub fn sentinel_argv(id: &str) -> Result<[String; 3], ProcessError> {
    let self_path = std::env::current_exe().map_err(ProcessError::SelfExe)?;
    let encoded = STANDARD_NO_PAD.encode(id.as_bytes());
    Ok([self_path.display().to_string(), "enter".to_string(), encoded])
}

/// Scans `/proc` for a process whose `cmdline` exactly matches the sentinel
/// argv for `id`. Entries that are not numeric, or whose `cmdline`
/// disappears mid-scan, are silently skipped.
pub fn get_pid(id: &str) -> Result<Pid, ProcessError> {
    let wanted = sentinel_argv(id)?;

    let entries = match fs::read_dir("/proc") {
        Ok(entries) => entries,
        Err(_) => return Err(ProcessError::NotRunning(id.to_string())),
    };

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        let pid: i32 = match name.parse() {
            Ok(pid) => pid,
            Err(_) => continue,
        };

        let cmdline_path: PathBuf = entry.path().join("cmdline");
        let raw = match fs::read(&cmdline_path) {
            Ok(raw) => raw,
            Err(_) => continue,
        };

        let argv: Vec<String> = raw
            .split(|b| *b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect();

        if argv == wanted {
            return Ok(Pid::from_raw(pid));
        }
    }

    Err(ProcessError::NotRunning(id.to_string()))
}

/// Convenience: is the container currently running?
pub fn is_running(id: &str) -> bool {
    get_pid(id).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_argv_base64_decodes_back_to_the_id() {
        let id = "my-workspace-id";
        let argv = sentinel_argv(id).unwrap();
        assert_eq!(argv[1], "enter");
        let decoded = STANDARD_NO_PAD.decode(&argv[2]).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), id);
    }

    #[test]
    fn unknown_id_is_reported_not_running() {
        let err = get_pid("definitely-not-a-real-container-id-xyz").unwrap_err();
        assert!(matches!(err, ProcessError::NotRunning(_)));
    }
}
