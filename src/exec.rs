//! Exec: joins a running container's namespaces via `nsenter` and runs a
//! one-shot command, optionally as a resolved in-container user.

use std::fs;
use std::process::{Command, Stdio};

use nix::unistd::Pid;
use thiserror::Error;

use crate::process::{self, ProcessError};
use crate::rootless;
use crate::state::Store;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("failed to resolve the container-init PID under helper {0}")]
    NoInitProcess(Pid),
    #[error("failed to read environment of container-init process {0}: {1}")]
    Environ(Pid, #[source] std::io::Error),
    #[error("failed to spawn nsenter: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Resolves the helper's direct child, which is PID 1 inside the
/// container's own PID namespace.
fn resolve_init_pid(helper_pid: Pid) -> Result<Pid, ExecError> {
    let output = Command::new("pgrep")
        .arg("-P")
        .arg(helper_pid.to_string())
        .output()
        .map_err(ExecError::Spawn)?;

    let first_child = String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .and_then(|line| line.trim().parse::<i32>().ok())
        .ok_or(ExecError::NoInitProcess(helper_pid))?;

    Ok(Pid::from_raw(first_child))
}

/// Reads `/proc/<pid>/environ` and splits it into `key=value` pairs, the
/// same environment the container's init process (and so its workload)
/// runs with.
fn read_environ(pid: Pid) -> Result<Vec<(String, String)>, ExecError> {
    let raw = fs::read(format!("/proc/{}/environ", pid))
        .map_err(|e| ExecError::Environ(pid, e))?;
    Ok(raw
        .split(|b| *b == 0)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let entry = String::from_utf8_lossy(entry);
            entry.split_once('=').map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect())
}

/// Resolves `user` against the in-container `/etc/passwd`: matches a line
/// containing `:<user>:` or beginning `<user>:`, extracts the first
/// colon-separated field as the uid.
fn resolve_uid(rootfs: &std::path::Path, user: &str) -> Option<String> {
    if user.is_empty() || user == "0" || user == "root" {
        return None;
    }
    let passwd = fs::read_to_string(rootfs.join("etc/passwd")).ok()?;
    for line in passwd.lines() {
        if line.starts_with(&format!("{}:", user)) || line.contains(&format!(":{}:", user)) {
            return line.split(':').next().map(|s| s.to_string());
        }
    }
    None
}

/// Runs `command` inside the container identified by `id`, optionally as
/// `user`, wiring the provided stdio. Returns the child's exit status.
pub fn execute(
    store: &Store,
    id: &str,
    user: Option<&str>,
    command: &str,
    stdio: (Stdio, Stdio, Stdio),
) -> Result<Option<i32>, ExecError> {
    let helper_pid = process::get_pid(id)?;
    let init_pid = resolve_init_pid(helper_pid)?;
    let environ = read_environ(init_pid)?;

    let mut nsenter = Command::new("nsenter");
    nsenter.arg("-m").arg("-u").arg("-i").arg("-p");
    if rootless::is_unprivileged() {
        nsenter.arg("-U").arg("--preserve-credentials");
    }
    nsenter.arg("-t").arg(init_pid.to_string());
    nsenter.env_clear();
    nsenter.envs(environ);

    let full_command = if let Some(user) = user {
        let rootfs = store.rootfs_dir(id);
        match resolve_uid(&rootfs, user) {
            Some(uid) => format!("su -l {} -c {:?}", uid, command),
            None => command.to_string(),
        }
    } else {
        command.to_string()
    };

    nsenter.arg("sh").arg("-c").arg(full_command);

    let (stdin, stdout, stderr) = stdio;
    nsenter.stdin(stdin).stdout(stdout).stderr(stderr);

    let mut child = nsenter.spawn().map_err(ExecError::Spawn)?;
    let status = child.wait().map_err(ExecError::Spawn)?;
    Ok(status.code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_uid_matches_leading_and_inner_colon_forms() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("etc")).unwrap();
        fs::write(
            tmp.path().join("etc/passwd"),
            "root:x:0:0::/root:/bin/sh\ndev:x:1000:1000::/home/dev:/bin/sh\n",
        )
        .unwrap();

        assert_eq!(resolve_uid(tmp.path(), "dev").as_deref(), Some("dev"));
        assert_eq!(resolve_uid(tmp.path(), "root"), None);
        assert_eq!(resolve_uid(tmp.path(), "0"), None);
        assert_eq!(resolve_uid(tmp.path(), ""), None);
        assert_eq!(resolve_uid(tmp.path(), "nobody"), None);
    }

    #[test]
    fn read_environ_reads_back_this_process_own_environment() {
        std::env::set_var("ROOTBOX_EXEC_TEST_VAR", "present");
        let pairs = read_environ(Pid::this()).unwrap();
        assert!(pairs
            .iter()
            .any(|(k, v)| k == "ROOTBOX_EXEC_TEST_VAR" && v == "present"));
    }
}
