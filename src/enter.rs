//! Container init: runs as the workload's direct parent inside the freshly
//! created namespaces. Blocks until the workload exits, then marks the
//! container stopped.

use std::fs;
use std::path::Path;
use std::process::Command;

use nix::mount::MsFlags;
use thiserror::Error;

use crate::model::{ContainerStatus, MountDescriptor, RunOptions};
use crate::mount::{self, MountError};
use crate::state::{Store, StateError};
use crate::syscall::{Syscall, SyscallError};

#[derive(Debug, Error)]
pub enum EnterError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Mount(#[from] MountError),
    #[error(transparent)]
    Syscall(#[from] SyscallError),
    #[error("mount descriptor has an empty target")]
    EmptyTarget,
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to launch workload: {0}")]
    Spawn(#[source] std::io::Error),
}

fn io_err(path: &Path, source: std::io::Error) -> EnterError {
    EnterError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Mounts `proc`, `tmp`, `/dev` and its usual children inside `rootfs`.
fn prepare_kernel_mounts(sc: &dyn Syscall, rootfs: &Path) -> Result<(), EnterError> {
    mount::proc(sc, &rootfs.join("proc"))?;
    mount::tmpfs(sc, &rootfs.join("tmp"))?;
    mount::bind(sc, Path::new("/dev"), &rootfs.join("dev"))?;
    mount::tmpfs_shm(sc, &rootfs.join("dev/shm"))?;
    mount::mqueue(sc, &rootfs.join("dev/mqueue"))?;
    mount::devpts(sc, &rootfs.join("dev/pts"))?;
    mount::bind(sc, &rootfs.join("dev/pts/ptmx"), &rootfs.join("dev/ptmx"))?;
    Ok(())
}

/// Applies the fixed DNS/host-alias binds, the workspace mount, and every
/// entry of `run_options.mounts`, in that order.
fn apply_user_mounts(
    sc: &dyn Syscall,
    rootfs: &Path,
    run_options: &RunOptions,
) -> Result<(), EnterError> {
    mount::bind(
        sc,
        Path::new("/etc/resolv.conf"),
        &rootfs.join("etc/resolv.conf"),
    )?;
    mount::bind(sc, Path::new("/etc/hosts"), &rootfs.join("etc/hosts"))?;

    if let Some(ws) = &run_options.workspace_mount {
        if ws.target.is_empty() {
            return Err(EnterError::EmptyTarget);
        }
        apply_descriptor(
            sc,
            rootfs,
            &MountDescriptor {
                source: ws.source.clone(),
                target: ws.target.clone(),
                mount_type: "bind".to_string(),
            },
        )?;
    }

    for descriptor in &run_options.mounts {
        apply_descriptor(sc, rootfs, descriptor)?;
    }

    Ok(())
}

fn apply_descriptor(
    sc: &dyn Syscall,
    rootfs: &Path,
    descriptor: &MountDescriptor,
) -> Result<(), EnterError> {
    if descriptor.target.is_empty() {
        return Err(EnterError::EmptyTarget);
    }
    let target = rootfs.join(descriptor.target.trim_start_matches('/'));
    mount::apply_descriptor(
        sc,
        &descriptor.mount_type,
        Path::new(&descriptor.source),
        &target,
    )?;
    Ok(())
}

/// The pivot_root sequence: self bind-mount, private remounts, pivot, chdir,
/// detach the old root.
fn pivot_into(sc: &dyn Syscall, rootfs: &Path) -> Result<(), EnterError> {
    sc.mount(
        Some(rootfs),
        rootfs,
        None,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None,
    )?;
    sc.mount(None, rootfs, None, MsFlags::MS_PRIVATE | MsFlags::MS_REC, None)?;
    sc.mount(
        None,
        Path::new("/"),
        None,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None,
    )?;

    let put_old = rootfs.join(".pivot_root");
    fs::create_dir_all(&put_old).map_err(|e| io_err(&put_old, e))?;

    sc.pivot_root(rootfs, &put_old)?;
    sc.chdir(Path::new("/"))?;

    let put_old_after_pivot = Path::new("/.pivot_root");
    nix::mount::umount2(put_old_after_pivot, nix::mount::MntFlags::MNT_DETACH)
        .map_err(|cause| SyscallError::Mount {
            source: None,
            target: put_old_after_pivot.display().to_string(),
            fstype: None,
            cause,
        })?;
    let _ = fs::remove_dir(put_old_after_pivot);

    Ok(())
}

/// The full `enter` protocol. Blocks on the workload and returns its exit
/// status (or `None` if it was terminated by a signal).
pub fn run(store: &Store, id: &str, sc: &dyn Syscall) -> Result<Option<i32>, EnterError> {
    let run_options = store.read_run_options(id)?;
    let rootfs = store.rootfs_dir(id);

    prepare_kernel_mounts(sc, &rootfs)?;
    apply_user_mounts(sc, &rootfs, &run_options)?;
    pivot_into(sc, &rootfs)?;

    sc.sethostname(id)?;

    store.set_status(id, ContainerStatus::Running)?;

    let mut argv = vec!["--".to_string(), run_options.entrypoint.clone()];
    argv.extend(run_options.cmd.clone());

    let mut command = Command::new("/usr/bin/env");
    command.args(&argv);
    command.env_clear();
    for (key, value) in &run_options.env {
        command.env(key, value);
    }

    let mut child = command.spawn().map_err(EnterError::Spawn)?;
    let status = child.wait().map_err(EnterError::Spawn)?;

    store.set_status(id, ContainerStatus::Stopped)?;

    Ok(status.code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::test::TestSyscall;
    use std::collections::HashMap;

    #[test]
    fn workspace_mount_with_empty_target_fails_before_side_effects() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        let sc = TestSyscall::default();
        let rootfs = tmp.path().join("rootfs");

        let run_options = RunOptions {
            image: "alpine".to_string(),
            entrypoint: "/bin/sh".to_string(),
            cmd: vec![],
            env: HashMap::new(),
            labels: vec![],
            workspace_mount: Some(crate::model::WorkspaceMount {
                source: "/host/project".to_string(),
                target: String::new(),
            }),
            mounts: vec![],
            unsupported: Default::default(),
        };

        let err = apply_user_mounts(&sc, &rootfs, &run_options).unwrap_err();
        assert!(matches!(err, EnterError::EmptyTarget));
    }

    #[test]
    fn non_bind_mount_descriptor_fails_without_mutating_rootfs() {
        let tmp = tempfile::tempdir().unwrap();
        let sc = TestSyscall::default();
        let rootfs = tmp.path().join("rootfs");

        let descriptor = MountDescriptor {
            source: "/data".to_string(),
            target: "/mnt".to_string(),
            mount_type: "volume".to_string(),
        };

        let err = apply_descriptor(&sc, &rootfs, &descriptor).unwrap_err();
        assert!(matches!(err, EnterError::Mount(_)));
    }
}
