//! Typed wrappers over `mount(2)` for the kernel filesystems and bind mounts
//! `enter` needs to assemble a container root.

use std::fs::{self, OpenOptions};
use std::path::Path;

use nix::mount::MsFlags;
use thiserror::Error;

use crate::syscall::{Syscall, SyscallError};

#[derive(Debug, Error)]
pub enum MountError {
    #[error("failed to create mount destination {0:?}: {1}")]
    CreateDestination(String, #[source] std::io::Error),
    #[error(transparent)]
    Syscall(#[from] SyscallError),
    #[error("unsupported mount type {0:?}, only \"bind\" is supported")]
    UnsupportedType(String),
}

fn ensure_dir(path: &Path) -> Result<(), MountError> {
    fs::create_dir_all(path)
        .map_err(|e| MountError::CreateDestination(path.display().to_string(), e))
}

fn ensure_file(path: &Path) -> Result<(), MountError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| MountError::CreateDestination(path.display().to_string(), e))?;
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .map(|_| ())
        .map_err(|e| MountError::CreateDestination(path.display().to_string(), e))
}

/// Binds `source` onto `target`, creating `target` as a directory or a plain
/// file to match the kind of `source`.
pub fn bind(sc: &dyn Syscall, source: &Path, target: &Path) -> Result<(), MountError> {
    if source.is_dir() {
        ensure_dir(target)?;
    } else {
        ensure_file(target)?;
    }
    sc.mount(
        Some(source),
        target,
        None,
        MsFlags::MS_BIND | MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None,
    )?;
    Ok(())
}

pub fn proc(sc: &dyn Syscall, target: &Path) -> Result<(), MountError> {
    ensure_dir(target)?;
    sc.mount(
        None,
        target,
        Some("proc"),
        MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
        None,
    )?;
    Ok(())
}

pub fn tmpfs(sc: &dyn Syscall, target: &Path) -> Result<(), MountError> {
    ensure_dir(target)?;
    sc.mount(None, target, Some("tmpfs"), MsFlags::empty(), None)?;
    Ok(())
}

/// `/dev/shm`-flavored tmpfs: fixed mode, size cap, and the usual no-exec
/// hardening.
pub fn tmpfs_shm(sc: &dyn Syscall, target: &Path) -> Result<(), MountError> {
    ensure_dir(target)?;
    sc.mount(
        None,
        target,
        Some("tmpfs"),
        MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
        Some("mode=1777,size=65536k"),
    )?;
    Ok(())
}

pub fn mqueue(sc: &dyn Syscall, target: &Path) -> Result<(), MountError> {
    ensure_dir(target)?;
    sc.mount(
        None,
        target,
        Some("mqueue"),
        MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
        None,
    )?;
    Ok(())
}

pub fn devpts(sc: &dyn Syscall, target: &Path) -> Result<(), MountError> {
    ensure_dir(target)?;
    sc.mount(
        None,
        target,
        Some("devpts"),
        MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID,
        Some("newinstance,ptmxmode=0666,mode=0620"),
    )?;
    Ok(())
}

/// Applies a single user-supplied mount descriptor. Only `bind` is
/// supported; anything else is a hard, side-effect-free failure.
pub fn apply_descriptor(
    sc: &dyn Syscall,
    mount_type: &str,
    source: &Path,
    target: &Path,
) -> Result<(), MountError> {
    if mount_type != "bind" {
        return Err(MountError::UnsupportedType(mount_type.to_string()));
    }
    bind(sc, source, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::test::TestSyscall;

    #[test]
    fn rejects_non_bind_descriptor_before_touching_anything() {
        let sc = TestSyscall::default();
        let err = apply_descriptor(&sc, "volume", Path::new("/src"), Path::new("/dst"))
            .unwrap_err();
        assert!(matches!(err, MountError::UnsupportedType(_)));
        assert!(sc.log.borrow().is_empty());
    }

    #[test]
    fn bind_creates_destination_directory_for_directory_source() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        fs::create_dir(&source).unwrap();
        let target = tmp.path().join("dst");

        let sc = TestSyscall::default();
        bind(&sc, &source, &target).unwrap();

        assert!(target.is_dir());
        assert_eq!(sc.log.borrow().len(), 1);
    }
}
