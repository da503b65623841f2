//! A narrow syscall abstraction so the mount and pivot_root sequences used by
//! [`enter`](crate::enter) can be exercised without a real container.

use std::path::Path;

use nix::mount::{mount, MsFlags};
use nix::unistd::{chdir, pivot_root, sethostname};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyscallError {
    #[error("mount({source:?} -> {target:?}, {fstype:?}): {cause}")]
    Mount {
        source: Option<String>,
        target: String,
        fstype: Option<String>,
        #[source]
        cause: nix::Error,
    },
    #[error("pivot_root({new_root:?}, {put_old:?}): {cause}")]
    PivotRoot {
        new_root: String,
        put_old: String,
        #[source]
        cause: nix::Error,
    },
    #[error("chdir({0:?}): {1}")]
    Chdir(String, #[source] nix::Error),
    #[error("sethostname({0:?}): {1}")]
    SetHostname(String, #[source] nix::Error),
}

/// Thin wrapper over the handful of raw syscalls `enter` needs, so tests can
/// substitute a recording fake instead of touching the real kernel.
pub trait Syscall {
    #[allow(clippy::too_many_arguments)]
    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<(), SyscallError>;

    fn pivot_root(&self, new_root: &Path, put_old: &Path) -> Result<(), SyscallError>;

    fn chdir(&self, path: &Path) -> Result<(), SyscallError>;

    fn sethostname(&self, name: &str) -> Result<(), SyscallError>;
}

pub fn create_syscall() -> Box<dyn Syscall> {
    Box::new(LinuxSyscall)
}

pub struct LinuxSyscall;

impl Syscall for LinuxSyscall {
    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<(), SyscallError> {
        mount(source, target, fstype, flags, data).map_err(|cause| SyscallError::Mount {
            source: source.map(|p| p.display().to_string()),
            target: target.display().to_string(),
            fstype: fstype.map(|s| s.to_string()),
            cause,
        })
    }

    fn pivot_root(&self, new_root: &Path, put_old: &Path) -> Result<(), SyscallError> {
        pivot_root(new_root, put_old).map_err(|cause| SyscallError::PivotRoot {
            new_root: new_root.display().to_string(),
            put_old: put_old.display().to_string(),
            cause,
        })
    }

    fn chdir(&self, path: &Path) -> Result<(), SyscallError> {
        chdir(path).map_err(|cause| SyscallError::Chdir(path.display().to_string(), cause))
    }

    fn sethostname(&self, name: &str) -> Result<(), SyscallError> {
        sethostname(name).map_err(|cause| SyscallError::SetHostname(name.to_string(), cause))
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug, Clone)]
    pub enum Invocation {
        Mount {
            source: Option<String>,
            target: String,
        },
        PivotRoot {
            new_root: String,
            put_old: String,
        },
        Chdir(String),
        SetHostname(String),
    }

    #[derive(Default)]
    pub struct TestSyscall {
        pub log: RefCell<Vec<Invocation>>,
    }

    impl Syscall for TestSyscall {
        fn mount(
            &self,
            source: Option<&Path>,
            target: &Path,
            _fstype: Option<&str>,
            _flags: MsFlags,
            _data: Option<&str>,
        ) -> Result<(), SyscallError> {
            self.log.borrow_mut().push(Invocation::Mount {
                source: source.map(|p| p.display().to_string()),
                target: target.display().to_string(),
            });
            Ok(())
        }

        fn pivot_root(&self, new_root: &Path, put_old: &Path) -> Result<(), SyscallError> {
            self.log.borrow_mut().push(Invocation::PivotRoot {
                new_root: new_root.display().to_string(),
                put_old: put_old.display().to_string(),
            });
            Ok(())
        }

        fn chdir(&self, path: &Path) -> Result<(), SyscallError> {
            self.log
                .borrow_mut()
                .push(Invocation::Chdir(path.display().to_string()));
            Ok(())
        }

        fn sethostname(&self, name: &str) -> Result<(), SyscallError> {
            self.log
                .borrow_mut()
                .push(Invocation::SetHostname(name.to_string()));
            Ok(())
        }
    }

    #[test]
    fn records_invocations_without_touching_the_kernel() {
        let sc = TestSyscall::default();
        sc.chdir(Path::new("/")).unwrap();
        sc.sethostname("box").unwrap();
        assert_eq!(sc.log.borrow().len(), 2);
    }
}
