//! Privilege-asymmetric helper selection.
//!
//! Two codepaths must stay behavior-equivalent: `rootlesskit` when the
//! effective UID is non-zero, plain `unshare` when already root. This module
//! is the single place that decides which one applies and builds its argv,
//! shared by rootfs creation, the namespace launcher, and rootfs deletion.

use std::path::Path;
use std::process::Command;

use nix::unistd::geteuid;

/// True when this process must go through `rootlesskit` rather than
/// `unshare` directly.
pub fn is_unprivileged() -> bool {
    !geteuid().is_root()
}

/// Builds the external helper command that creates the namespaces, with
/// `program` and its argv appended as the command to run inside them.
///
/// `state_dir` is only consulted for the unprivileged path, where
/// `rootlesskit` needs somewhere to keep its own PID-namespace bookkeeping.
pub fn helper_command(state_dir: &Path, has_tun: bool) -> Command {
    if is_unprivileged() {
        let mut cmd = Command::new("rootlesskit");
        cmd.arg("--pidns")
            .arg("--cgroupns")
            .arg("--utsns")
            .arg("--ipcns")
            .arg("--state-dir")
            .arg(state_dir);
        if has_tun {
            cmd.arg("--net")
                .arg("slirp4netns")
                .arg("--port-driver")
                .arg("slirp4netns")
                .arg("--disable-host-loopback")
                .arg("--copy-up")
                .arg("/etc");
        } else {
            cmd.arg("--net").arg("host");
        }
        cmd
    } else {
        let mut cmd = Command::new("unshare");
        cmd.arg("-m").arg("-p").arg("-u").arg("-f").arg("--mount-proc");
        cmd
    }
}

/// True when `/dev/net/tun` exists, meaning slirp4netns networking can be
/// set up for the unprivileged path.
pub fn has_tun_device() -> bool {
    Path::new("/dev/net/tun").exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helper_command_picks_a_real_program_name() {
        let cmd = helper_command(Path::new("/tmp/rootbox/x"), false);
        let prog = cmd.get_program().to_string_lossy().into_owned();
        assert!(prog == "rootlesskit" || prog == "unshare");
    }
}
