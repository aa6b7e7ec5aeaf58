//! Namespace entry via self-re-execution.
//!
//! Containers run in two phases. The parent phase re-executes
//! `/proc/self/exe run <merged> <command...>` after arranging new UTS,
//! mount, and PID namespaces; the re-executed child — recognized by its
//! argv[0] — forks once so the new PID namespace has an init, then pivots
//! into the overlay, remounts `/proc`, and execs the user command under
//! `/bin/sh`. Exit status flows back through both phases.

use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Command, ExitStatus};

use containy_core::config::Config;
use containy_core::error::{ContainyError, Result};
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sched::{unshare, CloneFlags};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{chdir, fork, pivot_root, sethostname, ForkResult};

use crate::overlay::ensure_directories;

/// Hostname assigned inside the UTS namespace.
const CONTAINER_HOSTNAME: &str = "container";

/// Path the kernel reports as argv[0] after the trampoline re-exec.
const REEXEC_ARGV0: &str = "/proc/self/exe";

/// True when this process is the re-executed trampoline.
pub(crate) fn is_reexec_child() -> bool {
    std::env::args().next().as_deref() == Some(REEXEC_ARGV0)
}

/// Parent phase: spawn the trampoline in new namespaces and wait for it.
///
/// Stdio is inherited, so the user command talks to the caller's terminal.
pub(crate) fn spawn_parent(overlay_dir: &Path, command: &[String]) -> Result<i32> {
    tracing::debug!(overlay = %overlay_dir.display(), "Spawning child with new namespaces");

    let mut cmd = Command::new(REEXEC_ARGV0);
    cmd.arg("run").arg(overlay_dir).args(command);
    // SAFETY: unshare is async-signal-safe and nothing else runs between
    // fork and exec.
    unsafe {
        cmd.pre_exec(|| {
            unshare(
                CloneFlags::CLONE_NEWUTS | CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWPID,
            )
            .map_err(io::Error::from)
        });
    }

    let status = cmd
        .status()
        .map_err(|e| ContainyError::Exec(format!("failed to spawn container child: {e}")))?;

    tracing::debug!("Child process finished");
    Ok(exit_code(status))
}

/// Child phase: become init of the new PID namespace, set up the container
/// environment, and exec the user command.
pub(crate) fn child_entry(overlay_dir: &Path, command: &[String], config: &Config) -> Result<i32> {
    tracing::debug!("In child process");

    // unshare(CLONE_NEWPID) in the parent only moves our children into the
    // new namespace; fork so setup and the command run as its init.
    match unsafe { fork() }
        .map_err(|e| ContainyError::Exec(format!("fork failed: {e}")))?
    {
        ForkResult::Parent { child } => match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => Ok(code),
            Ok(WaitStatus::Signaled(_, signal, _)) => Ok(128 + signal as i32),
            Ok(_) => Ok(1),
            Err(e) => Err(ContainyError::Exec(format!("waitpid failed: {e}"))),
        },
        ForkResult::Child => {
            let err = match setup_container(overlay_dir, config) {
                Ok(()) => exec_command(command),
                Err(e) => e,
            };
            tracing::error!("Container setup failed: {err}");
            std::process::exit(1);
        }
    }
}

/// Container environment setup, in order: hostname, private root mount,
/// pivot_root, /proc, PATH. Every step must succeed.
fn setup_container(overlay_dir: &Path, config: &Config) -> Result<()> {
    sethostname(CONTAINER_HOSTNAME)
        .map_err(|e| ContainyError::Mount(format!("failed to set hostname: {e}")))?;

    // Keep container mounts from leaking to the host.
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| ContainyError::Mount(format!("failed to make / private: {e}")))?;

    pivot_into(overlay_dir)?;

    mount(
        Some("proc"),
        "/proc",
        Some("proc"),
        MsFlags::empty(),
        None::<&str>,
    )
    .map_err(|e| ContainyError::Mount(format!("failed to mount /proc: {e}")))?;

    std::env::set_var("PATH", &config.default_path);
    Ok(())
}

/// Swap the root filesystem for the overlay's merged view and drop the old
/// root.
fn pivot_into(overlay_dir: &Path) -> Result<()> {
    // pivot_root needs somewhere inside the new root to park the old one.
    let old_root = overlay_dir.join("oldroot");
    ensure_directories(&[&old_root])?;

    pivot_root(overlay_dir, &old_root).map_err(|e| {
        ContainyError::Mount(format!(
            "pivot_root into {} failed: {}",
            overlay_dir.display(),
            e
        ))
    })?;

    chdir("/").map_err(|e| ContainyError::Mount(format!("failed to chdir to new root: {e}")))?;

    umount2("/oldroot", MntFlags::MNT_DETACH)
        .map_err(|e| ContainyError::Mount(format!("failed to unmount old root: {e}")))?;
    std::fs::remove_dir("/oldroot")
        .map_err(|e| ContainyError::Io(format!("failed to remove old root: {e}")))
}

/// Exec the user command under /bin/sh. Only returns on failure.
fn exec_command(command: &[String]) -> ContainyError {
    let joined = command.join(" ");
    tracing::debug!(command = %joined, "Running command");
    let err = Command::new("/bin/sh").arg("-c").arg(&joined).exec();
    ContainyError::Exec(format!("failed to exec {joined}: {err}"))
}

/// Map an exit status to a shell-style exit code (128+signal on signal
/// death).
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_reexec_child_false_under_test_harness() {
        assert!(!is_reexec_child());
    }

    #[test]
    fn test_exit_code_passthrough() {
        // Wait status 0x0100 encodes exit(1)
        assert_eq!(exit_code(ExitStatus::from_raw(0x0100)), 1);
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
    }

    #[test]
    fn test_exit_code_signal_death() {
        // Wait status 9 encodes death by SIGKILL
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 128 + 9);
    }
}
