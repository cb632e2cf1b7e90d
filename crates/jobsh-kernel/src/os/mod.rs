//! Platform boundary for job control.
//!
//! Everything the kernel asks of the operating system goes through the
//! [`Os`] trait: process creation and image replacement, waiting, process
//! groups, terminal foreground and line discipline, signal dispositions and
//! delivery, and descriptor plumbing for redirection. [`UnixOs`] is the
//! real implementation; unit tests drive the kernel with a scripted mock.

mod unix;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::ffi::{CStr, CString};
use std::fs::OpenOptions;
use std::os::fd::{OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use jobsh_types::OutputMode;
use nix::sys::signal::Signal;
use nix::sys::termios::Termios;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

pub use unix::UnixOs;

/// Signals the shell ignores so that the keyboard only affects jobs.
/// Children get them back at their default disposition before exec.
pub const JOB_CONTROL_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

/// Everything a child needs to set itself up between fork and exec.
///
/// Strings are prepared by the parent so the child does not allocate.
#[derive(Debug)]
pub struct SpawnRequest<'a> {
    pub program: &'a CStr,
    pub argv: &'a [CString],
    /// Group to join; `None` makes the child the leader of a new group.
    pub pgid: Option<Pid>,
    /// Join a process group and restore default signal dispositions.
    pub job_control: bool,
    /// Claim the terminal for the group (interactive foreground jobs).
    pub foreground: bool,
    pub terminal: RawFd,
    pub stdin: RawFd,
    pub stdout: RawFd,
}

/// Process, terminal and signal operations used by the kernel.
pub trait Os {
    /// Whether `fd` refers to a terminal.
    fn is_terminal(&self, fd: RawFd) -> bool;

    fn pid(&self) -> Pid;

    /// Process group of the calling process.
    fn process_group(&self) -> Pid;

    fn set_process_group(&self, pid: Pid, pgid: Pid) -> nix::Result<()>;

    /// Foreground process group of `terminal`.
    fn foreground_group(&self, terminal: RawFd) -> nix::Result<Pid>;

    fn set_foreground_group(&self, terminal: RawFd, pgid: Pid) -> nix::Result<()>;

    fn terminal_modes(&self, terminal: RawFd) -> nix::Result<Termios>;

    /// Apply line-discipline settings once pending output has drained.
    fn set_terminal_modes(&self, terminal: RawFd, modes: &Termios) -> nix::Result<()>;

    /// Send `signal` to every process in group `pgid`.
    fn signal_group(&self, pgid: Pid, signal: Signal) -> nix::Result<()>;

    /// Ignore [`JOB_CONTROL_SIGNALS`] in the shell.
    fn ignore_job_control_signals(&self) -> nix::Result<()>;

    /// Arrange for `pending` to be set whenever a child changes status.
    fn install_child_status_trigger(&self, pending: Arc<AtomicBool>) -> std::io::Result<()>;

    /// Block (`true`) or unblock (`false`) child-status delivery.
    fn suppress_child_status(&self, suppressed: bool) -> nix::Result<()>;

    /// Collect one status change (exit, signal death or stop) from any child.
    /// Non-blocking calls report `WaitStatus::StillAlive` when nothing is ready.
    fn wait_any(&self, blocking: bool) -> nix::Result<WaitStatus>;

    /// Fork a child that applies `request` and replaces its image.
    /// Returns the child's pid in the parent.
    fn spawn(&self, request: &SpawnRequest<'_>) -> nix::Result<Pid>;

    /// Create a pipe, returning `(read, write)`.
    fn pipe(&self) -> std::io::Result<(OwnedFd, OwnedFd)> {
        let (reader, writer) = std::io::pipe()?;
        Ok((reader.into(), writer.into()))
    }

    /// Open `path` read-only for `<`.
    fn open_input(&self, path: &Path) -> std::io::Result<OwnedFd> {
        Ok(OpenOptions::new().read(true).open(path)?.into())
    }

    /// Open `path` for `>` (truncate, create) or `>>` (append).
    fn open_output(&self, path: &Path, mode: OutputMode, permissions: u32) -> std::io::Result<OwnedFd> {
        let mut options = OpenOptions::new();
        options.write(true).mode(permissions);
        match mode {
            OutputMode::Truncate => options.truncate(true).create(true),
            OutputMode::Append => options.append(true),
        };
        Ok(options.open(path)?.into())
    }
}
