//! nix-backed implementation of [`Os`].

use std::ffi::CStr;
use std::io::IsTerminal;
use std::os::fd::{AsFd, BorrowedFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use nix::errno::Errno;
use nix::libc::{STDIN_FILENO, STDOUT_FILENO};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::termios::{self, SetArg, Termios};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{self, ForkResult, Pid};

use super::{JOB_CONTROL_SIGNALS, Os, SpawnRequest};

/// The host's process and terminal API.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixOs;

impl UnixOs {
    pub fn new() -> Self {
        Self
    }
}

/// Borrow a descriptor the session owns for its whole lifetime.
fn terminal(fd: RawFd) -> BorrowedFd<'static> {
    // SAFETY: the terminal descriptor is one of the standard streams (or one
    // the embedder keeps open for the session); it outlives every call here.
    unsafe { BorrowedFd::borrow_raw(fd) }
}

fn child_status_set() -> SigSet {
    let mut set = SigSet::empty();
    set.add(Signal::SIGCHLD);
    set
}

fn set_dispositions(handler: SigHandler, signals: &[Signal]) -> nix::Result<()> {
    let action = SigAction::new(handler, SaFlags::empty(), SigSet::empty());
    for sig in signals {
        // SAFETY: SigIgn and SigDfl install no Rust code as a handler.
        unsafe { signal::sigaction(*sig, &action) }?;
    }
    Ok(())
}

/// Child side of `spawn`. Never returns.
fn exec_child(request: &SpawnRequest<'_>) -> ! {
    if request.job_control {
        let pid = unistd::getpid();
        let pgid = request.pgid.unwrap_or(pid);
        let _ = unistd::setpgid(pid, pgid);
        // SIGTTOU is still ignored here, so a background caller may do this.
        if request.foreground {
            let _ = unistd::tcsetpgrp(terminal(request.terminal), pgid);
        }
        let _ = set_dispositions(SigHandler::SigDfl, &JOB_CONTROL_SIGNALS);
        let _ = set_dispositions(SigHandler::SigDfl, &[Signal::SIGCHLD]);
    }
    // The mask survives exec; the parent forks with child status blocked.
    let _ = signal::sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&child_status_set()), None);

    if request.stdin != STDIN_FILENO {
        let _ = unistd::dup2(request.stdin, STDIN_FILENO);
        let _ = unistd::close(request.stdin);
    }
    if request.stdout != STDOUT_FILENO {
        let _ = unistd::dup2(request.stdout, STDOUT_FILENO);
        let _ = unistd::close(request.stdout);
    }

    let err = match unistd::execvp(request.program, request.argv) {
        Ok(never) => match never {},
        Err(err) => err,
    };
    report_exec_failure(request.program, err);
    let code = if err == Errno::ENOENT { 127 } else { 126 };
    // SAFETY: _exit is async-signal-safe and skips the atexit handlers and
    // stdio buffers the child inherited from the shell.
    unsafe { nix::libc::_exit(code) }
}

/// Write `jobsh: <program>: <error>` to stderr. Runs between fork and
/// exec, so it must not allocate.
fn report_exec_failure(program: &CStr, err: Errno) {
    let stderr = std::io::stderr();
    let fd = stderr.as_fd();
    for part in [
        b"jobsh: ".as_slice(),
        program.to_bytes(),
        b": ",
        err.desc().as_bytes(),
        b"\n",
    ] {
        let _ = unistd::write(fd, part);
    }
}

impl Os for UnixOs {
    fn is_terminal(&self, fd: RawFd) -> bool {
        terminal(fd).is_terminal()
    }

    fn pid(&self) -> Pid {
        unistd::getpid()
    }

    fn process_group(&self) -> Pid {
        unistd::getpgrp()
    }

    fn set_process_group(&self, pid: Pid, pgid: Pid) -> nix::Result<()> {
        unistd::setpgid(pid, pgid)
    }

    fn foreground_group(&self, fd: RawFd) -> nix::Result<Pid> {
        unistd::tcgetpgrp(terminal(fd))
    }

    fn set_foreground_group(&self, fd: RawFd, pgid: Pid) -> nix::Result<()> {
        unistd::tcsetpgrp(terminal(fd), pgid)
    }

    fn terminal_modes(&self, fd: RawFd) -> nix::Result<Termios> {
        termios::tcgetattr(terminal(fd))
    }

    fn set_terminal_modes(&self, fd: RawFd, modes: &Termios) -> nix::Result<()> {
        termios::tcsetattr(terminal(fd), SetArg::TCSADRAIN, modes)
    }

    fn signal_group(&self, pgid: Pid, sig: Signal) -> nix::Result<()> {
        signal::killpg(pgid, sig)
    }

    fn ignore_job_control_signals(&self) -> nix::Result<()> {
        set_dispositions(SigHandler::SigIgn, &JOB_CONTROL_SIGNALS)
    }

    fn install_child_status_trigger(&self, pending: Arc<AtomicBool>) -> std::io::Result<()> {
        signal_hook::flag::register(signal_hook::consts::SIGCHLD, pending).map(|_| ())
    }

    fn suppress_child_status(&self, suppressed: bool) -> nix::Result<()> {
        let how = if suppressed {
            SigmaskHow::SIG_BLOCK
        } else {
            SigmaskHow::SIG_UNBLOCK
        };
        signal::sigprocmask(how, Some(&child_status_set()), None)
    }

    fn wait_any(&self, blocking: bool) -> nix::Result<WaitStatus> {
        let mut flags = WaitPidFlag::WUNTRACED;
        if !blocking {
            flags |= WaitPidFlag::WNOHANG;
        }
        loop {
            match waitpid(Pid::from_raw(-1), Some(flags)) {
                Err(Errno::EINTR) => continue,
                other => return other,
            }
        }
    }

    fn spawn(&self, request: &SpawnRequest<'_>) -> nix::Result<Pid> {
        // SAFETY: between fork and exec the child only makes system calls on
        // descriptors and strings the parent built, and reports exec
        // failure without going through the allocator or stdio locks.
        match unsafe { unistd::fork() }? {
            ForkResult::Parent { child } => Ok(child),
            ForkResult::Child => exec_child(request),
        }
    }
}
