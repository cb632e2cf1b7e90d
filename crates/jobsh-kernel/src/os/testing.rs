//! Scripted [`Os`] for unit tests.
//!
//! Records every terminal, signal and spawn call, hands out fake pids, and
//! answers `wait_any` from a queue of statuses. Pipes and redirection files
//! are real so descriptor handling is exercised for real.

use std::collections::VecDeque;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::Signal;
use nix::sys::termios::{LocalFlags, Termios};
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use super::{Os, SpawnRequest};

/// Shell pid (and process group after `init_session`).
pub const SHELL_PID: i32 = 100;
/// First pid handed to a spawned child.
pub const FIRST_CHILD: i32 = 1000;

/// What a spawned child was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRecord {
    pub pid: Pid,
    pub argv: Vec<String>,
    pub pgid: Option<Pid>,
    pub job_control: bool,
    pub foreground: bool,
    pub stdin_redirected: bool,
    pub stdout_redirected: bool,
}

/// Observable calls, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SetProcessGroup(Pid, Pid),
    SetForeground(Pid),
    SetModes(LocalFlags),
    Signal(Pid, Signal),
    IgnoreSignals,
    InstallTrigger,
    Suppress(bool),
    Wait { blocking: bool },
    Pipe,
    Spawn(Pid),
}

#[derive(Debug)]
struct State {
    tty: bool,
    pgrp: Pid,
    foreground: Pid,
    modes: LocalFlags,
    next_child: i32,
    waits: VecDeque<nix::Result<WaitStatus>>,
    calls: Vec<Call>,
    spawned: Vec<SpawnRecord>,
    trigger: Option<Arc<AtomicBool>>,
    blocked: bool,
    /// Groups that no longer exist; signalling them fails with ESRCH.
    gone: Vec<Pid>,
}

/// Cloneable handle; clones share state so a test keeps one for inspection.
#[derive(Debug, Clone)]
pub struct MockOs {
    state: Arc<Mutex<State>>,
}

/// Build a `Termios` whose local flags identify it.
pub fn modes(flags: LocalFlags) -> Termios {
    // SAFETY: an all-zero termios is a valid (if useless) value.
    let raw: libc::termios = unsafe { std::mem::zeroed() };
    let mut termios = Termios::from(raw);
    termios.local_flags = flags;
    termios
}

impl MockOs {
    /// A tty whose foreground group is already the shell's.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                tty: true,
                pgrp: Pid::from_raw(SHELL_PID),
                foreground: Pid::from_raw(SHELL_PID),
                modes: LocalFlags::ICANON | LocalFlags::ECHO,
                next_child: FIRST_CHILD,
                waits: VecDeque::new(),
                calls: Vec::new(),
                spawned: Vec::new(),
                trigger: None,
                blocked: false,
                gone: Vec::new(),
            })),
        }
    }

    /// Not a terminal at all.
    pub fn without_tty() -> Self {
        let os = Self::new();
        os.state.lock().unwrap().tty = false;
        os
    }

    /// Start in a process group of our own that doesn't own the terminal.
    pub fn in_background_group(pgrp: i32, foreground: i32) -> Self {
        let os = Self::new();
        {
            let mut state = os.state.lock().unwrap();
            state.pgrp = Pid::from_raw(pgrp);
            state.foreground = Pid::from_raw(foreground);
        }
        os
    }

    pub fn queue_wait(&self, status: WaitStatus) {
        self.state.lock().unwrap().waits.push_back(Ok(status));
    }

    pub fn queue_wait_error(&self, errno: Errno) {
        self.state.lock().unwrap().waits.push_back(Err(errno));
    }

    pub fn pending_waits(&self) -> usize {
        self.state.lock().unwrap().waits.len()
    }

    /// Pretend the running job changed the terminal's settings.
    pub fn alter_terminal_modes(&self, flags: LocalFlags) {
        self.state.lock().unwrap().modes = flags;
    }

    pub fn terminal_flags(&self) -> LocalFlags {
        self.state.lock().unwrap().modes
    }

    /// Raise the child-status trigger as the signal handler would.
    pub fn deliver_child_status(&self) {
        if let Some(flag) = &self.state.lock().unwrap().trigger {
            flag.store(true, Ordering::SeqCst);
        }
    }

    /// Pretend every process in group `pgid` has died unreaped.
    pub fn kill_group(&self, pgid: i32) {
        self.state.lock().unwrap().gone.push(Pid::from_raw(pgid));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn spawned(&self) -> Vec<SpawnRecord> {
        self.state.lock().unwrap().spawned.clone()
    }

    pub fn foreground(&self) -> Pid {
        self.state.lock().unwrap().foreground
    }

    pub fn is_suppressed(&self) -> bool {
        self.state.lock().unwrap().blocked
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl Os for MockOs {
    fn is_terminal(&self, _fd: RawFd) -> bool {
        self.state.lock().unwrap().tty
    }

    fn pid(&self) -> Pid {
        Pid::from_raw(SHELL_PID)
    }

    fn process_group(&self) -> Pid {
        self.state.lock().unwrap().pgrp
    }

    fn set_process_group(&self, pid: Pid, pgid: Pid) -> nix::Result<()> {
        self.record(Call::SetProcessGroup(pid, pgid));
        if pid == self.pid() {
            self.state.lock().unwrap().pgrp = pgid;
        }
        Ok(())
    }

    fn foreground_group(&self, _terminal: RawFd) -> nix::Result<Pid> {
        let state = self.state.lock().unwrap();
        if state.tty { Ok(state.foreground) } else { Err(Errno::ENOTTY) }
    }

    fn set_foreground_group(&self, _terminal: RawFd, pgid: Pid) -> nix::Result<()> {
        self.record(Call::SetForeground(pgid));
        self.state.lock().unwrap().foreground = pgid;
        Ok(())
    }

    fn terminal_modes(&self, _terminal: RawFd) -> nix::Result<Termios> {
        Ok(modes(self.state.lock().unwrap().modes))
    }

    fn set_terminal_modes(&self, _terminal: RawFd, termios: &Termios) -> nix::Result<()> {
        self.record(Call::SetModes(termios.local_flags));
        self.state.lock().unwrap().modes = termios.local_flags;
        Ok(())
    }

    fn signal_group(&self, pgid: Pid, signal: Signal) -> nix::Result<()> {
        self.record(Call::Signal(pgid, signal));
        let mut state = self.state.lock().unwrap();
        if state.gone.contains(&pgid) {
            return Err(Errno::ESRCH);
        }
        // A stopped-in-background shell gets the terminal once it asks.
        if signal == Signal::SIGTTIN && pgid == state.pgrp {
            state.foreground = state.pgrp;
        }
        Ok(())
    }

    fn ignore_job_control_signals(&self) -> nix::Result<()> {
        self.record(Call::IgnoreSignals);
        Ok(())
    }

    fn install_child_status_trigger(&self, pending: Arc<AtomicBool>) -> std::io::Result<()> {
        self.record(Call::InstallTrigger);
        self.state.lock().unwrap().trigger = Some(pending);
        Ok(())
    }

    fn suppress_child_status(&self, suppressed: bool) -> nix::Result<()> {
        self.record(Call::Suppress(suppressed));
        self.state.lock().unwrap().blocked = suppressed;
        Ok(())
    }

    fn wait_any(&self, blocking: bool) -> nix::Result<WaitStatus> {
        self.record(Call::Wait { blocking });
        let mut state = self.state.lock().unwrap();
        match state.waits.pop_front() {
            Some(result) => result,
            None if blocking => Err(Errno::ECHILD),
            None => Ok(WaitStatus::StillAlive),
        }
    }

    fn spawn(&self, request: &SpawnRequest<'_>) -> nix::Result<Pid> {
        let pid = {
            let mut state = self.state.lock().unwrap();
            let pid = Pid::from_raw(state.next_child);
            state.next_child += 1;
            state.spawned.push(SpawnRecord {
                pid,
                argv: request
                    .argv
                    .iter()
                    .map(|a| a.to_string_lossy().into_owned())
                    .collect(),
                pgid: request.pgid,
                job_control: request.job_control,
                foreground: request.foreground,
                stdin_redirected: request.stdin != libc::STDIN_FILENO,
                stdout_redirected: request.stdout != libc::STDOUT_FILENO,
            });
            pid
        };
        self.record(Call::Spawn(pid));
        Ok(pid)
    }

    fn pipe(&self) -> std::io::Result<(std::os::fd::OwnedFd, std::os::fd::OwnedFd)> {
        self.record(Call::Pipe);
        let (reader, writer) = std::io::pipe()?;
        Ok((reader.into(), writer.into()))
    }
}
