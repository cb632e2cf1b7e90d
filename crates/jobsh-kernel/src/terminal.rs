//! Terminal controller: foreground ownership and line-discipline handoff.
//!
//! The terminal has a single owner at a time. Every change of owner goes
//! through the methods here; nothing else in the crate calls
//! `set_foreground_group`.

use std::os::fd::RawFd;
use std::sync::Arc;

use jobsh_types::{JobId, JobMode};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::termios::Termios;
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::control::{JobControl, JobOutcome};
use crate::error::{JobError, SessionError};
use crate::notify::Notice;
use crate::registry::ListKind;

/// The shell's own terminal state.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub(crate) interactive: bool,
    pub(crate) terminal: RawFd,
    pub(crate) shell_pgid: Pid,
    /// Restore point taken by `init_session`.
    pub(crate) shell_modes: Option<Termios>,
}

impl Session {
    pub(crate) fn new(interactive: bool, terminal: RawFd, shell_pgid: Pid) -> Self {
        Self {
            interactive,
            terminal,
            shell_pgid,
            shell_modes: None,
        }
    }
}

impl JobControl {
    /// Make the shell the terminal's foreground job-control leader.
    ///
    /// Does nothing on a non-interactive session. Any failure here is
    /// fatal to the shell.
    #[tracing::instrument(level = "info", skip(self), fields(name = %self.config.name))]
    pub fn init_session(&mut self) -> Result<(), SessionError> {
        if !self.session.interactive {
            return Ok(());
        }
        let terminal = self.session.terminal;

        // Wait until we are in the foreground; SIGTTIN stops us until then.
        loop {
            let owner = self
                .os
                .foreground_group(terminal)
                .map_err(SessionError::ForegroundQuery)?;
            let group = self.os.process_group();
            if owner == group {
                break;
            }
            debug!(%owner, %group, "terminal held by another group");
            self.os
                .signal_group(group, Signal::SIGTTIN)
                .map_err(SessionError::Signal)?;
        }

        self.os
            .ignore_job_control_signals()
            .map_err(SessionError::Dispositions)?;
        self.os
            .install_child_status_trigger(Arc::clone(&self.trigger))
            .map_err(SessionError::Trigger)?;

        let pid = self.os.pid();
        if self.os.process_group() != pid {
            self.os
                .set_process_group(pid, pid)
                .map_err(SessionError::ProcessGroup)?;
        }
        self.session.shell_pgid = pid;
        self.os
            .set_foreground_group(terminal, pid)
            .map_err(SessionError::ClaimTerminal)?;
        self.session.shell_modes =
            Some(self.os.terminal_modes(terminal).map_err(SessionError::Modes)?);

        info!(pgid = %pid, "session initialised");
        Ok(())
    }

    /// Give job `id` the terminal and wait for it to stop or finish.
    #[tracing::instrument(level = "debug", skip(self))]
    pub(crate) fn foreground(&mut self, id: JobId, resume: bool) -> Result<JobOutcome, JobError> {
        let job = self.registry.get(id).ok_or(JobError::UnknownJob(id))?;
        let pgid = job.pgid;
        let saved_modes = job.saved_modes.clone();
        let interactive = self.session.interactive;
        let terminal = self.session.terminal;

        if interactive && let Some(pgid) = pgid {
            if let Err(err) = self.os.set_foreground_group(terminal, pgid) {
                warn!(%pgid, %err, "couldn't hand the terminal to the job");
            }
        }
        if resume {
            if interactive
                && let Some(modes) = &saved_modes
                && let Err(err) = self.os.set_terminal_modes(terminal, modes)
            {
                warn!(%err, "couldn't restore the job's terminal settings");
            }
            if let Err(Errno::ESRCH) = self.continue_group(id, pgid) {
                if interactive {
                    self.reclaim_terminal();
                }
                return Err(self.discard_vanished(id));
            }
        }

        self.wait_blocking(id);
        let outcome = self.settle(id);

        if interactive {
            if let Err(err) = self.os.set_foreground_group(terminal, self.session.shell_pgid) {
                warn!(%err, "couldn't take the terminal back");
            }
            if outcome == JobOutcome::Stopped {
                match self.os.terminal_modes(terminal) {
                    Ok(modes) => {
                        if let Some(job) = self.registry.get_mut(id) {
                            job.saved_modes = Some(modes);
                        }
                    }
                    Err(err) => warn!(%err, "couldn't save the job's terminal settings"),
                }
            }
            self.restore_shell_modes();
        }
        Ok(outcome)
    }

    /// Let job `id` run without the terminal. Never blocks.
    #[tracing::instrument(level = "debug", skip(self))]
    pub(crate) fn background(&mut self, id: JobId, resume: bool) -> Result<JobOutcome, JobError> {
        let pgid = self.registry.get(id).ok_or(JobError::UnknownJob(id))?.pgid;
        if resume && let Err(Errno::ESRCH) = self.continue_group(id, pgid) {
            return Err(self.discard_vanished(id));
        }
        Ok(JobOutcome::Background)
    }

    /// Continue a stopped job in the foreground or the background.
    ///
    /// Clears every process's stop flag and the job's `notified` flag and
    /// moves it back to the running registry before continuing it.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn resume(&mut self, id: JobId, to_foreground: bool) -> Result<JobOutcome, JobError> {
        self.with_child_status_suppressed(|ctl| {
            let job = ctl.registry.get_mut(id).ok_or(JobError::UnknownJob(id))?;
            if job.list() != Some(ListKind::Stopped) {
                return Err(JobError::NotStopped(id));
            }
            for process in &mut job.processes {
                process.stopped = false;
            }
            job.notified = false;
            job.mode = if to_foreground {
                JobMode::Foreground
            } else {
                JobMode::Background
            };
            ctl.registry.insert(ListKind::Running, id);

            if to_foreground {
                ctl.foreground(id, true)
            } else {
                ctl.background(id, true)
            }
        })
    }

    /// Apply the registry transition for a job that has just been waited on.
    ///
    /// Completed jobs are destroyed; stopped jobs move to the stopped
    /// registry with their one stop report queued.
    pub(crate) fn settle(&mut self, id: JobId) -> JobOutcome {
        self.with_child_status_suppressed(|ctl| {
            let Some(job) = ctl.registry.get_mut(id) else {
                // Already reaped and destroyed by a notification pass.
                return JobOutcome::Completed { code: 0 };
            };
            if job.is_completed() {
                let code = job.exit_code().unwrap_or(0);
                if let Some(list) = job.list() {
                    ctl.registry.delete(list, id);
                }
                debug!(job = %id, code, "job completed");
                return JobOutcome::Completed { code };
            }
            if job.is_stopped() {
                job.notified = true;
                let notice = Notice::from_job(job);
                ctl.registry.insert(ListKind::Stopped, id);
                ctl.pending.push_back(notice);
                debug!(job = %id, "job stopped");
                return JobOutcome::Stopped;
            }
            JobOutcome::Background
        })
    }

    fn continue_group(&self, id: JobId, pgid: Option<Pid>) -> nix::Result<()> {
        let Some(pgid) = pgid else {
            warn!(job = %id, "job has no process group to continue");
            return Ok(());
        };
        self.os.signal_group(pgid, Signal::SIGCONT).inspect_err(|err| {
            if *err != Errno::ESRCH {
                eprintln!("jobsh: kill (SIGCONT): {err}");
            }
            warn!(%pgid, %err, "couldn't continue job");
        })
    }

    /// Forget a stopped job whose processes died without being reaped as
    /// members of a running job.
    fn discard_vanished(&mut self, id: JobId) -> JobError {
        if let Some(job) = self.registry.get_mut(id) {
            for process in &mut job.processes {
                process.stopped = false;
                process.completed = true;
            }
            if let Some(list) = job.list() {
                self.registry.delete(list, id);
            }
        }
        info!(job = %id, "process group vanished; job discarded");
        JobError::Vanished(id)
    }

    /// Put the terminal back in the shell's hands.
    pub(crate) fn reclaim_terminal(&self) {
        let terminal = self.session.terminal;
        if let Err(err) = self.os.set_foreground_group(terminal, self.session.shell_pgid) {
            warn!(%err, "couldn't take the terminal back");
        }
        self.restore_shell_modes();
    }

    fn restore_shell_modes(&self) {
        if let Some(modes) = &self.session.shell_modes
            && let Err(err) = self.os.set_terminal_modes(self.session.terminal, modes)
        {
            warn!(%err, "couldn't restore the shell's terminal settings");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShellConfig;
    use crate::os::testing::{Call, MockOs, SHELL_PID};
    use jobsh_types::{JobSpec, JobStatus, ProcessSpec};
    use nix::sys::termios::LocalFlags;
    use nix::sys::wait::WaitStatus;

    fn pid(raw: i32) -> Pid {
        Pid::from_raw(raw)
    }

    fn interactive(os: &MockOs) -> JobControl {
        let mut ctl = JobControl::new(ShellConfig::repl(), os.clone());
        ctl.init_session().unwrap();
        os.clear_calls();
        ctl
    }

    /// A submitted job whose single process "runs" as `raw`.
    fn spawned(ctl: &mut JobControl, raw: i32) -> JobId {
        let id = ctl.submit(JobSpec::foreground(vec![ProcessSpec::new("vi")]));
        let job = ctl.registry.get_mut(id).unwrap();
        job.pgid = Some(pid(raw));
        job.processes[0].pid = Some(pid(raw));
        id
    }

    fn stopped_job(ctl: &mut JobControl, os: &MockOs, raw: i32) -> JobId {
        let id = spawned(ctl, raw);
        os.queue_wait(WaitStatus::Stopped(pid(raw), Signal::SIGTSTP));
        assert_eq!(ctl.foreground(id, false), Ok(JobOutcome::Stopped));
        ctl.pending.clear();
        os.clear_calls();
        id
    }

    // ========================================================================
    // Session initialisation
    // ========================================================================

    #[test]
    fn init_session_claims_terminal() {
        let os = MockOs::new();
        let mut ctl = JobControl::new(ShellConfig::repl(), os.clone());
        ctl.init_session().unwrap();

        let calls = os.calls();
        assert!(calls.contains(&Call::IgnoreSignals));
        assert!(calls.contains(&Call::InstallTrigger));
        assert!(calls.contains(&Call::SetForeground(pid(SHELL_PID))));
        assert_eq!(ctl.shell_pgid(), pid(SHELL_PID));
        assert!(ctl.session.shell_modes.is_some());
    }

    #[test]
    fn init_session_waits_for_foreground() {
        // Started as part of group 50 while group 60 holds the terminal.
        let os = MockOs::in_background_group(50, 60);
        let mut ctl = JobControl::new(ShellConfig::repl(), os.clone());
        ctl.init_session().unwrap();

        let calls = os.calls();
        assert_eq!(calls[0], Call::Signal(pid(50), Signal::SIGTTIN));
        assert!(calls.contains(&Call::SetProcessGroup(pid(SHELL_PID), pid(SHELL_PID))));
        assert_eq!(os.foreground(), pid(SHELL_PID));
    }

    #[test]
    fn init_session_is_a_no_op_when_not_interactive() {
        let os = MockOs::without_tty();
        let mut ctl = JobControl::new(ShellConfig::repl(), os.clone());
        ctl.init_session().unwrap();
        assert!(os.calls().is_empty());
    }

    // ========================================================================
    // Foreground
    // ========================================================================

    #[test]
    fn foreground_completion_destroys_job_and_returns_terminal() {
        let os = MockOs::new();
        let mut ctl = interactive(&os);
        let id = spawned(&mut ctl, 1000);
        os.queue_wait(WaitStatus::Exited(pid(1000), 3));

        assert_eq!(ctl.foreground(id, false), Ok(JobOutcome::Completed { code: 3 }));
        assert!(ctl.job(id).is_none());
        assert!(ctl.registry().is_consistent());

        let calls = os.calls();
        let handed = calls.iter().position(|c| *c == Call::SetForeground(pid(1000)));
        let reclaimed = calls.iter().rposition(|c| *c == Call::SetForeground(pid(SHELL_PID)));
        assert!(handed < reclaimed, "terminal goes to the job, then back: {calls:?}");
        assert_eq!(os.foreground(), pid(SHELL_PID));
    }

    #[test]
    fn foreground_stop_moves_job_once_and_saves_modes() {
        let os = MockOs::new();
        let mut ctl = interactive(&os);
        let id = spawned(&mut ctl, 1000);
        os.queue_wait(WaitStatus::Stopped(pid(1000), Signal::SIGTSTP));
        // The job switched the terminal to raw mode before stopping.
        let shell_flags = os.terminal_flags();
        os.alter_terminal_modes(LocalFlags::empty());

        assert_eq!(ctl.foreground(id, false), Ok(JobOutcome::Stopped));
        assert_eq!(ctl.registry().stopped_ids(), vec![id]);
        assert!(ctl.registry().running_ids().is_empty());
        assert!(ctl.job(id).unwrap().notified);
        assert_eq!(
            ctl.job(id).unwrap().saved_modes.as_ref().map(|m| m.local_flags),
            Some(LocalFlags::empty())
        );
        assert_eq!(os.terminal_flags(), shell_flags, "shell settings restored");
        assert_eq!(ctl.pending.len(), 1);
        assert_eq!(ctl.pending[0].status, JobStatus::Stopped);
    }

    // ========================================================================
    // Resume
    // ========================================================================

    #[test]
    fn resume_in_background_continues_without_terminal_or_wait() {
        let os = MockOs::new();
        let mut ctl = interactive(&os);
        let id = stopped_job(&mut ctl, &os, 1000);

        assert_eq!(ctl.resume(id, false), Ok(JobOutcome::Background));
        let calls = os.calls();
        assert!(calls.contains(&Call::Signal(pid(1000), Signal::SIGCONT)));
        assert!(!calls.iter().any(|c| matches!(c, Call::SetForeground(_))));
        assert!(!calls.iter().any(|c| matches!(c, Call::Wait { .. })));

        let job = ctl.job(id).unwrap();
        assert_eq!(job.list(), Some(ListKind::Running));
        assert!(!job.notified);
        assert!(job.processes.iter().all(|p| !p.stopped));
        assert_eq!(job.mode, JobMode::Background);
    }

    #[test]
    fn resume_in_foreground_hands_over_terminal_and_blocks() {
        let os = MockOs::new();
        let mut ctl = interactive(&os);
        let id = stopped_job(&mut ctl, &os, 1000);
        ctl.registry.get_mut(id).unwrap().saved_modes =
            Some(crate::os::testing::modes(LocalFlags::ECHO));
        os.queue_wait(WaitStatus::Exited(pid(1000), 0));

        assert_eq!(ctl.resume(id, true), Ok(JobOutcome::Completed { code: 0 }));
        let calls = os.calls();
        let handed = calls.iter().position(|c| *c == Call::SetForeground(pid(1000))).unwrap();
        let modes = calls.iter().position(|c| *c == Call::SetModes(LocalFlags::ECHO)).unwrap();
        let cont = calls
            .iter()
            .position(|c| *c == Call::Signal(pid(1000), Signal::SIGCONT))
            .unwrap();
        let wait = calls.iter().position(|c| *c == Call::Wait { blocking: true }).unwrap();
        assert!(handed < cont && modes < cont && cont < wait, "{calls:?}");
        assert!(ctl.job(id).is_none());
    }

    #[test]
    fn resume_clears_flags_before_waiting() {
        let os = MockOs::new();
        let mut ctl = interactive(&os);
        let id = stopped_job(&mut ctl, &os, 1000);
        // Stops again immediately: would be invisible if the old flag stayed.
        os.queue_wait(WaitStatus::Stopped(pid(1000), Signal::SIGTTIN));

        assert_eq!(ctl.resume(id, true), Ok(JobOutcome::Stopped));
        assert_eq!(os.count(|c| matches!(c, Call::Wait { blocking: true })), 1);
        assert_eq!(ctl.pending.len(), 1, "a new stop episode is reported again");
    }

    #[test]
    fn resume_rejects_jobs_that_are_not_stopped() {
        let os = MockOs::new();
        let mut ctl = interactive(&os);
        let id = spawned(&mut ctl, 1000);
        assert_eq!(ctl.resume(id, false), Err(JobError::NotStopped(id)));
        assert_eq!(ctl.resume(JobId(999), false), Err(JobError::UnknownJob(JobId(999))));
    }

    #[test]
    fn resume_discards_a_job_killed_while_stopped() {
        let os = MockOs::new();
        let mut ctl = interactive(&os);
        let id = stopped_job(&mut ctl, &os, 1000);
        os.alter_terminal_modes(LocalFlags::empty());
        os.kill_group(1000);

        assert_eq!(ctl.resume(id, true), Err(JobError::Vanished(id)));
        assert!(ctl.job(id).is_none());
        assert!(ctl.jobs().is_empty());
        assert!(ctl.registry().is_consistent());
        assert_eq!(os.count(|c| matches!(c, Call::Wait { .. })), 0);
        assert_eq!(os.foreground(), pid(SHELL_PID));
        assert_eq!(os.terminal_flags(), LocalFlags::ICANON | LocalFlags::ECHO);
    }

    #[test]
    fn bg_on_a_vanished_group_discards_the_job() {
        let os = MockOs::new();
        let mut ctl = interactive(&os);
        let id = stopped_job(&mut ctl, &os, 1000);
        os.kill_group(1000);

        assert_eq!(ctl.resume(id, false), Err(JobError::Vanished(id)));
        assert!(ctl.job(id).is_none());
        assert_eq!(ctl.last_stopped(), None);
        assert!(ctl.registry().is_consistent());
    }

    #[test]
    fn shutdown_returns_terminal_to_shell() {
        let os = MockOs::new();
        let mut ctl = interactive(&os);
        os.alter_terminal_modes(LocalFlags::empty());
        ctl.shutdown();
        assert_eq!(os.foreground(), pid(SHELL_PID));
        assert_eq!(os.terminal_flags(), LocalFlags::ICANON | LocalFlags::ECHO);
    }
}
