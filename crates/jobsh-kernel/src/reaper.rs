//! Status reaper: turns wait results into process record updates.

use jobsh_types::JobId;
use nix::errno::Errno;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::control::JobControl;

/// Result of feeding one wait report to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaped {
    /// A process record was updated.
    Updated(Pid),
    /// The pid belongs to no running job. Reported; reaping continues.
    Unknown(Pid),
    /// Nothing to report: no child ready, or no children at all.
    Idle,
    /// Wait failed. Reported; this reap pass ends.
    Failed(Errno),
}

impl JobControl {
    /// Record one wait result on the process it names.
    ///
    /// Stops set `stopped`; exits and signal deaths set `completed`, with a
    /// diagnostic for the latter.
    pub fn mark_status(&mut self, result: nix::Result<WaitStatus>) -> Reaped {
        let status = match result {
            Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => return Reaped::Idle,
            Err(errno) => {
                eprintln!("jobsh: waitpid: {errno}");
                warn!(%errno, "wait failed");
                return Reaped::Failed(errno);
            }
            Ok(status) => status,
        };
        let Some(pid) = status.pid().filter(|pid| pid.as_raw() > 0) else {
            return Reaped::Idle;
        };

        let Some(process) = self.registry.running_process_mut(pid) else {
            eprintln!("jobsh: no child process {pid}");
            warn!(%pid, ?status, "status for unknown pid");
            return Reaped::Unknown(pid);
        };
        match status {
            WaitStatus::Exited(..) => process.completed = true,
            WaitStatus::Signaled(_, signal, _) => {
                process.completed = true;
                eprintln!("{pid}: Terminated by signal {}.", signal as i32);
            }
            WaitStatus::Continued(_) => process.stopped = false,
            _ => process.stopped = true,
        }
        process.status = Some(status);
        debug!(%pid, ?status, "status recorded");
        Reaped::Updated(pid)
    }

    /// Collect every status change that is ready now, without blocking.
    /// Returns how many process records changed.
    pub fn drain_nonblocking(&mut self) -> usize {
        let mut updated = 0;
        loop {
            let result = self.os.wait_any(false);
            match self.mark_status(result) {
                Reaped::Updated(_) => updated += 1,
                Reaped::Unknown(_) => {}
                Reaped::Idle | Reaped::Failed(_) => return updated,
            }
        }
    }

    /// Block until job `id` has stopped or completed.
    ///
    /// Any child may be reaped along the way; updates to other jobs are
    /// recorded and left for the next notification pass.
    pub fn wait_blocking(&mut self, id: JobId) {
        loop {
            match self.registry.get(id) {
                Some(job) if !job.is_stopped() && !job.is_completed() => {}
                _ => return,
            }
            let result = self.os.wait_any(true);
            if let Reaped::Idle | Reaped::Failed(_) = self.mark_status(result) {
                return;
            }
        }
    }
}
