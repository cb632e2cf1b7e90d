//! Notification: report finished and stopped jobs, once each.

use std::sync::atomic::Ordering;

use jobsh_types::{JobId, JobStatus};
use nix::unistd::Pid;

use crate::control::JobControl;
use crate::registry::{Job, ListKind};

/// One report about a job changing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub job: JobId,
    pub pgid: Option<Pid>,
    pub command: String,
    pub status: JobStatus,
}

impl Notice {
    pub(crate) fn from_job(job: &Job) -> Self {
        Self {
            job: job.id,
            pgid: job.pgid,
            command: job.command.clone(),
            status: job.status(),
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pgid = self.pgid.map(Pid::as_raw).unwrap_or(0);
        write!(f, "{} ({}): {}", pgid, self.status, self.command)
    }
}

impl JobControl {
    /// Bring the registry up to date and report what changed.
    ///
    /// Completed jobs are reported and destroyed. Newly stopped jobs are
    /// reported, flagged `notified`, and moved to the stopped registry.
    /// Reports queued by a foreground wait come first.
    pub fn notify_pass(&mut self) -> Vec<Notice> {
        self.with_child_status_suppressed(|ctl| {
            ctl.drain_nonblocking();
            let mut notices: Vec<Notice> = ctl.pending.drain(..).collect();

            for id in ctl.registry.running_ids() {
                let Some(job) = ctl.registry.get_mut(id) else {
                    continue;
                };
                if job.is_completed() {
                    notices.push(Notice::from_job(job));
                    ctl.registry.delete(ListKind::Running, id);
                } else if job.is_stopped() && !job.notified {
                    job.notified = true;
                    notices.push(Notice::from_job(job));
                    ctl.registry.insert(ListKind::Stopped, id);
                }
            }
            notices
        })
    }

    /// Run a notification pass if a child changed status since the last one
    /// (or a report is already queued). Call at the top of the driver loop.
    pub fn poll(&mut self) -> Vec<Notice> {
        let due = self.trigger.swap(false, Ordering::SeqCst);
        if due || !self.pending.is_empty() {
            self.notify_pass()
        } else {
            Vec::new()
        }
    }
}
