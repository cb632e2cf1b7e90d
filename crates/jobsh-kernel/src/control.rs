//! The job-control context.
//!
//! One [`JobControl`] owns the registry, the session's terminal state, the
//! child-status trigger and the platform handle. It is built once at session
//! start and torn down with [`JobControl::shutdown`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use jobsh_types::{JobId, JobInfo, JobSpec};
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::config::{Interactivity, ShellConfig};
use crate::notify::Notice;
use crate::os::{Os, UnixOs};
use crate::registry::{Job, ListKind, Registry};
use crate::terminal::Session;

/// How a launched or resumed job left the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Every process finished; the job has been destroyed.
    Completed { code: i32 },
    /// The job stopped and now sits in the stopped registry.
    Stopped,
    /// The job keeps running without the terminal.
    Background,
}

impl JobOutcome {
    /// Exit code the driver should record as the last status.
    pub fn code(&self) -> i32 {
        match self {
            JobOutcome::Completed { code } => *code,
            JobOutcome::Stopped => 148,
            JobOutcome::Background => 0,
        }
    }
}

/// Job-control state for one shell session.
pub struct JobControl {
    pub(crate) config: ShellConfig,
    pub(crate) os: Box<dyn Os>,
    pub(crate) registry: Registry,
    pub(crate) session: Session,
    pub(crate) trigger: Arc<AtomicBool>,
    suppress_depth: usize,
    /// Stop reports produced outside a notification pass.
    pub(crate) pending: VecDeque<Notice>,
}

impl std::fmt::Debug for JobControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobControl")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl JobControl {
    /// Create a context over `os`. Call [`init_session`](Self::init_session)
    /// before launching anything on an interactive session.
    pub fn new(config: ShellConfig, os: impl Os + 'static) -> Self {
        let interactive = match config.interactive {
            Interactivity::Detect => os.is_terminal(config.terminal_fd),
            Interactivity::Forced(interactive) => interactive,
        };
        let session = Session::new(interactive, config.terminal_fd, os.process_group());
        debug!(name = %config.name, interactive, "job control context created");
        Self {
            config,
            os: Box::new(os),
            registry: Registry::new(),
            session,
            trigger: Arc::new(AtomicBool::new(false)),
            suppress_depth: 0,
            pending: VecDeque::new(),
        }
    }

    /// Create a context over the host operating system.
    pub fn unix(config: ShellConfig) -> Self {
        Self::new(config, UnixOs::new())
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn is_interactive(&self) -> bool {
        self.session.interactive
    }

    /// Process group the shell runs in.
    pub fn shell_pgid(&self) -> Pid {
        self.session.shell_pgid
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.registry.get(id)
    }

    /// Run `f` with child-status delivery blocked.
    ///
    /// Scopes nest; only the outermost one toggles the platform mask.
    pub fn with_child_status_suppressed<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.suppress_depth += 1;
        if self.suppress_depth == 1
            && let Err(err) = self.os.suppress_child_status(true)
        {
            warn!(%err, "couldn't block child-status delivery");
        }
        let result = f(self);
        self.suppress_depth -= 1;
        if self.suppress_depth == 0
            && let Err(err) = self.os.suppress_child_status(false)
        {
            warn!(%err, "couldn't unblock child-status delivery");
        }
        result
    }

    /// Take ownership of a parsed job and link it at the head of the
    /// running registry, ready to launch.
    pub fn submit(&mut self, spec: JobSpec) -> JobId {
        self.with_child_status_suppressed(|ctl| {
            let id = ctl.registry.adopt(spec);
            ctl.registry.insert(ListKind::Running, id);
            debug!(job = %id, "submitted");
            id
        })
    }

    /// Running job whose process group is `pgid`.
    pub fn find(&self, pgid: Pid) -> Option<JobId> {
        self.registry.find(pgid)
    }

    /// Stopped job whose process group is `pgid`.
    pub fn find_stopped(&self, pgid: Pid) -> Option<JobId> {
        self.registry.find_stopped(pgid)
    }

    /// Most recently stopped job.
    pub fn last_stopped(&self) -> Option<JobId> {
        self.registry.last_stopped()
    }

    /// Every live job: running ones first, then stopped, newest first.
    pub fn jobs(&self) -> Vec<JobInfo> {
        self.registry
            .running()
            .chain(self.registry.stopped())
            .map(Job::info)
            .collect()
    }

    /// Give the terminal back to the shell and restore its settings.
    pub fn shutdown(&mut self) {
        if !self.session.interactive {
            return;
        }
        self.reclaim_terminal();
        debug!(jobs = self.registry.len(), "session shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os::testing::{Call, MockOs};
    use jobsh_types::ProcessSpec;

    fn control(os: &MockOs) -> JobControl {
        JobControl::new(ShellConfig::repl(), os.clone())
    }

    #[test]
    fn detects_interactivity_from_terminal() {
        assert!(control(&MockOs::new()).is_interactive());
        assert!(!control(&MockOs::without_tty()).is_interactive());
        let forced = JobControl::new(ShellConfig::batch(), MockOs::new());
        assert!(!forced.is_interactive());
    }

    #[test]
    fn config_overrides_terminal_and_detection() {
        let config = ShellConfig::repl().with_terminal(7).with_interactive(true);
        let ctl = JobControl::new(config, MockOs::without_tty());
        assert!(ctl.is_interactive());
        assert_eq!(ctl.session.terminal, 7);
        assert_eq!(ctl.config().terminal_fd, 7);

        let quiet = JobControl::new(ShellConfig::repl().with_interactive(false), MockOs::new());
        assert!(!quiet.is_interactive());
    }

    #[test]
    fn submit_links_newest_first() {
        let os = MockOs::new();
        let mut ctl = control(&os);
        let a = ctl.submit(JobSpec::foreground(vec![ProcessSpec::new("a")]));
        let b = ctl.submit(JobSpec::background(vec![ProcessSpec::new("b")]));

        assert_eq!(ctl.registry().running_ids(), vec![b, a]);
        assert!(ctl.registry().is_consistent());
        assert_eq!(ctl.jobs().len(), 2);
        assert_eq!(ctl.jobs()[0].command, "b");
    }

    #[test]
    fn suppression_nests_and_balances() {
        let os = MockOs::new();
        let mut ctl = control(&os);
        ctl.with_child_status_suppressed(|ctl| {
            ctl.with_child_status_suppressed(|_| {
                assert!(os.is_suppressed());
            });
            assert!(os.is_suppressed(), "inner scope must not unblock");
        });
        assert!(!os.is_suppressed());
        assert_eq!(
            os.calls(),
            vec![Call::Suppress(true), Call::Suppress(false)],
            "only the outermost scope touches the mask"
        );
    }

    #[test]
    fn outcome_codes() {
        assert_eq!(JobOutcome::Completed { code: 3 }.code(), 3);
        assert_eq!(JobOutcome::Stopped.code(), 148);
        assert_eq!(JobOutcome::Background.code(), 0);
    }
}
