//! Job and process records, and the two ownership lists.
//!
//! Jobs live in an arena keyed by [`JobId`]. The running and stopped lists
//! are ordered sequences of handles into that arena, so a job can move
//! between them without its record being copied or invalidated.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  Registry                    │
//! │  jobs:    HashMap<JobId, Job>   (arena)      │
//! │  running: [JobId, ...]   head = newest       │
//! │  stopped: [JobId, ...]   head = newest       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! A job belongs to at most one list at a time. The registry does not
//! suppress child-status delivery itself; callers mutate it from inside
//! `JobControl::with_child_status_suppressed`.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use jobsh_types::{JobId, JobInfo, JobMode, JobSpec, JobStatus, OutputRedirect, ProcessSpec};
use nix::sys::termios::Termios;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

/// Which ownership list a job is linked into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Running,
    Stopped,
}

/// One process of a job.
#[derive(Debug, Clone)]
pub struct Process {
    pub program: String,
    pub argv: Vec<String>,
    pub input: Option<PathBuf>,
    pub output: Option<OutputRedirect>,
    /// Unset until spawned.
    pub pid: Option<Pid>,
    /// Last status reported by `wait`.
    pub status: Option<WaitStatus>,
    pub completed: bool,
    pub stopped: bool,
}

impl Process {
    fn from_spec(spec: ProcessSpec) -> Self {
        Self {
            program: spec.program,
            argv: spec.argv,
            input: spec.input,
            output: spec.output,
            pid: None,
            status: None,
            completed: false,
            stopped: false,
        }
    }

    /// Shell-style exit code: the exit status, or 128 + signal number.
    ///
    /// A process that completed without ever reporting (it was never
    /// started) counts as a failure.
    pub fn exit_code(&self) -> Option<i32> {
        if !self.completed {
            return None;
        }
        match self.status {
            Some(WaitStatus::Exited(_, code)) => Some(code),
            Some(WaitStatus::Signaled(_, signal, _)) => Some(128 + signal as i32),
            _ => Some(1),
        }
    }
}

/// A pipeline: processes sharing one process group.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    /// Pipeline order, left-to-right.
    pub processes: Vec<Process>,
    /// Unset until the first process of an interactive job spawns.
    pub pgid: Option<Pid>,
    pub mode: JobMode,
    /// Terminal settings captured when the job last gave up the terminal.
    pub saved_modes: Option<Termios>,
    /// Display text.
    pub command: String,
    /// A stop has been reported for the current stop episode.
    pub notified: bool,
    list: Option<ListKind>,
}

impl Job {
    fn from_spec(id: JobId, spec: JobSpec) -> Self {
        Self {
            id,
            processes: spec.processes.into_iter().map(Process::from_spec).collect(),
            pgid: None,
            mode: spec.mode,
            saved_modes: None,
            command: spec.command,
            notified: false,
            list: None,
        }
    }

    /// Every process has completed.
    pub fn is_completed(&self) -> bool {
        self.processes.iter().all(|p| p.completed)
    }

    /// Every process has completed or stopped, and at least one stopped.
    pub fn is_stopped(&self) -> bool {
        self.processes.iter().all(|p| p.completed || p.stopped) && !self.is_completed()
    }

    /// The list this job is currently linked into.
    pub fn list(&self) -> Option<ListKind> {
        self.list
    }

    /// Exit code of the last process, once the whole job has completed.
    pub fn exit_code(&self) -> Option<i32> {
        if !self.is_completed() {
            return None;
        }
        Some(self.processes.last().and_then(Process::exit_code).unwrap_or(0))
    }

    pub fn status(&self) -> JobStatus {
        match self.exit_code() {
            Some(0) => JobStatus::Done,
            Some(_) => JobStatus::Failed,
            None if self.is_stopped() => JobStatus::Stopped,
            None => JobStatus::Running,
        }
    }

    pub fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            pgid: self.pgid.map(Pid::as_raw),
            command: self.command.clone(),
            status: self.status(),
        }
    }
}

/// Arena of jobs plus the running and stopped lists.
#[derive(Debug, Default)]
pub struct Registry {
    next_id: u64,
    jobs: HashMap<JobId, Job>,
    running: VecDeque<JobId>,
    stopped: VecDeque<JobId>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Take ownership of a parsed job. It is not linked into any list yet.
    pub fn adopt(&mut self, spec: JobSpec) -> JobId {
        let id = JobId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        self.jobs.insert(id, Job::from_spec(id, spec));
        id
    }

    fn list_mut(&mut self, list: ListKind) -> &mut VecDeque<JobId> {
        match list {
            ListKind::Running => &mut self.running,
            ListKind::Stopped => &mut self.stopped,
        }
    }

    /// Push a job onto the head of `list`.
    ///
    /// A job already linked elsewhere is unlinked first, so membership stays
    /// exclusive. Returns false for an unknown handle.
    pub fn insert(&mut self, list: ListKind, id: JobId) -> bool {
        let Some(current) = self.jobs.get(&id).map(|job| job.list) else {
            return false;
        };
        if current == Some(list) {
            return true;
        }
        if let Some(current) = current {
            self.unlink(current, id);
        }
        self.list_mut(list).push_front(id);
        if let Some(job) = self.jobs.get_mut(&id) {
            job.list = Some(list);
        }
        true
    }

    /// Remove a job from `list` without destroying it. Order of the
    /// remaining jobs is preserved. Returns false if it wasn't there.
    pub fn unlink(&mut self, list: ListKind, id: JobId) -> bool {
        let entries = self.list_mut(list);
        let Some(index) = entries.iter().position(|j| *j == id) else {
            return false;
        };
        entries.remove(index);
        if let Some(job) = self.jobs.get_mut(&id) {
            job.list = None;
        }
        true
    }

    /// Unlink a job from `list` and destroy it, returning the record.
    pub fn delete(&mut self, list: ListKind, id: JobId) -> Option<Job> {
        if self.unlink(list, id) {
            self.jobs.remove(&id)
        } else {
            None
        }
    }

    /// First running job whose process group is `pgid`.
    pub fn find(&self, pgid: Pid) -> Option<JobId> {
        self.find_in(&self.running, pgid)
    }

    /// First stopped job whose process group is `pgid`.
    pub fn find_stopped(&self, pgid: Pid) -> Option<JobId> {
        self.find_in(&self.stopped, pgid)
    }

    fn find_in(&self, list: &VecDeque<JobId>, pgid: Pid) -> Option<JobId> {
        list.iter()
            .copied()
            .find(|id| self.jobs.get(id).and_then(|job| job.pgid) == Some(pgid))
    }

    /// Most recently stopped job.
    pub fn last_stopped(&self) -> Option<JobId> {
        self.stopped.front().copied()
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.get_mut(&id)
    }

    /// Handles in the running list, head first.
    pub fn running_ids(&self) -> Vec<JobId> {
        self.running.iter().copied().collect()
    }

    /// Handles in the stopped list, head first.
    pub fn stopped_ids(&self) -> Vec<JobId> {
        self.stopped.iter().copied().collect()
    }

    pub fn running(&self) -> impl Iterator<Item = &Job> {
        self.running.iter().filter_map(|id| self.jobs.get(id))
    }

    pub fn stopped(&self) -> impl Iterator<Item = &Job> {
        self.stopped.iter().filter_map(|id| self.jobs.get(id))
    }

    /// Process with this pid in any running job.
    pub fn running_process_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        let id = self.running.iter().copied().find(|id| {
            self.jobs
                .get(id)
                .is_some_and(|job| job.processes.iter().any(|p| p.pid == Some(pid)))
        })?;
        self.jobs
            .get_mut(&id)?
            .processes
            .iter_mut()
            .find(|p| p.pid == Some(pid))
    }

    /// Number of jobs in the arena.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Every job is linked into exactly one list, once, and every linked
    /// handle resolves. Holds after every completed transition.
    pub fn is_consistent(&self) -> bool {
        let linked = |list: &VecDeque<JobId>, kind: ListKind| {
            list.iter()
                .all(|id| self.jobs.get(id).is_some_and(|job| job.list == Some(kind)))
        };
        let mut seen: Vec<JobId> = self.running.iter().chain(self.stopped.iter()).copied().collect();
        seen.sort();
        seen.dedup();
        linked(&self.running, ListKind::Running)
            && linked(&self.stopped, ListKind::Stopped)
            && seen.len() == self.running.len() + self.stopped.len()
            && seen.len() == self.jobs.len()
    }
}
