//! Pipeline executor: realise a job as live processes.
//!
//! ```text
//!   stdin ──▶ [ p0 ] ──pipe──▶ [ p1 ] ──pipe──▶ [ p2 ] ──▶ stdout
//!              │                 │                 │
//!              └──── one process group (leader = p0) ┘
//! ```
//!
//! `<` and `>`/`>>` replace a stage's input or output endpoint. The parent
//! holds every descriptor it opens as an [`OwnedFd`] so each one is closed as
//! soon as its stage has been spawned, or when a stage fails to start.

use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use jobsh_types::{JobId, JobMode};
use nix::libc::{STDIN_FILENO, STDOUT_FILENO};
use tracing::{debug, warn};

use crate::control::{JobControl, JobOutcome};
use crate::error::LaunchError;
use crate::os::SpawnRequest;

/// One side of a stage's standard stream.
#[derive(Debug)]
enum Endpoint {
    /// The shell's own stream.
    Inherit,
    Owned(OwnedFd),
}

impl Endpoint {
    fn raw_or(&self, standard: RawFd) -> RawFd {
        match self {
            Endpoint::Inherit => standard,
            Endpoint::Owned(fd) => fd.as_raw_fd(),
        }
    }
}

/// A stage's program and arguments, ready for exec.
struct Prepared {
    program: CString,
    argv: Vec<CString>,
}

fn prepare(program: &str, argv: &[String]) -> Result<Prepared, LaunchError> {
    let invalid = |_| LaunchError::InvalidArgument {
        program: program.to_string(),
    };
    Ok(Prepared {
        program: CString::new(program).map_err(invalid)?,
        argv: argv
            .iter()
            .map(|a| CString::new(a.as_str()))
            .collect::<Result<_, _>>()
            .map_err(invalid)?,
    })
}

impl JobControl {
    /// Start every process of job `id` and, for foreground jobs, wait.
    ///
    /// Non-interactive sessions wait for every job. If a redirection cannot
    /// be opened, stages already started keep running, the rest of the job
    /// is abandoned, and the error is returned.
    #[tracing::instrument(level = "info", skip(self), fields(command = tracing::field::Empty))]
    pub fn launch(&mut self, id: JobId) -> Result<JobOutcome, LaunchError> {
        let job = self.registry.get(id).ok_or(LaunchError::UnknownJob(id))?;
        let mode = job.mode;
        tracing::Span::current().record("command", job.command.as_str());

        self.with_child_status_suppressed(|ctl| {
            if let Err(err) = ctl.spawn_pipeline(id) {
                warn!(job = %id, %err, "launch aborted");
                return Err(err);
            }
            if !ctl.session.interactive {
                ctl.wait_blocking(id);
                return Ok(ctl.settle(id));
            }
            let outcome = match mode {
                JobMode::Foreground => ctl.foreground(id, false),
                JobMode::Background => ctl.background(id, false),
            };
            outcome.map_err(|_| LaunchError::UnknownJob(id))
        })
    }

    /// Launch jobs one after another. A failure doesn't stop the rest.
    pub fn launch_all(&mut self, ids: &[JobId]) -> Vec<Result<JobOutcome, LaunchError>> {
        ids.iter().map(|id| self.launch(*id)).collect()
    }

    fn spawn_pipeline(&mut self, id: JobId) -> Result<(), LaunchError> {
        let count = self
            .registry
            .get(id)
            .ok_or(LaunchError::UnknownJob(id))?
            .processes
            .len();
        let mut infile = Endpoint::Inherit;
        for index in 0..count {
            if let Err(err) = self.spawn_stage(id, index, &mut infile) {
                self.abandon_unstarted(id, index);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Spawn stage `index`, reading from `infile`. On success `infile`
    /// becomes the read end of the pipe to the next stage.
    fn spawn_stage(&mut self, id: JobId, index: usize, infile: &mut Endpoint) -> Result<(), LaunchError> {
        let job = self.registry.get(id).ok_or(LaunchError::UnknownJob(id))?;
        let process = job.processes.get(index).ok_or(LaunchError::UnknownJob(id))?;
        let has_successor = index + 1 < job.processes.len();
        let foreground = job.mode == JobMode::Foreground;
        let pgid = job.pgid;
        let name = process.program.clone();
        let input = process.input.clone();
        let output = process.output.clone();
        let prepared = prepare(&process.program, &process.argv)?;

        let (next_in, mut outfile) = if has_successor {
            let (reader, writer) = self.os.pipe().map_err(LaunchError::Pipe)?;
            (Endpoint::Owned(reader), Endpoint::Owned(writer))
        } else {
            (Endpoint::Inherit, Endpoint::Inherit)
        };
        if let Some(path) = input {
            let fd = self
                .os
                .open_input(&path)
                .map_err(|source| LaunchError::InputRedirect { path, source })?;
            *infile = Endpoint::Owned(fd);
        }
        if let Some(redirect) = output {
            let fd = self
                .os
                .open_output(&redirect.path, redirect.mode, self.config.redirect_mode)
                .map_err(|source| LaunchError::OutputRedirect {
                    path: redirect.path,
                    source,
                })?;
            outfile = Endpoint::Owned(fd);
        }

        let interactive = self.session.interactive;
        let request = SpawnRequest {
            program: &prepared.program,
            argv: &prepared.argv,
            pgid,
            job_control: interactive,
            foreground: interactive && foreground,
            terminal: self.session.terminal,
            stdin: infile.raw_or(STDIN_FILENO),
            stdout: outfile.raw_or(STDOUT_FILENO),
        };
        let pid = self
            .os
            .spawn(&request)
            .map_err(|source| LaunchError::Spawn {
                program: name.clone(),
                source,
            })?;
        debug!(job = %id, %pid, program = %name, "spawned");

        let job = self.registry.get_mut(id).ok_or(LaunchError::UnknownJob(id))?;
        if let Some(process) = job.processes.get_mut(index) {
            process.pid = Some(pid);
        }
        if interactive {
            let group = *job.pgid.get_or_insert(pid);
            // Fails harmlessly once the child has already exec'd.
            if let Err(err) = self.os.set_process_group(pid, group) {
                debug!(%pid, %group, %err, "setpgid from parent");
            }
        }

        // Our copies of this stage's descriptors close here.
        *infile = next_in;
        drop(outfile);
        Ok(())
    }

    /// Mark stages from `first` on as completed without running them.
    fn abandon_unstarted(&mut self, id: JobId, first: usize) {
        let interactive = self.session.interactive;
        if let Some(job) = self.registry.get_mut(id) {
            for process in job.processes.iter_mut().skip(first) {
                process.completed = true;
            }
            if job.is_completed()
                && let Some(list) = job.list()
            {
                self.registry.delete(list, id);
            }
        }
        // An earlier stage may already own the terminal.
        if interactive {
            self.reclaim_terminal();
        }
    }
}
