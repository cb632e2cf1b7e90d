//! Error types for the job-control kernel.

use std::path::PathBuf;

use jobsh_types::JobId;
use nix::errno::Errno;
use thiserror::Error;

/// Failure to establish the shell's session. Fatal to the program.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("couldn't read the terminal's foreground group: {0}")]
    ForegroundQuery(#[source] Errno),
    #[error("couldn't signal the shell's process group: {0}")]
    Signal(#[source] Errno),
    #[error("couldn't ignore job-control signals: {0}")]
    Dispositions(#[source] Errno),
    #[error("couldn't install the child-status trigger: {0}")]
    Trigger(#[source] std::io::Error),
    #[error("couldn't put the shell in its own process group: {0}")]
    ProcessGroup(#[source] Errno),
    #[error("couldn't take control of the terminal: {0}")]
    ClaimTerminal(#[source] Errno),
    #[error("couldn't read terminal attributes: {0}")]
    Modes(#[source] Errno),
}

/// Failure while realising a job as live processes.
///
/// By the time one of these is returned, processes that were already
/// started keep running and the rest of the job has been abandoned.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("no such job: {0}")]
    UnknownJob(JobId),
    #[error("pipe: {0}")]
    Pipe(#[source] std::io::Error),
    #[error("{}: {source}", .path.display())]
    InputRedirect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", .path.display())]
    OutputRedirect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{program}: argument contains a NUL byte")]
    InvalidArgument { program: String },
    #[error("fork ({program}): {source}")]
    Spawn {
        program: String,
        #[source]
        source: Errno,
    },
}

/// Failure to resume a job.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("no such job: {0}")]
    UnknownJob(JobId),
    #[error("job {0} is not stopped")]
    NotStopped(JobId),
    /// The job's process group no longer exists.
    #[error("job {0} no longer exists")]
    Vanished(JobId),
}
