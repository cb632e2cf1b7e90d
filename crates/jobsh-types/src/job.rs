//! Job identification and status types.

/// Stable handle for a job tracked by the kernel.
///
/// Handles are never reused within a session, so a stale handle simply
/// resolves to nothing once its job has been reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Requested execution mode of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobMode {
    /// Owns the terminal and blocks the driver until it stops or completes.
    #[default]
    Foreground,
    /// Runs without the terminal; the driver continues immediately.
    Background,
}

/// Status of a job as seen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// At least one process is still running.
    Running,
    /// Every live process was stopped by a signal (e.g., Ctrl-Z / SIGTSTP).
    Stopped,
    /// Every process completed and the last one exited with status 0.
    Done,
    /// Every process completed and the last one failed or was killed.
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Stopped => write!(f, "Stopped"),
            JobStatus::Done => write!(f, "Done"),
            JobStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Information about a job for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    /// Job ID.
    pub id: JobId,
    /// Process group, once the first process has been spawned.
    pub pgid: Option<i32>,
    /// Command description.
    pub command: String,
    /// Current status.
    pub status: JobStatus,
}

impl std::fmt::Display for JobInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.pgid.unwrap_or(0), self.status, self.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_renders_pgid_status_and_command() {
        let info = JobInfo {
            id: JobId(3),
            pgid: Some(4242),
            command: "sleep 10 | cat".to_string(),
            status: JobStatus::Stopped,
        };
        assert_eq!(info.to_string(), "4242 (Stopped): sleep 10 | cat");
    }

    #[test]
    fn info_without_group_renders_zero() {
        let info = JobInfo {
            id: JobId(1),
            pgid: None,
            command: "true".to_string(),
            status: JobStatus::Running,
        };
        assert_eq!(info.to_string(), "0 (Running): true");
    }
}
