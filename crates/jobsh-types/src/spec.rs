//! Parsed job descriptions handed to the kernel.
//!
//! A [`JobSpec`] is what a command-line parser produces: an ordered list of
//! processes (left-to-right is stdin → stdout flow), each with optional
//! redirections, plus the requested [`JobMode`].

use std::path::PathBuf;

use crate::job::JobMode;

/// How an output redirection opens its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// `>`: create the file if needed and truncate it.
    #[default]
    Truncate,
    /// `>>`: append to an existing file.
    Append,
}

/// Output redirection target of a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRedirect {
    pub path: PathBuf,
    pub mode: OutputMode,
}

/// One stage of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Program to run, resolved through `PATH` when it has no slash.
    pub program: String,
    /// Full argument vector, `argv[0]` included.
    pub argv: Vec<String>,
    /// `< path`
    pub input: Option<PathBuf>,
    /// `> path` or `>> path`
    pub output: Option<OutputRedirect>,
}

impl ProcessSpec {
    /// Create a stage running `program` with `argv[0]` set to the program name.
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        Self {
            argv: vec![program.clone()],
            program,
            input: None,
            output: None,
        }
    }

    /// Create a stage from a full argument vector. Returns `None` when empty.
    pub fn from_argv(argv: Vec<String>) -> Option<Self> {
        let program = argv.first()?.clone();
        Some(Self {
            program,
            argv,
            input: None,
            output: None,
        })
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// Read standard input from `path`.
    pub fn stdin_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.input = Some(path.into());
        self
    }

    /// Write standard output to `path`.
    pub fn stdout_to(mut self, path: impl Into<PathBuf>, mode: OutputMode) -> Self {
        self.output = Some(OutputRedirect {
            path: path.into(),
            mode,
        });
        self
    }
}

/// A parsed pipeline ready to be submitted to the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub processes: Vec<ProcessSpec>,
    pub mode: JobMode,
    /// Display text, usually the source the job was parsed from.
    pub command: String,
}

impl JobSpec {
    /// Create a job; the display text is derived from the argument vectors.
    pub fn new(processes: Vec<ProcessSpec>, mode: JobMode) -> Self {
        let command = processes
            .iter()
            .map(|p| p.argv.join(" "))
            .collect::<Vec<_>>()
            .join(" | ");
        Self {
            processes,
            mode,
            command,
        }
    }

    /// A foreground job.
    pub fn foreground(processes: Vec<ProcessSpec>) -> Self {
        Self::new(processes, JobMode::Foreground)
    }

    /// A background job.
    pub fn background(processes: Vec<ProcessSpec>) -> Self {
        Self::new(processes, JobMode::Background)
    }

    /// Replace the display text.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }
}
