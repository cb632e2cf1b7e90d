//! jobsh driver: the line loop around the job-control kernel.
//!
//! It handles:
//! - Splitting lines into jobs (`parse`)
//! - Built-ins `fg`, `bg`, `jobs`, `exit` (`builtins`)
//! - Reporting finished and stopped jobs before each prompt
//! - Command history via rustyline

pub mod builtins;
pub mod parse;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;

use jobsh_kernel::{JobControl, ShellConfig};

pub use builtins::Flow;

const DEFAULT_PROMPT: &str = "jobsh$ ";

/// One shell session.
pub struct Shell {
    ctl: JobControl,
    last_status: i32,
}

impl Shell {
    /// Create a session and take the terminal when it is interactive.
    pub fn new(config: ShellConfig) -> Result<Self> {
        let mut ctl = JobControl::unix(config);
        ctl.init_session()
            .context("Failed to initialise job control")?;
        Ok(Self { ctl, last_status: 0 })
    }

    pub fn is_interactive(&self) -> bool {
        self.ctl.is_interactive()
    }

    /// Status of the last job or built-in.
    pub fn last_status(&self) -> i32 {
        self.last_status
    }

    /// Print reports for jobs that finished or stopped since last time.
    pub fn report(&mut self) {
        for notice in self.ctl.poll() {
            eprintln!("{notice}");
        }
    }

    /// Run every job on one line, in order.
    pub fn execute(&mut self, line: &str) -> Flow {
        let jobs = match parse::parse_line(line) {
            Ok(jobs) => jobs,
            Err(err) => {
                eprintln!("jobsh: {err}");
                self.last_status = 2;
                return Flow::Continue(2);
            }
        };

        for spec in jobs {
            if let [stage] = spec.processes.as_slice()
                && builtins::is_builtin(&stage.program)
            {
                match builtins::run(&mut self.ctl, &stage.argv, self.last_status) {
                    Flow::Continue(code) => self.last_status = code,
                    exit @ Flow::Exit(_) => return exit,
                }
                continue;
            }

            let id = self.ctl.submit(spec);
            self.last_status = match self.ctl.launch(id) {
                Ok(outcome) => outcome.code(),
                Err(err) => {
                    eprintln!("jobsh: {err}");
                    1
                }
            };
        }
        Flow::Continue(self.last_status)
    }

    /// Run a script line by line. Returns the exit status.
    pub fn run_script(&mut self, source: &str) -> i32 {
        for (number, line) in source.lines().enumerate() {
            if number == 0 && line.starts_with("#!") {
                continue;
            }
            self.report();
            if let Flow::Exit(code) = self.execute(line) {
                return code;
            }
        }
        self.report();
        self.last_status
    }

    /// Hand the terminal back and restore its settings.
    pub fn shutdown(&mut self) {
        self.ctl.shutdown();
    }
}

/// Prompt string, from `JOBSH_PROMPT` if set.
fn prompt() -> String {
    std::env::var("JOBSH_PROMPT").unwrap_or_else(|_| DEFAULT_PROMPT.to_string())
}

/// The file REPL history persists in between sessions.
struct HistoryFile {
    path: Option<PathBuf>,
}

impl HistoryFile {
    /// `JOBSH_HISTFILE`, or `history.txt` under the user's data directory.
    fn locate() -> Self {
        let path = std::env::var_os("JOBSH_HISTFILE")
            .map(PathBuf::from)
            .or_else(|| directories::BaseDirs::new().map(|b| b.data_dir().join("jobsh").join("history.txt")));
        Self::at(path)
    }

    /// Use `path`, creating its directory now so a failure shows up at
    /// startup rather than on exit.
    fn at(path: Option<PathBuf>) -> Self {
        if let Some(dir) = path.as_deref().and_then(Path::parent)
            && let Err(err) = std::fs::create_dir_all(dir)
        {
            tracing::warn!(dir = %dir.display(), %err, "couldn't create history directory");
        }
        Self { path }
    }

    fn load(&self, rl: &mut Editor<(), DefaultHistory>) {
        let Some(path) = &self.path else {
            return;
        };
        match rl.load_history(path) {
            Ok(()) => {}
            // First run.
            Err(ReadlineError::Io(err)) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(%err, "couldn't load history"),
        }
    }

    fn save(&self, rl: &mut Editor<(), DefaultHistory>) {
        if let Some(path) = &self.path
            && let Err(err) = rl.save_history(path)
        {
            tracing::warn!(path = %path.display(), %err, "couldn't save history");
        }
    }
}

/// Run the interactive loop. Returns the exit status.
pub fn run() -> Result<i32> {
    let mut shell = Shell::new(ShellConfig::repl())?;
    if shell.is_interactive() {
        println!("jobsh v{}", env!("CARGO_PKG_VERSION"));
    }

    let mut rl: Editor<(), DefaultHistory> = Editor::new().context("Failed to create editor")?;
    let history = HistoryFile::locate();
    history.load(&mut rl);

    let prompt = prompt();
    let code = loop {
        shell.report();
        match rl.readline(&prompt) {
            Ok(line) => {
                if !line.trim().is_empty()
                    && let Err(e) = rl.add_history_entry(line.as_str())
                {
                    tracing::warn!("Failed to add history entry: {}", e);
                }
                if let Flow::Exit(code) = shell.execute(&line) {
                    break code;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
            }
            Err(ReadlineError::Eof) => break shell.last_status(),
            Err(err) => {
                eprintln!("Error: {}", err);
                break 1;
            }
        }
    };

    history.save(&mut rl);
    shell.shutdown();
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustyline::history::History;

    fn batch() -> Shell {
        Shell::new(ShellConfig::batch()).unwrap()
    }

    #[test]
    fn parse_errors_set_status_two() {
        let mut shell = batch();
        assert_eq!(shell.execute("echo 'open"), Flow::Continue(2));
        assert_eq!(shell.last_status(), 2);
    }

    #[test]
    fn exit_stops_a_script() {
        let mut shell = batch();
        assert_eq!(shell.run_script("#!/usr/bin/env jobsh\nexit 4\nexit 5\n"), 4);
    }

    #[test]
    fn history_survives_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryFile::at(Some(dir.path().join("state").join("history.txt")));
        assert!(dir.path().join("state").is_dir());

        let mut rl: Editor<(), DefaultHistory> = Editor::new().unwrap();
        rl.add_history_entry("sleep 10 &").unwrap();
        history.save(&mut rl);

        let mut restarted: Editor<(), DefaultHistory> = Editor::new().unwrap();
        history.load(&mut restarted);
        assert_eq!(restarted.history().len(), 1);
    }

    #[test]
    fn missing_history_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryFile::at(Some(dir.path().join("history.txt")));
        let mut rl: Editor<(), DefaultHistory> = Editor::new().unwrap();
        history.load(&mut rl);
        assert_eq!(rl.history().len(), 0);
    }

    #[test]
    fn blank_script_keeps_status() {
        let mut shell = batch();
        assert_eq!(shell.run_script("\n# only a comment\n"), 0);
    }
}
