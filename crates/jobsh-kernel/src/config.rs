//! Session configuration.

use std::os::fd::RawFd;

use nix::libc::STDIN_FILENO;

/// How the kernel decides whether the session is interactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interactivity {
    /// Interactive when the terminal descriptor refers to a tty.
    Detect,
    /// Override detection.
    Forced(bool),
}

/// Configuration for a job-control session.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Session name (for diagnostics and logs).
    pub name: String,

    /// Descriptor of the controlling terminal. Defaults to standard input.
    pub terminal_fd: RawFd,

    /// Whether the shell does job control at all.
    ///
    /// Non-interactive sessions never touch the terminal, never create
    /// process groups, and wait for every job to finish.
    pub interactive: Interactivity,

    /// Permission bits for files created by `>` redirection.
    pub redirect_mode: u32,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            terminal_fd: STDIN_FILENO,
            interactive: Interactivity::Detect,
            redirect_mode: 0o664,
        }
    }
}

impl ShellConfig {
    /// Create a REPL config: job control when standard input is a tty.
    pub fn repl() -> Self {
        Self {
            name: "repl".to_string(),
            ..Self::default()
        }
    }

    /// Create a batch config for `-c` and scripts: never interactive.
    pub fn batch() -> Self {
        Self {
            name: "batch".to_string(),
            interactive: Interactivity::Forced(false),
            ..Self::default()
        }
    }

    /// Set the session name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Use a different terminal descriptor.
    pub fn with_terminal(mut self, fd: RawFd) -> Self {
        self.terminal_fd = fd;
        self
    }

    /// Force interactive (or non-interactive) mode.
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = Interactivity::Forced(interactive);
        self
    }

    /// Set permission bits for created output files.
    pub fn with_redirect_mode(mut self, mode: u32) -> Self {
        self.redirect_mode = mode;
        self
    }
}
