//! jobsh CLI entry point.
//!
//! Usage:
//!   jobsh                      # Interactive shell
//!   jobsh -c <command>         # Execute command and exit
//!   jobsh script.sh            # Run a script

use std::env;
use std::process::ExitCode;

use anyhow::{Context, Result};
use jobsh_kernel::ShellConfig;
use jobsh_repl::{Flow, Shell};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var); stdout belongs to jobs
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("jobsh: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn exit_code(status: i32) -> ExitCode {
    ExitCode::from((status & 0xff) as u8)
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        None => Ok(exit_code(jobsh_repl::run()?)),

        Some("--help" | "-h") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!(
                "jobsh {} ({} {})",
                env!("CARGO_PKG_VERSION"),
                env!("JOBSH_GIT_HASH"),
                env!("JOBSH_BUILD_DATE")
            );
            Ok(ExitCode::SUCCESS)
        }

        Some("-c") => {
            let cmd = args.get(2).context("-c requires a command argument")?;
            run_command(cmd)
        }

        Some(path) if !path.starts_with('-') => run_script(path),

        Some(unknown) => {
            eprintln!("Unknown option: {unknown}");
            eprintln!("Run 'jobsh --help' for usage.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_help() {
    println!(
        r#"jobsh v{}

Usage:
  jobsh                        Interactive shell with job control
  jobsh -c <command>           Execute command line and exit
  jobsh <script>               Run a script file

Options:
  -c <command>                 Execute command string and exit
  -h, --help                   Show this help
  -V, --version                Show version

Built-ins:
  fg [pgid]                    Resume a stopped job in the foreground
  bg [pgid]                    Resume a stopped job in the background
  jobs                         List jobs
  exit [code]                  Leave the shell

Environment:
  JOBSH_PROMPT                 Prompt string (default: "jobsh$ ")
  JOBSH_HISTFILE               History file (default: <data dir>/jobsh/history.txt)
  RUST_LOG                     Log filter, e.g. RUST_LOG=jobsh_kernel=debug
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Execute a command line and exit.
fn run_command(cmd: &str) -> Result<ExitCode> {
    let mut shell = Shell::new(ShellConfig::batch().with_name("command"))?;
    let code = match shell.execute(cmd) {
        Flow::Exit(code) => code,
        Flow::Continue(_) => {
            shell.report();
            shell.last_status()
        }
    };
    Ok(exit_code(code))
}

/// Run a script file.
fn run_script(path: &str) -> Result<ExitCode> {
    let source =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read script: {path}"))?;
    let mut shell = Shell::new(ShellConfig::batch().with_name("script"))?;
    Ok(exit_code(shell.run_script(&source)))
}
