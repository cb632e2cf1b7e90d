//! Built-in commands: `fg`, `bg`, `jobs`, `exit`.

use jobsh_kernel::JobControl;
use jobsh_types::JobId;
use nix::unistd::Pid;

/// What the driver should do after a built-in ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue(i32),
    Exit(i32),
}

pub fn is_builtin(name: &str) -> bool {
    matches!(name, "fg" | "bg" | "jobs" | "exit")
}

/// Run built-in `argv[0]`. Diagnostics go to stderr.
///
/// Pending status changes are collected (and reported) first, so a job
/// that stopped while the line was being typed is visible to `fg`, `bg`
/// and `jobs`.
pub fn run(ctl: &mut JobControl, argv: &[String], last_status: i32) -> Flow {
    for notice in ctl.poll() {
        eprintln!("{notice}");
    }
    let name = argv.first().map(String::as_str).unwrap_or("");
    match name {
        "fg" => Flow::Continue(resume(ctl, "fg", argv.get(1), true)),
        "bg" => Flow::Continue(resume(ctl, "bg", argv.get(1), false)),
        "jobs" => {
            for info in ctl.jobs() {
                println!("[{}] {}", info.id, info);
            }
            Flow::Continue(0)
        }
        "exit" => match argv.get(1).map(|a| a.parse::<i32>()) {
            None => Flow::Exit(last_status),
            Some(Ok(code)) => Flow::Exit(code),
            Some(Err(_)) => {
                eprintln!("exit: numeric argument required");
                Flow::Continue(2)
            }
        },
        other => {
            eprintln!("jobsh: {other}: not a builtin");
            Flow::Continue(1)
        }
    }
}

/// Resolve the target of `fg`/`bg`: a process group id, or the most
/// recently stopped job.
fn target(ctl: &JobControl, name: &str, arg: Option<&String>) -> Result<JobId, String> {
    let Some(arg) = arg else {
        return ctl.last_stopped().ok_or_else(|| format!("{name}: no stopped jobs"));
    };
    let pgid = arg
        .trim_start_matches('%')
        .parse::<i32>()
        .map_err(|_| format!("{name}: invalid process group: {arg}"))?;
    let pgid = Pid::from_raw(pgid);
    match (ctl.find_stopped(pgid), ctl.find(pgid)) {
        (Some(id), _) => Ok(id),
        (None, Some(_)) => Err(format!("{name}: job {pgid} is not stopped")),
        (None, None) => Err(format!("{name}: no such job: {pgid}")),
    }
}

fn resume(ctl: &mut JobControl, name: &str, arg: Option<&String>, foreground: bool) -> i32 {
    if !ctl.is_interactive() {
        eprintln!("{name}: no job control");
        return 1;
    }
    let id = match target(ctl, name, arg) {
        Ok(id) => id,
        Err(msg) => {
            eprintln!("{msg}");
            return 1;
        }
    };
    if let Some(job) = ctl.job(id) {
        eprintln!("{}", job.command);
    }
    match ctl.resume(id, foreground) {
        Ok(outcome) => outcome.code(),
        Err(err) => {
            eprintln!("{name}: {err}");
            1
        }
    }
}
