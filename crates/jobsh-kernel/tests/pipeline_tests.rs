//! Pipelines against real processes.
//!
//! These run on a non-interactive session: no process groups, no terminal,
//! every job waited for. Reaping uses `waitpid(-1)`, so the tests are
//! serialised to keep them from collecting each other's children.

use std::fs;
use std::path::Path;

use jobsh_kernel::{JobControl, JobOutcome, LaunchError, ShellConfig};
use jobsh_types::{JobSpec, OutputMode, ProcessSpec};
use serial_test::serial;

fn batch() -> JobControl {
    JobControl::unix(ShellConfig::batch().with_name("pipeline-tests"))
}

fn run(ctl: &mut JobControl, spec: JobSpec) -> Result<JobOutcome, LaunchError> {
    let id = ctl.submit(spec);
    ctl.launch(id)
}

fn sh(script: &str) -> ProcessSpec {
    ProcessSpec::new("sh").args(["-c", script])
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).expect("output file should be readable")
}

// ============================================================================
// Pipelines
// ============================================================================

#[test]
#[serial]
fn three_stage_pipeline_preserves_content() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.txt");
    let mut ctl = batch();

    let outcome = run(
        &mut ctl,
        JobSpec::foreground(vec![
            ProcessSpec::new("printf").arg("alpha\nbeta\ngamma\n"),
            ProcessSpec::new("tr").args(["a-z", "A-Z"]),
            ProcessSpec::new("cat").stdout_to(&out, OutputMode::Truncate),
        ]),
    )
    .unwrap();

    assert_eq!(outcome, JobOutcome::Completed { code: 0 });
    assert_eq!(read(&out), "ALPHA\nBETA\nGAMMA\n");
    assert!(ctl.registry().is_empty(), "completed job should be destroyed");
}

#[test]
#[serial]
fn input_redirection_feeds_first_stage() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let out = dir.path().join("out.txt");
    fs::write(&input, "one\ntwo\nthree\n").unwrap();
    let mut ctl = batch();

    run(
        &mut ctl,
        JobSpec::foreground(vec![
            ProcessSpec::new("cat").stdin_from(&input),
            ProcessSpec::new("wc").arg("-l").stdout_to(&out, OutputMode::Truncate),
        ]),
    )
    .unwrap();

    assert_eq!(read(&out).trim(), "3");
}

#[test]
#[serial]
fn exit_code_is_that_of_the_last_stage() {
    let mut ctl = batch();
    let outcome = run(
        &mut ctl,
        JobSpec::foreground(vec![ProcessSpec::new("true"), ProcessSpec::new("false")]),
    )
    .unwrap();
    assert_eq!(outcome, JobOutcome::Completed { code: 1 });
}

#[test]
#[serial]
fn signal_death_reports_128_plus_signal() {
    let mut ctl = batch();
    let outcome = run(&mut ctl, JobSpec::foreground(vec![sh("kill -TERM $$")])).unwrap();
    assert_eq!(outcome, JobOutcome::Completed { code: 143 });
}

#[test]
#[serial]
fn missing_program_exits_127_without_failing_launch() {
    let mut ctl = batch();
    let outcome = run(
        &mut ctl,
        JobSpec::foreground(vec![ProcessSpec::new("jobsh-definitely-not-a-program")]),
    )
    .unwrap();
    assert_eq!(outcome, JobOutcome::Completed { code: 127 });
}

#[test]
#[serial]
fn exec_failure_does_not_abort_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.txt");
    let mut ctl = batch();

    let outcome = run(
        &mut ctl,
        JobSpec::foreground(vec![
            ProcessSpec::new("jobsh-definitely-not-a-program"),
            sh("echo still ran").stdout_to(&out, OutputMode::Truncate),
        ]),
    )
    .unwrap();

    assert_eq!(outcome, JobOutcome::Completed { code: 0 });
    assert_eq!(read(&out), "still ran\n");
}

// ============================================================================
// Output redirection
// ============================================================================

#[test]
#[serial]
fn truncate_replaces_existing_content() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("f");
    fs::write(&out, "OLD").unwrap();
    let mut ctl = batch();

    run(
        &mut ctl,
        JobSpec::foreground(vec![
            ProcessSpec::new("printf").arg("NEW").stdout_to(&out, OutputMode::Truncate),
        ]),
    )
    .unwrap();
    assert_eq!(read(&out), "NEW");
}

#[test]
#[serial]
fn append_keeps_existing_content() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("f");
    fs::write(&out, "OLD").unwrap();
    let mut ctl = batch();

    run(
        &mut ctl,
        JobSpec::foreground(vec![
            ProcessSpec::new("printf").arg("NEW").stdout_to(&out, OutputMode::Append),
        ]),
    )
    .unwrap();
    assert_eq!(read(&out), "OLDNEW");
}

#[cfg(unix)]
#[test]
#[serial]
fn created_files_use_configured_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("f");
    let mut ctl = JobControl::unix(ShellConfig::batch().with_redirect_mode(0o600));
    run(
        &mut ctl,
        JobSpec::foreground(vec![ProcessSpec::new("true").stdout_to(&out, OutputMode::Truncate)]),
    )
    .unwrap();

    let mode = fs::metadata(&out).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode & !0o600, 0, "mode {mode:o} should not exceed 0600");
}

// ============================================================================
// Redirection failure
// ============================================================================

#[test]
#[serial]
fn missing_input_fails_before_spawning() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = batch();

    let err = run(
        &mut ctl,
        JobSpec::foreground(vec![ProcessSpec::new("cat").stdin_from(dir.path().join("absent"))]),
    )
    .unwrap_err();

    match err {
        LaunchError::InputRedirect { path, .. } => assert!(path.ends_with("absent")),
        other => panic!("expected an input redirection error, got {other}"),
    }
    assert!(ctl.registry().is_empty(), "nothing was started, nothing lingers");
}

#[test]
#[serial]
fn failure_mid_pipeline_leaves_started_stages_running() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    let mut ctl = batch();

    let err = run(
        &mut ctl,
        JobSpec::foreground(vec![
            sh("echo started > \"$0\"").arg(marker.to_string_lossy()),
            ProcessSpec::new("cat").stdin_from(dir.path().join("absent")),
        ]),
    )
    .unwrap_err();
    assert!(matches!(err, LaunchError::InputRedirect { .. }));

    // The first stage is still ours to reap.
    let id = ctl.registry().running_ids()[0];
    ctl.wait_blocking(id);
    assert!(ctl.job(id).unwrap().is_completed());
    let notices = ctl.notify_pass();
    assert_eq!(notices.len(), 1);
    assert!(ctl.registry().is_empty());
    assert_eq!(read(&marker), "started\n");
}

// ============================================================================
// Descriptor hygiene
// ============================================================================

#[cfg(target_os = "linux")]
fn open_descriptors() -> usize {
    fs::read_dir("/proc/self/fd").unwrap().count()
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn launch_leaves_no_descriptors_behind() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let mut ctl = batch();
    let before = open_descriptors();

    run(
        &mut ctl,
        JobSpec::foreground(vec![
            ProcessSpec::new("printf").arg("x"),
            ProcessSpec::new("cat"),
            ProcessSpec::new("cat"),
            ProcessSpec::new("cat").stdout_to(&out, OutputMode::Truncate),
        ]),
    )
    .unwrap();
    assert_eq!(open_descriptors(), before);

    let _ = run(
        &mut ctl,
        JobSpec::foreground(vec![
            ProcessSpec::new("printf").arg("x"),
            ProcessSpec::new("cat").stdin_from(dir.path().join("absent")),
        ]),
    );
    for id in ctl.registry().running_ids() {
        ctl.wait_blocking(id);
    }
    assert_eq!(open_descriptors(), before, "error path closes its descriptors too");
}
