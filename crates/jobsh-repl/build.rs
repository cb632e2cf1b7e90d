//! Build script for jobsh-repl: version metadata for `jobsh --version`.

use std::path::Path;
use std::process::Command;

/// Short commit hash, when built from a git checkout.
fn git_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn main() {
    let head = Path::new("../../.git/HEAD");
    if head.exists() {
        println!("cargo::rerun-if-changed={}", head.display());
    }

    let hash = git_hash().unwrap_or_else(|| "unknown".to_string());
    let date = chrono::Utc::now().date_naive();

    println!("cargo:rustc-env=JOBSH_GIT_HASH={hash}");
    println!("cargo:rustc-env=JOBSH_BUILD_DATE={date}");
}
