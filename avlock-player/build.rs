//! Stamps the scenario driver with the commit and time it was built from
//!
//! Both values appear in the first log line of every run so scenario reports
//! can be matched to a build.

use std::process::Command;

fn git_revision() -> Option<String> {
    let output = Command::new("git").args(["describe", "--always", "--dirty"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let revision = String::from_utf8(output.stdout).ok()?;
    let revision = revision.trim();
    (!revision.is_empty()).then(|| revision.to_string())
}

fn main() {
    let revision = git_revision().unwrap_or_else(|| "unversioned".to_string());
    let built_at = chrono::Utc::now().format("%Y-%m-%d %H:%M UTC");

    println!("cargo:rustc-env=GIT_HASH={}", revision);
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", built_at);
    println!("cargo:rerun-if-changed=../.git/HEAD");
    println!("cargo:rerun-if-changed=build.rs");
}
