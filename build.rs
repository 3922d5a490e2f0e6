// SPDX-License-Identifier: MPL-2.0

use std::process::Command;

fn main() {
    // Re-run build script if git HEAD changes
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=CAMERA_PIPELINE_VERSION");

    // Packagers can pin the version explicitly
    let version = match std::env::var("CAMERA_PIPELINE_VERSION") {
        Ok(v) if !v.is_empty() => v,
        _ => git_version().unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
    };

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `git describe` output without the leading `v`
///
/// - "0.1.0" when HEAD is exactly at a tag
/// - "0.1.0-3-gabcdef1" when HEAD is 3 commits after it
/// - "abcdef1" when there is no tag at all
fn git_version() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--match", "v*"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let described = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if described.is_empty() {
        return None;
    }
    Some(
        described
            .strip_prefix('v')
            .map(str::to_string)
            .unwrap_or(described),
    )
}
