//! Build script for otalink-cli: embeds build metadata into --version.

use std::process::Command;

/// Capture the short git hash at build time, when available.
fn main() {
    println!("cargo:rerun-if-changed=../.git/HEAD");

    let version = git_short_hash().map_or_else(
        || env!("CARGO_PKG_VERSION").to_string(),
        |hash| format!("{} ({hash})", env!("CARGO_PKG_VERSION")),
    );
    println!("cargo:rustc-env=OTALINK_BUILD_VERSION={version}");
}

/// Short hash of HEAD, or None outside a git checkout.
fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    let hash = hash.trim();
    if hash.is_empty() {
        None
    } else {
        Some(hash.to_string())
    }
}
