//! Build script for the Pulsoid OSC bridge
//!
//! Embeds git and toolchain details so `pulsoid-osc-bridge version`
//! can report exactly which build is forwarding heart-rate data.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let git_hash = command_output("git", &["rev-parse", "--short=8", "HEAD"]);
    let git_branch = command_output("git", &["rev-parse", "--abbrev-ref", "HEAD"]);
    let git_dirty = match Command::new("git").args(["status", "--porcelain"]).output() {
        Ok(out) if out.status.success() => (!out.stdout.is_empty()).to_string(),
        _ => "unknown".to_string(),
    };

    let env_or_unknown = |key: &str| env::var(key).unwrap_or_else(|_| "unknown".to_string());

    let vars = [
        ("BRIDGE_GIT_HASH", git_hash),
        ("BRIDGE_GIT_BRANCH", git_branch),
        ("BRIDGE_GIT_DIRTY", git_dirty),
        (
            "BRIDGE_BUILD_TIMESTAMP",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ),
        ("BRIDGE_TARGET", env_or_unknown("TARGET")),
        ("BRIDGE_PROFILE", env_or_unknown("PROFILE")),
        ("BRIDGE_RUSTC_VERSION", command_output("rustc", &["--version"])),
        ("BRIDGE_HOST", env_or_unknown("HOST")),
    ];

    for (key, value) in &vars {
        println!("cargo:rustc-env={}={}", key, value);
    }
}

/// Run a command and return its trimmed stdout, or "unknown" on any failure
fn command_output(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
