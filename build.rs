use std::fs;
use std::path::Path;
use std::process::Command;

/// Embeds the short commit hash as `GIT_HASH` for `reality-parser --version`.
fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    watch_git_head();

    let git_hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
}

/// Rebuild when HEAD moves, either by checkout or by a commit on the branch.
fn watch_git_head() {
    if !Path::new(".git").exists() {
        return;
    }
    println!("cargo:rerun-if-changed=.git/HEAD");

    let Ok(head) = fs::read_to_string(".git/HEAD") else {
        return;
    };
    if let Some(reference) = head.strip_prefix("ref: ") {
        let ref_path = format!(".git/{}", reference.trim());
        if Path::new(&ref_path).exists() {
            println!("cargo:rerun-if-changed={}", ref_path);
        }
    }
}
