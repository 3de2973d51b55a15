use std::env;
use std::process::Command;

// Short commit hash from LINCS_FOREST_GIT_SHA, or from git when building inside a checkout
fn git_sha() -> Option<String> {
    if let Ok(sha) = env::var("LINCS_FOREST_GIT_SHA") {
        let sha = sha.trim().to_string();
        return if sha.is_empty() { None } else { Some(sha) };
    }

    let output = Command::new("git").args(["rev-parse", "--short", "HEAD"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if sha.is_empty() {
        None
    } else {
        Some(sha)
    }
}

fn main() {
    println!("cargo:rerun-if-env-changed=LINCS_FOREST_GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs");

    let version = env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let full_version = match git_sha() {
        Some(sha) => {
            println!("cargo:rustc-env=LINCS_FOREST_GIT_SHA={}", sha);
            format!("{}#{}", version, sha)
        }
        None => version,
    };
    println!("cargo:rustc-env=LINCS_FOREST_VERSION={}", full_version);
}
