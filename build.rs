use std::env;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

/// Exposes `MPCHAT_GIT_SHA` and `MPCHAT_BUILD_TS` to `--version`.
fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");

    println!("cargo:rustc-env=MPCHAT_GIT_SHA={}", git_short_sha().as_deref().unwrap_or("unknown"));
    println!("cargo:rustc-env=MPCHAT_BUILD_TS={}", build_timestamp());
}

fn git_short_sha() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())?;
    let sha = String::from_utf8(output.stdout).ok()?;
    let sha = sha.trim();
    (!sha.is_empty()).then(|| sha.to_string())
}

/// Honors reproducible-build timestamps when set.
fn build_timestamp() -> String {
    env::var("SOURCE_DATE_EPOCH").unwrap_or_else(|_| {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        now.as_secs().to_string()
    })
}
