use std::{env, process::Command};

const GIT_TAG: &str = "MANDEL_BUILD_GIT_TAG";
const GIT_COMMIT: &str = "MANDEL_BUILD_GIT_COMMIT";
const GIT_DIRTY: &str = "MANDEL_BUILD_GIT_DIRTY";

fn main() {
    for key in [GIT_TAG, GIT_COMMIT, GIT_DIRTY] {
        println!("cargo:rerun-if-env-changed={key}");
    }

    let tag = override_or(GIT_TAG, || {
        run_git(&["describe", "--tags", "--exact-match"]).unwrap_or_else(|| "untagged".into())
    });
    let commit = override_or(GIT_COMMIT, || {
        run_git(&["rev-parse", "--short=12", "HEAD"]).unwrap_or_else(|| "unknown".into())
    });
    let dirty = override_or(GIT_DIRTY, || {
        let changed = run_git(&["status", "--porcelain", "--untracked-files=no"])
            .is_some_and(|output| !output.is_empty());
        changed.to_string()
    });

    println!("cargo:rustc-env={GIT_TAG}={tag}");
    println!("cargo:rustc-env={GIT_COMMIT}={commit}");
    println!("cargo:rustc-env={GIT_DIRTY}={dirty}");
}

fn override_or(key: &str, detect: impl FnOnce() -> String) -> String {
    env::var(key).unwrap_or_else(|_| detect())
}

fn run_git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|value| value.trim().to_string())
}
