use std::process::Command;

fn main() {
    if let Ok(target) = std::env::var("TARGET") {
        println!("cargo:rustc-env=MUXPLEX_BUILD_TARGET={target}");
    }

    let git_hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .filter(|hash| !hash.is_empty());
    if let Some(hash) = git_hash {
        println!("cargo:rustc-env=MUXPLEX_GIT_HASH={hash}");
    }

    println!("cargo:rerun-if-env-changed=TARGET");
}
