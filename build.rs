// RustSplitSteno - Build Script
//
// Exports the ESP-IDF environment for device builds and stamps the version.

use std::process::Command;

fn main() {
    // ESP-IDF environment setup (MUST be first!). Host builds skip it.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }

    // Get git version info
    let version = env!("CARGO_PKG_VERSION");
    let git_hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=VERSION_STRING=RustSplitSteno v{}-g{}", version, git_hash);

    // Rebuild if the IDF defaults change
    println!("cargo:rerun-if-changed=sdkconfig.defaults");

    // Rebuild if git HEAD changes
    println!("cargo:rerun-if-changed=.git/HEAD");
}
