// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

fn main() {
    // Release tags drive the version reported in `X-Neptune-CLI-Version`.
    // Builds outside a git checkout keep the manifest version.
    if let Ok(output) = std::process::Command::new("git")
        .args(["describe", "--tags", "--abbrev=0"])
        .output()
    {
        let tag = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() && !tag.is_empty() {
            let version = tag.strip_prefix('v').unwrap_or(&tag);
            println!("cargo:rustc-env=CARGO_PKG_VERSION={version}");
        }
    }
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/refs/tags");
}
