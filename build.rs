//! Purpose: Compile the native greeting shim for Rust FFI.
//! Role: Cargo build-script; configures `cc` inputs/includes and rebuild triggers.
//! Invariants: `cargo:rerun-if-changed` covers every C source and header.
//! Invariants: Produces a `hello_shim` static library linked into the Rust crate.
//! Invariants: Uses only Cargo-provided env vars (e.g. `CARGO_MANIFEST_DIR`).
use std::env;
use std::path::PathBuf;

fn main() {
    let target = env::var("TARGET").unwrap_or_default();
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let shim_dir = manifest_dir.join("c");

    println!("cargo:rerun-if-changed=c/hello_shim.c");
    println!("cargo:rerun-if-changed=c/hello_shim.h");

    let mut build = cc::Build::new();
    build
        .include(&shim_dir)
        .file(shim_dir.join("hello_shim.c"))
        .warnings(true);

    configure_shim_compiler(&mut build, &target);

    build.compile("hello_shim");
}

fn configure_shim_compiler(build: &mut cc::Build, target: &str) {
    if target.contains("windows-msvc") {
        if !has_user_cc_override(target) {
            build.compiler("clang-cl");
        }
    } else {
        build.flag_if_supported("-std=c11");
    }
}

fn has_user_cc_override(target: &str) -> bool {
    let target_cc = format!("CC_{target}");
    let target_cc_underscored = format!("CC_{}", target.replace('-', "_"));
    env::var_os("CC").is_some()
        || env::var_os(target_cc).is_some()
        || env::var_os(target_cc_underscored).is_some()
}
