//! Build script - places `memory.x` (nRF52840 with S140 reserved) in
//! the output directory so `link.x` can include it.

use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));

    fs::copy("memory.x", out_dir.join("memory.x")).expect("memory.x must exist at the crate root");
    println!("cargo:rustc-link-search={}", out_dir.display());

    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}
