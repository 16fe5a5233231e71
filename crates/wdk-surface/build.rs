// Copyright (c) Microsoft Corporation
// License: MIT OR Apache-2.0

//! Build script for the `wdk-surface` crate.
//!
//! Exposes `nightly_toolchain` so unit tests can opt into `assert_matches`.

#[rustversion::nightly]
fn main() {
    println!("cargo::rustc-check-cfg=cfg(nightly_toolchain)");
    println!("cargo::rustc-cfg=nightly_toolchain");
}

#[rustversion::not(nightly)]
fn main() {
    println!("cargo::rustc-check-cfg=cfg(nightly_toolchain)");
}
