// Copyright (c) Microsoft Corporation
// License: MIT OR Apache-2.0
//! System level tests for the wdk-surface CLI
use assert_cmd::Command;
use assert_fs::{TempDir, prelude::*};
use predicates::prelude::*;
use wdk_surface::{BuildContext, select};

const SDK_VERSION: &str = "10.0.26100.0";

fn wdk_surface_cmd() -> Command {
    Command::cargo_bin("wdk-surface").expect("wdk-surface binary should be built")
}

/// Creates a WDK tree where every header of the plain user-mode surface is
/// present and empty
fn create_user_mode_wdk() -> TempDir {
    let wdk_root = TempDir::new().expect("Unable to create new temp dir for test");
    for directory in ["km/crt", "km", "um", "shared"] {
        wdk_root
            .child(format!("Include/{SDK_VERSION}/{directory}"))
            .create_dir_all()
            .unwrap();
    }
    for header in select(BuildContext::UserMode).headers() {
        wdk_root
            .child(format!("Include/{SDK_VERSION}/um/{header}"))
            .write_str("#pragma once\n")
            .unwrap();
    }
    wdk_root
}

#[test]
fn list_shows_kernel_mode_groups_and_supplemental_types() {
    wdk_surface_cmd()
        .args(["list", "--context", "kernel-mode"])
        .assert()
        .success()
        .stdout(
            predicate::str::starts_with("build context: kernel-mode\n")
                .and(predicate::str::contains("    ntddk.h\n"))
                .and(predicate::str::contains("    hidsdi.h\n"))
                .and(predicate::str::contains("  _KGDTENTRY64 ")),
        );
}

#[test]
fn list_umdf_excludes_device_classes_and_shims() {
    wdk_surface_cmd()
        .args(["list", "--context", "umdf"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("    windows.h\n")
                .and(predicate::str::contains("hidsdi.h").not())
                .and(predicate::str::contains("usbspec.h").not())
                .and(predicate::str::contains("_KGDTENTRY64").not()),
        );
}

#[test]
fn list_honors_option_flags() {
    wdk_surface_cmd()
        .args(["list", "--context", "user-mode"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hidpi.h").not());

    wdk_surface_cmd()
        .args(["list", "--context", "user-mode", "--hid-extended-headers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("    hidpi.h\n"));
}

#[test]
fn list_rejects_unknown_context() {
    wdk_surface_cmd()
        .args(["list", "--context", "hypervisor"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("hypervisor"));
}

#[test]
fn render_writes_wrapper_header_to_stdout() {
    wdk_surface_cmd()
        .args(["render", "--context", "user-mode"])
        .assert()
        .success()
        .stdout(
            predicate::str::starts_with(
                "// Declaration surface for the `user-mode` build context.\n",
            )
            .and(predicate::str::contains("#pragma once\n"))
            .and(predicate::str::contains("#include \"windows.h\"\n"))
            .and(predicate::str::contains("} KIDTENTRY64, *PKIDTENTRY64;")),
        );
}

#[test]
fn render_writes_wrapper_header_to_file() {
    let tmp_dir = TempDir::new().expect("Unable to create new temp dir for test");
    let output = tmp_dir.child("wdk-surface-input.h");

    wdk_surface_cmd()
        .args(["render", "--context", "umdf", "--output"])
        .arg(output.path())
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    output.assert(
        predicate::str::contains("#include \"wdf.h\"\n")
            .and(predicate::str::contains("_KIDTENTRY64").not()),
    );
}

#[test]
fn markers_lists_every_marker_without_context() {
    wdk_surface_cmd()
        .arg("markers")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("[hid] FIXME:")
                .and(predicate::str::contains("[shims] FIXME:"))
                .and(predicate::str::contains("[options: hid-extended-headers]")),
        );
}

#[test]
fn markers_for_umdf_excludes_device_class_markers() {
    wdk_surface_cmd()
        .args(["markers", "--context", "umdf"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("[hid]")
                .not()
                .and(predicate::str::contains("[shims]").not()),
        );
}

#[test]
fn diff_shows_context_differences() {
    wdk_surface_cmd()
        .args(["diff", "umdf", "kernel-mode"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("- group windows\n")
                .and(predicate::str::contains("+ group nt-kernel\n"))
                .and(predicate::str::contains("+ header ntddk.h\n"))
                .and(predicate::str::contains("+ shim _KGDTENTRY64\n")),
        );
}

#[test]
fn diff_reports_identical_surfaces() {
    wdk_surface_cmd()
        .args(["diff", "user-mode", "user-mode"])
        .assert()
        .success()
        .stdout("the `user-mode` and `user-mode` surfaces expose the same declarations\n");
}

#[test]
fn check_succeeds_when_every_header_resolves() {
    let wdk_root = create_user_mode_wdk();

    wdk_surface_cmd()
        .args(["check", "--context", "user-mode", "--wdk-content-root"])
        .arg(wdk_root.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "{} headers of the `user-mode` surface resolved",
            select(BuildContext::UserMode).headers().len()
        )));
}

#[test]
fn check_fails_naming_the_missing_header() {
    let wdk_root = create_user_mode_wdk();
    std::fs::remove_file(
        wdk_root
            .child(format!("Include/{SDK_VERSION}/um/spb.h"))
            .path(),
    )
    .unwrap();

    wdk_surface_cmd()
        .args(["check", "--context", "user-mode", "--wdk-content-root"])
        .arg(wdk_root.path())
        .args(["--sdk-version", SDK_VERSION])
        .assert()
        .failure()
        .stderr(predicate::str::contains("spb.h"));
}

#[test]
fn check_fails_on_native_definition_of_supplemental_type() {
    let wdk_root = create_user_mode_wdk();
    wdk_root
        .child(format!("Include/{SDK_VERSION}/um/windows.h"))
        .write_str("typedef union _KGDTENTRY64 {\n  ULONG64 Alignment;\n} KGDTENTRY64;\n")
        .unwrap();

    wdk_surface_cmd()
        .args(["check", "--context", "user-mode", "--wdk-content-root"])
        .arg(wdk_root.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("_KGDTENTRY64"));
}
