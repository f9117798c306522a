//! `agora validate` end-to-end: real trees, real manifests, exit codes.

#![allow(clippy::expect_used)]

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn agora() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("agora"));
    cmd.env("NO_COLOR", "1");
    cmd
}

fn write_tree(root: &Path, manifest: &str, assets: &[(&str, &str)]) {
    let core = root.join(".agora-core");
    std::fs::create_dir_all(&core).expect("core dir");
    std::fs::write(core.join("install-manifest.yaml"), manifest).expect("manifest");
    for (rel, content) in assets {
        let path = core.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("parent");
        }
        std::fs::write(path, content).expect("asset");
    }
}

#[test]
fn test_validate_quick_mode_passes_on_intact_tree() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_tree(
        dir.path(),
        "version: \"1.0.0\"\nfiles:\n  - path: test.txt\n    size: 4\n",
        &[("test.txt", "test")],
    );

    agora()
        .args(["validate", "--quick", "--allow-unsigned"])
        .arg("--dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"));
}

#[test]
fn test_validate_fails_without_signature_by_default() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_tree(
        dir.path(),
        "version: \"1.0.0\"\nfiles:\n  - path: test.txt\n    size: 4\n",
        &[("test.txt", "test")],
    );

    agora()
        .arg("validate")
        .arg("--dir")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("signature").or(predicate::str::contains("failed")));
}

#[test]
fn test_validate_reports_missing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_tree(
        dir.path(),
        "version: \"1.0.0\"\nfiles:\n  - path: gone.txt\n    size: 4\n",
        &[],
    );

    agora()
        .args(["validate", "--quick", "--allow-unsigned"])
        .arg("--dir")
        .arg(dir.path())
        .assert()
        .stdout(predicate::str::contains("Missing file: gone.txt"));
}

#[test]
fn test_validate_fails_on_traversal_entry() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_tree(
        dir.path(),
        "version: \"1.0.0\"\nfiles:\n  - path: ../../etc/passwd\n    size: 4\n",
        &[],
    );

    agora()
        .args(["validate", "--quick", "--allow-unsigned"])
        .arg("--dir")
        .arg(dir.path())
        .assert()
        .failure();
}

#[test]
fn test_validate_json_emits_structured_report() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_tree(
        dir.path(),
        "version: \"1.0.0\"\nfiles:\n  - path: test.txt\n    size: 4\n",
        &[("test.txt", "test")],
    );

    let output = agora()
        .args(["validate", "--quick", "--allow-unsigned", "--json"])
        .arg("--dir")
        .arg(dir.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value =
        serde_json::from_slice(&output).expect("validate --json must emit valid JSON");
    assert_eq!(report["status"], "ok");
    assert_eq!(report["manifest_verified"], false);
    assert_eq!(report["stats"]["valid_files"], 1);
}

#[test]
fn test_validate_missing_manifest_fails_cleanly() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join(".agora-core")).expect("core dir");

    agora()
        .args(["validate", "--quick", "--allow-unsigned"])
        .arg("--dir")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
