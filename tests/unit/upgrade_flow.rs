//! End-to-end brownfield upgrade: baseline install, user edits, upgrade
//! check and selective apply.

#![allow(clippy::expect_used)]

use std::path::{Path, PathBuf};

use agora_installer::domain::manifest::{
    CORE_DIR, FileEntry, FileType, INSTALLED_MANIFEST_NAME, InstalledManifest, Manifest,
    classify_file_type,
};
use agora_installer::infra::hasher::hash_file;
use agora_installer::installer::upgrader::{
    ApplyOptions, apply_upgrade, generate_upgrade_report, load_manifest, update_installed_manifest,
};

use crate::helpers::write_asset;

struct Scenario {
    _guard: tempfile::TempDir,
    source: PathBuf,
    target: PathBuf,
    source_manifest: Manifest,
    installed_manifest: InstalledManifest,
}

fn entry(path: &str, hash: String) -> FileEntry {
    FileEntry {
        path: path.to_string(),
        hash: Some(hash),
        size: None,
        file_type: Some(classify_file_type(path)),
    }
}

fn write_source_file(source: &Path, rel: &str, content: &str) -> String {
    let path = source.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("parent");
    }
    std::fs::write(&path, content).expect("write source file");
    format!("sha256:{}", hash_file(&path).expect("hash"))
}

/// Installed baseline at 2.0.0 with four files; source ships 2.1.0 where:
///   - `agents/dev.md` is unchanged upstream and untouched locally
///   - `agents/architect.md` changed upstream only
///   - `tasks/review.md` was edited locally (upstream also changed it)
///   - `templates/prd.md` is new upstream
///   - `checklists/old.md` was dropped upstream
fn scenario() -> Scenario {
    let guard = tempfile::tempdir().expect("tempdir");
    let source = guard.path().join("source");
    let target = guard.path().join("target");
    std::fs::create_dir_all(&source).expect("source");
    std::fs::create_dir_all(target.join(CORE_DIR)).expect("target core");

    // Live tree as installed at 2.0.0.
    let dev_hash = write_asset(&target, "agents/dev.md", "# Dev v1\n");
    let architect_hash = write_asset(&target, "agents/architect.md", "# Architect v1\n");
    write_asset(&target, "tasks/review.md", "# Review v1 — edited by user\n");
    let old_hash = write_asset(&target, "checklists/old.md", "# Old\n");

    // Baseline recorded at install time (before the user's edit).
    let review_installed_hash =
        "sha256:1111111111111111111111111111111111111111111111111111111111111111".to_string();
    let installed_manifest = InstalledManifest {
        installed_version: "2.0.0".to_string(),
        installed_from: Some("agora-core@2.0.0".to_string()),
        installed_at: None,
        files: vec![
            entry("agents/dev.md", dev_hash.clone()),
            entry("agents/architect.md", architect_hash),
            entry("tasks/review.md", review_installed_hash),
            entry("checklists/old.md", old_hash),
        ],
    };

    // Source tree shipping 2.1.0.
    let source_dev = write_source_file(&source, "agents/dev.md", "# Dev v1\n");
    assert_eq!(source_dev, dev_hash, "dev.md is unchanged upstream");
    let source_architect =
        write_source_file(&source, "agents/architect.md", "# Architect v2\n");
    let source_review = write_source_file(&source, "tasks/review.md", "# Review v2\n");
    let source_prd = write_source_file(&source, "templates/prd.md", "# PRD template\n");

    let source_manifest = Manifest {
        version: "2.1.0".to_string(),
        generated_at: None,
        generator: Some("agora-manifest-gen@2.1.0".to_string()),
        file_count: Some(4),
        files: vec![
            entry("agents/dev.md", source_dev),
            entry("agents/architect.md", source_architect),
            entry("tasks/review.md", source_review),
            entry("templates/prd.md", source_prd),
        ],
    };

    Scenario {
        _guard: guard,
        source,
        target,
        source_manifest,
        installed_manifest,
    }
}

#[test]
fn test_report_classifies_all_four_ways() {
    let s = scenario();
    let report =
        generate_upgrade_report(&s.source_manifest, &s.installed_manifest, &s.target);

    assert!(report.upgrade_available);
    assert_eq!(report.source_version, "2.1.0");
    assert_eq!(report.installed_version, "2.0.0");

    let paths = |changes: &[agora_installer::domain::report::FileChange]| {
        changes.iter().map(|c| c.path.clone()).collect::<Vec<_>>()
    };
    assert_eq!(paths(&report.new_files), vec!["templates/prd.md"]);
    assert_eq!(paths(&report.modified_files), vec!["agents/architect.md"]);
    assert_eq!(paths(&report.user_modified_files), vec!["tasks/review.md"]);
    assert_eq!(paths(&report.deleted_files), vec!["checklists/old.md"]);
}

#[test]
fn test_default_apply_installs_only_new_files() {
    let s = scenario();
    let report =
        generate_upgrade_report(&s.source_manifest, &s.installed_manifest, &s.target);
    let outcome = apply_upgrade(&report, &s.source, &s.target, &ApplyOptions::default());

    assert!(outcome.success);
    assert_eq!(outcome.files_installed.len(), 1);
    assert!(s.target.join(CORE_DIR).join("templates/prd.md").exists());

    // Upstream-modified stays at v1; user edit survives.
    let architect = std::fs::read_to_string(s.target.join(CORE_DIR).join("agents/architect.md"))
        .expect("read");
    assert!(architect.contains("v1"));
    let review =
        std::fs::read_to_string(s.target.join(CORE_DIR).join("tasks/review.md")).expect("read");
    assert!(review.contains("edited by user"));
}

#[test]
fn test_include_modified_updates_upstream_changes_only() {
    let s = scenario();
    let report =
        generate_upgrade_report(&s.source_manifest, &s.installed_manifest, &s.target);
    let outcome = apply_upgrade(
        &report,
        &s.source,
        &s.target,
        &ApplyOptions {
            dry_run: false,
            include_modified: true,
        },
    );

    assert!(outcome.success);
    let architect = std::fs::read_to_string(s.target.join(CORE_DIR).join("agents/architect.md"))
        .expect("read");
    assert!(architect.contains("v2"), "upstream change applied");

    // The user's edit is still never overwritten.
    let review =
        std::fs::read_to_string(s.target.join(CORE_DIR).join("tasks/review.md")).expect("read");
    assert!(review.contains("edited by user"));
    assert!(
        outcome
            .files_skipped
            .iter()
            .any(|f| f.path == "tasks/review.md"
                && f.reason.as_deref().expect("reason").contains("preserving local"))
    );

    // Deleted upstream files are reported, never removed.
    assert!(s.target.join(CORE_DIR).join("checklists/old.md").exists());
}

#[test]
fn test_dry_run_leaves_tree_untouched() {
    let s = scenario();
    let report =
        generate_upgrade_report(&s.source_manifest, &s.installed_manifest, &s.target);
    let outcome = apply_upgrade(
        &report,
        &s.source,
        &s.target,
        &ApplyOptions {
            dry_run: true,
            include_modified: true,
        },
    );

    assert_eq!(outcome.files_installed.len(), 2, "new + modified planned");
    assert!(!s.target.join(CORE_DIR).join("templates/prd.md").exists());
    let architect = std::fs::read_to_string(s.target.join(CORE_DIR).join("agents/architect.md"))
        .expect("read");
    assert!(architect.contains("v1"), "dry run must not write");
}

#[test]
fn test_new_baseline_makes_next_check_quiet() {
    let s = scenario();
    let report =
        generate_upgrade_report(&s.source_manifest, &s.installed_manifest, &s.target);
    let outcome = apply_upgrade(
        &report,
        &s.source,
        &s.target,
        &ApplyOptions {
            dry_run: false,
            include_modified: true,
        },
    );
    assert!(outcome.success);

    update_installed_manifest(&s.target, &s.source_manifest, "agora-core@2.1.0")
        .expect("write baseline");
    let baseline: InstalledManifest =
        load_manifest(&s.target.join(CORE_DIR), INSTALLED_MANIFEST_NAME)
            .expect("load")
            .expect("present");
    assert_eq!(baseline.installed_version, "2.1.0");

    // Same source against the new baseline: no upgrade, nothing new or
    // upstream-modified; the user's edit is still flagged as theirs.
    let next = generate_upgrade_report(&s.source_manifest, &baseline, &s.target);
    assert!(!next.upgrade_available);
    assert!(next.new_files.is_empty());
    assert!(next.modified_files.is_empty());
    assert_eq!(next.user_modified_files.len(), 1);
    assert_eq!(next.user_modified_files[0].path, "tasks/review.md");
}

#[test]
fn test_classify_file_type_feeds_manifest_entries() {
    assert_eq!(classify_file_type("agents/dev.md"), FileType::Agent);
    assert_eq!(classify_file_type("templates/prd.md"), FileType::Template);
    assert_eq!(classify_file_type("checklists/old.md"), FileType::Checklist);
}
