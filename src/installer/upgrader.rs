//! Brownfield upgrades — diff a new source manifest against the installed
//! baseline and the live tree, then apply only what is safe.
//!
//! The central guarantee: a file the user edited after install is never
//! overwritten. Detection compares the live on-disk hash against the
//! *installed* manifest's recorded hash, so upstream changes and local edits
//! are distinguished even when both happened. Deleted upstream files are
//! reported, never removed.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;

use crate::domain::manifest::{
    CORE_DIR, FileEntry, INSTALLED_MANIFEST_NAME, InstalledManifest, Manifest,
};
use crate::domain::paths::{is_path_contained, normalize_separators};
use crate::domain::report::{ApplyOutcome, FileChange, UpgradeReport};
use crate::infra::hasher::{hash_file, hashes_match};

/// Options for [`apply_upgrade`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Compute the plan without touching the filesystem.
    pub dry_run: bool,
    /// Also install upstream-modified files. Off by default so a plain
    /// upgrade never silently overwrites files upstream changed.
    pub include_modified: bool,
}

/// Load a YAML manifest from `dir/name`, returning `None` when absent.
///
/// Used for local, already-trusted manifests (the installed baseline).
/// Source manifests go through the signature loader first.
///
/// # Errors
///
/// Returns an error when the file exists but cannot be read or parsed.
pub fn load_manifest<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<Option<T>> {
    let path = dir.join(name);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("reading manifest {}", path.display()))?;
    let parsed = serde_yaml::from_str(&content)
        .with_context(|| format!("parsing manifest {}", path.display()))?;
    Ok(Some(parsed))
}

/// Build a path → entry map with separator-normalized keys.
///
/// Manifests written on Windows may carry backslashes; normalizing here
/// keeps the diff platform-independent.
#[must_use]
pub fn build_file_map(files: &[FileEntry]) -> BTreeMap<String, &FileEntry> {
    files
        .iter()
        .map(|entry| (normalize_separators(&entry.path), entry))
        .collect()
}

/// True when the live file's canonical hash disagrees with the installed
/// manifest's recorded hash.
///
/// A missing file, an absent recorded hash, or an unreadable file all return
/// `false`: only a positive hash disagreement proves a local edit.
#[must_use]
pub fn is_user_modified(live_path: &Path, installed_hash: Option<&str>) -> bool {
    let Some(installed_hash) = installed_hash else {
        return false;
    };
    match hash_file(live_path) {
        Ok(actual) => !hashes_match(Some(&actual), Some(installed_hash)),
        Err(_) => false,
    }
}

fn upgrade_available(source_version: &str, installed_version: &str) -> bool {
    match (
        semver::Version::parse(source_version),
        semver::Version::parse(installed_version),
    ) {
        (Ok(source), Ok(installed)) => source > installed,
        // Unparseable versions fail closed: no upgrade is offered.
        _ => false,
    }
}

/// Classify every file across the source manifest, the installed baseline,
/// and the live tree under `target_root`.
#[must_use]
pub fn generate_upgrade_report(
    source: &Manifest,
    installed: &InstalledManifest,
    target_root: &Path,
) -> UpgradeReport {
    let source_map = build_file_map(&source.files);
    let installed_map = build_file_map(&installed.files);
    let core_dir = target_root.join(CORE_DIR);

    let mut new_files = Vec::new();
    let mut modified_files = Vec::new();
    let mut user_modified_files = Vec::new();
    let mut deleted_files = Vec::new();

    for (path, source_entry) in &source_map {
        let Some(installed_entry) = installed_map.get(path) else {
            new_files.push(FileChange::new(path.clone(), source_entry.file_type));
            continue;
        };

        let live_path = core_dir.join(path);
        if is_user_modified(&live_path, installed_entry.hash.as_deref()) {
            // The user touched it after install: always preserved, no matter
            // what upstream did.
            user_modified_files.push(
                FileChange::new(path.clone(), source_entry.file_type)
                    .with_reason("User modified since install (on-disk hash differs from installed manifest)"),
            );
        } else if !hashes_match(source_entry.hash.as_deref(), installed_entry.hash.as_deref()) {
            modified_files.push(FileChange::new(path.clone(), source_entry.file_type));
        }
    }

    for (path, installed_entry) in &installed_map {
        if !source_map.contains_key(path) {
            deleted_files.push(FileChange::new(path.clone(), installed_entry.file_type));
        }
    }

    UpgradeReport {
        source_version: source.version.clone(),
        installed_version: installed.installed_version.clone(),
        new_files,
        modified_files,
        user_modified_files,
        deleted_files,
        upgrade_available: upgrade_available(&source.version, &installed.installed_version),
    }
}

fn install_file(source_dir: &Path, core_dir: &Path, path: &str, dry_run: bool) -> Result<()> {
    let src = source_dir.join(path);
    let dest = core_dir.join(path);
    anyhow::ensure!(
        is_path_contained(&dest, core_dir),
        "destination escapes installation root: {path}"
    );
    if dry_run {
        return Ok(());
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    std::fs::copy(&src, &dest)
        .with_context(|| format!("installing {} to {}", src.display(), dest.display()))?;
    Ok(())
}

/// Apply an upgrade plan: new files always, upstream-modified files only on
/// request, user-modified files never.
///
/// With `dry_run` the identical plan is returned and the filesystem is left
/// untouched, so callers can preview the outcome.
#[must_use]
pub fn apply_upgrade(
    report: &UpgradeReport,
    source_dir: &Path,
    target_dir: &Path,
    options: &ApplyOptions,
) -> ApplyOutcome {
    let core_dir = target_dir.join(CORE_DIR);
    let mut outcome = ApplyOutcome {
        success: true,
        ..ApplyOutcome::default()
    };

    for change in &report.new_files {
        match install_file(source_dir, &core_dir, &change.path, options.dry_run) {
            Ok(()) => outcome.files_installed.push(change.clone()),
            Err(err) => {
                outcome.success = false;
                outcome
                    .files_skipped
                    .push(change.clone().with_reason(err.to_string()));
            }
        }
    }

    for change in &report.modified_files {
        if options.include_modified {
            match install_file(source_dir, &core_dir, &change.path, options.dry_run) {
                Ok(()) => outcome.files_installed.push(change.clone()),
                Err(err) => {
                    outcome.success = false;
                    outcome
                        .files_skipped
                        .push(change.clone().with_reason(err.to_string()));
                }
            }
        } else {
            outcome.files_skipped.push(
                change
                    .clone()
                    .with_reason("Upstream modified (pass --include-modified to install)"),
            );
        }
    }

    for change in &report.user_modified_files {
        outcome.files_skipped.push(
            change
                .clone()
                .with_reason("User modified — preserving local changes"),
        );
    }

    outcome
}

/// Write the installed-state manifest that becomes the next upgrade's
/// baseline.
///
/// Records `installed_version` from the source manifest, the install
/// provenance, a timestamp, and the file list with hashes as just applied.
///
/// # Errors
///
/// Returns an error when serialization or the write fails.
pub fn update_installed_manifest(
    target_dir: &Path,
    source: &Manifest,
    installed_from: &str,
) -> Result<()> {
    let installed = InstalledManifest {
        installed_version: source.version.clone(),
        installed_from: Some(installed_from.to_string()),
        installed_at: Some(Utc::now().to_rfc3339()),
        files: source.files.clone(),
    };
    let yaml = serde_yaml::to_string(&installed).context("serializing installed manifest")?;
    let path = target_dir.join(CORE_DIR).join(INSTALLED_MANIFEST_NAME);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    std::fs::write(&path, yaml)
        .with_context(|| format!("writing installed manifest {}", path.display()))?;
    Ok(())
}

/// Render an upgrade report for terminal display.
#[must_use]
pub fn format_upgrade_report(report: &UpgradeReport) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Upgrade check: {} installed, {} available",
        report.installed_version, report.source_version
    );
    let _ = writeln!(
        out,
        "Upgrade available: {}",
        if report.upgrade_available { "Yes" } else { "No" }
    );

    let section = |out: &mut String, title: &str, files: &[FileChange]| {
        if files.is_empty() {
            return;
        }
        let _ = writeln!(out, "\n{title} ({}):", files.len());
        for change in files {
            match (&change.file_type, &change.reason) {
                (Some(t), Some(r)) => {
                    let _ = writeln!(out, "  {} [{t}] — {r}", change.path);
                }
                (Some(t), None) => {
                    let _ = writeln!(out, "  {} [{t}]", change.path);
                }
                (None, Some(r)) => {
                    let _ = writeln!(out, "  {} — {r}", change.path);
                }
                (None, None) => {
                    let _ = writeln!(out, "  {}", change.path);
                }
            }
        }
    };

    section(&mut out, "New Files", &report.new_files);
    section(&mut out, "Modified Files", &report.modified_files);
    section(&mut out, "User Modified Files (preserved)", &report.user_modified_files);
    section(&mut out, "Deleted Upstream (not removed)", &report.deleted_files);

    out
}
