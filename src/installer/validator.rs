//! Post-install validation — walks a signed manifest against the real
//! installed tree and reports every deviation.
//!
//! One `validate()` call is one pass: load and verify the manifest, enforce
//! resource ceilings, validate every entry against the closed schema, check
//! containment and symlinks, then existence and content. The pass always
//! runs to completion so operators see the whole picture, and the returned
//! report is immutable.
//!
//! `repair()` reuses the last pass's findings and is refused outright unless
//! the trust prerequisites hold.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::error::{EntryError, HashError, LoadError, RepairRefused};
use crate::domain::manifest::{
    CORE_DIR, FileEntry, MANIFEST_NAME, SecurityLimits, validate_manifest_entry,
};
use crate::domain::paths::is_path_contained;
use crate::domain::report::{
    Issue, IssueType, RepairFailure, RepairReport, Severity, ValidationReport, ValidationStats,
    ValidationStatus,
};
use crate::infra::hasher::{hash_file, hashes_match};
use crate::infra::signature::{LoadOptions, PinnedKey, load_and_verify_manifest};

/// Validation strictness for one validator instance.
#[derive(Debug, Clone, Copy)]
pub struct ValidatorOptions {
    /// Fail when the manifest signature is missing or invalid. Production
    /// installs keep this on.
    pub require_signature: bool,
    /// Full mode verifies content hashes; quick mode compares sizes only.
    pub verify_hashes: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            require_signature: true,
            verify_hashes: true,
        }
    }
}

/// Lenient top-level manifest shape. Entries stay raw YAML values until the
/// closed-record validation has passed.
#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    #[allow(dead_code)] // parsed for shape-checking; version policy is the upgrader's concern
    version: Option<String>,
    #[serde(default)]
    files: Option<Vec<serde_yaml::Value>>,
}

/// A source file whose hash has been verified against the manifest.
///
/// The only constructor is [`VerifiedSource::verify`], so holding a value
/// proves the verify-then-copy precondition: a repair copy cannot be
/// expressed without the check having passed.
pub struct VerifiedSource {
    path: PathBuf,
}

impl VerifiedSource {
    /// Hash `candidate` and require equality with `expected_hash`.
    ///
    /// # Errors
    ///
    /// Returns an error when the candidate cannot be hashed or its hash
    /// disagrees with the manifest.
    pub fn verify(candidate: &Path, expected_hash: &str) -> Result<Self> {
        let actual = hash_file(candidate)
            .with_context(|| format!("cannot hash source file {}", candidate.display()))?;
        anyhow::ensure!(
            hashes_match(Some(&actual), Some(expected_hash)),
            "source file hash does not match manifest for {}",
            candidate.display()
        );
        Ok(Self {
            path: candidate.to_path_buf(),
        })
    }

    /// Copy the verified source to `dest`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error when the copy or directory creation fails.
    pub fn install_to(&self, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        std::fs::copy(&self.path, dest)
            .with_context(|| format!("copying {} to {}", self.path.display(), dest.display()))?;
        Ok(())
    }
}

/// Validates an installed tree against its manifest and optionally repairs
/// missing or corrupted files from a trusted source tree.
pub struct PostInstallValidator {
    target_root: PathBuf,
    source_root: Option<PathBuf>,
    options: ValidatorOptions,
    pinned_key: Option<PinnedKey>,
    entries: Vec<FileEntry>,
    issues: Vec<Issue>,
    stats: ValidationStats,
    manifest_verified: bool,
    validated: bool,
}

impl PostInstallValidator {
    /// Create a validator for `target_root`. `source_root`, when given, is
    /// the trusted tree `repair()` copies from.
    #[must_use]
    pub fn new(
        target_root: impl Into<PathBuf>,
        source_root: Option<PathBuf>,
        options: ValidatorOptions,
    ) -> Self {
        Self {
            target_root: target_root.into(),
            source_root,
            options,
            pinned_key: None,
            entries: Vec::new(),
            issues: Vec::new(),
            stats: ValidationStats::default(),
            manifest_verified: false,
            validated: false,
        }
    }

    /// Override the pinned verification key (test seam).
    #[must_use]
    pub fn with_pinned_key(mut self, key: PinnedKey) -> Self {
        self.pinned_key = Some(key);
        self
    }

    /// Path of the manifest this validator checks.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.target_root.join(CORE_DIR).join(MANIFEST_NAME)
    }

    fn core_dir(&self) -> PathBuf {
        self.target_root.join(CORE_DIR)
    }

    // ── Validation pass ──────────────────────────────────────────────────────

    /// Run one full validation pass and return a fresh report.
    pub fn validate(&mut self) -> ValidationReport {
        self.entries.clear();
        self.issues.clear();
        self.stats = ValidationStats::default();
        self.manifest_verified = false;
        self.validated = true;

        let load_options = LoadOptions {
            require_signature: self.options.require_signature,
            pinned_key: self.pinned_key,
        };
        let loaded = match load_and_verify_manifest(&self.manifest_path(), &load_options) {
            Ok(loaded) => loaded,
            Err(err) => {
                self.issues.push(load_error_issue(&err));
                return self.finish();
            }
        };
        self.manifest_verified = loaded.verified;

        // Size ceiling is measured in bytes: multi-byte text cannot smuggle
        // an oversized payload past a character count.
        let byte_len = u64::try_from(loaded.bytes.len()).unwrap_or(u64::MAX);
        if byte_len > SecurityLimits::MAX_MANIFEST_SIZE {
            self.issues.push(
                Issue::top_level(
                    IssueType::InvalidManifest,
                    Severity::Critical,
                    "Manifest file exceeds maximum size",
                )
                .with_details(format!(
                    "{byte_len} bytes exceeds the {} byte limit",
                    SecurityLimits::MAX_MANIFEST_SIZE
                )),
            );
            return self.finish();
        }

        let raw: RawManifest = match serde_yaml::from_slice(&loaded.bytes) {
            Ok(raw) => raw,
            Err(err) => {
                self.issues.push(
                    Issue::top_level(
                        IssueType::InvalidManifest,
                        Severity::Critical,
                        "Failed to parse manifest",
                    )
                    .with_details(err.to_string()),
                );
                return self.finish();
            }
        };

        let raw_files = raw.files.unwrap_or_default();
        if raw_files.len() > SecurityLimits::MAX_FILE_COUNT {
            self.issues.push(
                Issue::top_level(
                    IssueType::InvalidManifest,
                    Severity::Critical,
                    "Manifest rejected",
                )
                .with_details(format!(
                    "too many files: {} exceeds the maximum of {}",
                    raw_files.len(),
                    SecurityLimits::MAX_FILE_COUNT
                )),
            );
            return self.finish();
        }

        for (index, value) in raw_files.iter().enumerate() {
            match validate_manifest_entry(value, index) {
                Ok(entry) => self.check_entry(entry),
                Err(err) => self.issues.push(entry_error_issue(value, index, &err)),
            }
        }

        self.finish()
    }

    /// Steps 3-5 for one schema-valid entry: containment, symlink,
    /// existence, content.
    fn check_entry(&mut self, entry: FileEntry) {
        let core_dir = self.core_dir();
        let resolved = core_dir.join(&entry.path);

        if !is_path_contained(&resolved, &core_dir) {
            self.issues.push(Issue::for_path(
                IssueType::InvalidPath,
                Severity::Critical,
                entry.path.clone(),
                format!("Path escapes installation root: {}", entry.path),
            ));
            self.entries.push(entry);
            return;
        }

        let meta = match std::fs::symlink_metadata(&resolved) {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.stats.missing_files += 1;
                self.issues.push(Issue::for_path(
                    IssueType::MissingFile,
                    Severity::High,
                    entry.path.clone(),
                    format!("Missing file: {}", entry.path),
                ));
                self.entries.push(entry);
                return;
            }
            Err(err) => {
                self.stats.corrupted_files += 1;
                self.issues.push(
                    Issue::for_path(
                        IssueType::HashError,
                        Severity::High,
                        entry.path.clone(),
                        format!("Cannot stat file: {}", entry.path),
                    )
                    .with_details(err.to_string()),
                );
                self.entries.push(entry);
                return;
            }
            Ok(meta) => meta,
        };

        // Never follow symlinks: a link inside the tree can point anywhere.
        if meta.file_type().is_symlink() {
            self.issues.push(Issue::for_path(
                IssueType::SymlinkRejected,
                Severity::Critical,
                entry.path.clone(),
                format!("Symbolic link rejected: {}", entry.path),
            ));
            self.entries.push(entry);
            return;
        }

        if meta.is_dir() {
            self.stats.corrupted_files += 1;
            self.issues.push(Issue::for_path(
                IssueType::InvalidPath,
                Severity::Critical,
                entry.path.clone(),
                format!("Expected a file but found a directory: {}", entry.path),
            ));
            self.entries.push(entry);
            return;
        }

        if self.options.verify_hashes {
            self.check_hash(&entry, &resolved);
        } else {
            self.check_size(&entry, meta.len());
        }
        self.entries.push(entry);
    }

    /// Quick mode: size-only comparison. Entries without a recorded size
    /// cannot be checked at all, which is itself a violation.
    fn check_size(&mut self, entry: &FileEntry, actual: u64) {
        let Some(expected) = entry.size else {
            self.stats.corrupted_files += 1;
            self.issues.push(
                Issue::for_path(
                    IssueType::SchemaViolation,
                    Severity::High,
                    entry.path.clone(),
                    format!("Missing size in manifest for {}", entry.path),
                )
                .with_details("Quick mode requires a recorded size for every entry"),
            );
            return;
        };
        if expected == actual {
            self.stats.valid_files += 1;
        } else {
            self.stats.corrupted_files += 1;
            self.issues.push(
                Issue::for_path(
                    IssueType::SizeMismatch,
                    Severity::High,
                    entry.path.clone(),
                    format!("Size mismatch for {}", entry.path),
                )
                .with_details(format!("expected {expected} bytes, found {actual} bytes")),
            );
        }
    }

    /// Full mode: content-hash comparison via the canonical hasher. Hashing
    /// I/O errors are converted into issues, never skipped.
    fn check_hash(&mut self, entry: &FileEntry, resolved: &Path) {
        let Some(expected) = entry.hash.as_deref() else {
            self.stats.corrupted_files += 1;
            self.issues.push(
                Issue::for_path(
                    IssueType::SchemaViolation,
                    Severity::High,
                    entry.path.clone(),
                    format!("Missing hash in manifest for {}", entry.path),
                )
                .with_details("Hash verification enabled but the manifest records no hash"),
            );
            return;
        };

        match hash_file(resolved) {
            Ok(actual) if hashes_match(Some(&actual), Some(expected)) => {
                self.stats.valid_files += 1;
            }
            Ok(actual) => {
                self.stats.corrupted_files += 1;
                self.issues.push(
                    Issue::for_path(
                        IssueType::HashMismatch,
                        Severity::Critical,
                        entry.path.clone(),
                        format!("Hash mismatch for {}", entry.path),
                    )
                    .with_details(format!("expected {expected}, found sha256:{actual}")),
                );
            }
            Err(HashError::IsDirectory(_)) => {
                self.stats.corrupted_files += 1;
                self.issues.push(Issue::for_path(
                    IssueType::InvalidPath,
                    Severity::Critical,
                    entry.path.clone(),
                    format!("Expected a file but found a directory: {}", entry.path),
                ));
            }
            Err(err) => {
                self.stats.corrupted_files += 1;
                self.issues.push(
                    Issue::for_path(
                        IssueType::HashError,
                        Severity::High,
                        entry.path.clone(),
                        format!("Failed to hash {}", entry.path),
                    )
                    .with_details(err.to_string()),
                );
            }
        }
    }

    fn finish(&mut self) -> ValidationReport {
        let has_critical = self
            .issues
            .iter()
            .any(|i| i.severity == Severity::Critical);
        let status = if has_critical {
            ValidationStatus::Failed
        } else if self.issues.is_empty() {
            ValidationStatus::Ok
        } else {
            ValidationStatus::Degraded
        };
        ValidationReport {
            status,
            manifest_verified: self.manifest_verified,
            issues: self.issues.clone(),
            stats: self.stats,
        }
    }

    // ── Repair ───────────────────────────────────────────────────────────────

    /// Repair missing/corrupted files found by the last `validate()` pass,
    /// copying from the trusted source tree.
    ///
    /// Refused before any I/O unless hash verification was enabled and the
    /// manifest satisfied the signature policy of the last pass. Each
    /// candidate is hashed and must equal the manifest's recorded hash
    /// before it is copied; one failure never aborts the batch.
    ///
    /// # Errors
    ///
    /// Returns [`RepairRefused`] naming the missing trust prerequisite.
    pub fn repair(&mut self) -> Result<RepairReport, RepairRefused> {
        if !self.options.verify_hashes {
            return Err(RepairRefused::HashVerificationDisabled);
        }
        if !self.validated {
            return Err(RepairRefused::NotValidated);
        }
        if self.options.require_signature && !self.manifest_verified {
            return Err(RepairRefused::ManifestNotVerified);
        }
        let source_root = self
            .source_root
            .clone()
            .ok_or(RepairRefused::NoSourceTree)?;

        let repairable: Vec<String> = self
            .issues
            .iter()
            .filter(|i| {
                matches!(
                    i.issue_type,
                    IssueType::MissingFile
                        | IssueType::SizeMismatch
                        | IssueType::HashMismatch
                        | IssueType::HashError
                )
            })
            .filter_map(|i| i.relative_path.clone())
            .collect();

        let mut report = RepairReport::default();
        for path in repairable {
            match self.repair_one(&source_root, &path) {
                Ok(()) => report.repaired.push(path),
                Err(reason) => report.failed.push(RepairFailure {
                    path,
                    reason: reason.to_string(),
                }),
            }
        }
        report.success = report.failed.is_empty();
        Ok(report)
    }

    fn repair_one(&self, source_root: &Path, path: &str) -> Result<()> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.path == path)
            .with_context(|| format!("{path} is not present in the manifest"))?;
        let expected = entry
            .hash
            .as_deref()
            .with_context(|| format!("manifest records no hash for {path}"))?;

        let candidate = source_root.join(CORE_DIR).join(path);
        let dest = self.core_dir().join(path);
        anyhow::ensure!(
            is_path_contained(&candidate, &source_root.join(CORE_DIR))
                && is_path_contained(&dest, &self.core_dir()),
            "repair path escapes its root: {path}"
        );

        // Verify-then-copy: the copy cannot happen without a VerifiedSource.
        let source = VerifiedSource::verify(&candidate, expected)?;
        source.install_to(&dest)
    }
}

fn load_error_issue(err: &LoadError) -> Issue {
    match err {
        LoadError::SignatureMissing => Issue::top_level(
            IssueType::SignatureMissing,
            Severity::Critical,
            err.to_string(),
        ),
        LoadError::InvalidSignatureFormat(_) | LoadError::VerificationFailed(_) => {
            Issue::top_level(IssueType::SignatureInvalid, Severity::Critical, err.to_string())
        }
        LoadError::ManifestTooLarge { limit } => Issue::top_level(
            IssueType::InvalidManifest,
            Severity::Critical,
            "Manifest file exceeds maximum size",
        )
        .with_details(format!("size limit is {limit} bytes, checked before reading")),
        LoadError::SignatureTooLarge { limit } => Issue::top_level(
            IssueType::InvalidManifest,
            Severity::Critical,
            "Signature file exceeds maximum size",
        )
        .with_details(format!("size limit is {limit} bytes, checked before reading")),
        LoadError::ManifestNotFound(_) | LoadError::Io { .. } => Issue::top_level(
            IssueType::InvalidManifest,
            Severity::Critical,
            err.to_string(),
        ),
    }
}

fn entry_error_issue(value: &serde_yaml::Value, index: usize, err: &EntryError) -> Issue {
    let relative_path = value
        .get("path")
        .and_then(serde_yaml::Value::as_str)
        .map(ToString::to_string);
    let issue_type = match err {
        EntryError::Traversal(_)
        | EntryError::NulByte
        | EntryError::AbsolutePath(_)
        | EntryError::AlternateDataStream(_)
        | EntryError::PathTooLong { .. }
        | EntryError::EmptyPath => IssueType::InvalidPath,
        _ => IssueType::SchemaViolation,
    };
    let severity = if issue_type == IssueType::InvalidPath {
        Severity::Critical
    } else {
        Severity::High
    };
    Issue {
        issue_type,
        severity,
        relative_path,
        message: format!("Invalid manifest entry {index}: {err}"),
        details: None,
    }
}
