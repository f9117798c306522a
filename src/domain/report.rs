//! Validation and upgrade report types.
//!
//! Reports are plain data: created fresh per pass, immutable once returned,
//! serializable for `--json` output.

use serde::Serialize;

use crate::domain::manifest::FileType;

// ── Validation report ─────────────────────────────────────────────────────────

/// Classification of a single validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueType {
    InvalidManifest,
    SignatureMissing,
    SignatureInvalid,
    SchemaViolation,
    InvalidPath,
    SymlinkRejected,
    MissingFile,
    SizeMismatch,
    HashMismatch,
    HashError,
}

/// How serious an issue is for the install as a whole.
///
/// Any `Critical` issue forces the overall status to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One validation finding.
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Issue {
    /// Build an issue tied to a manifest-relative path.
    #[must_use]
    pub fn for_path(
        issue_type: IssueType,
        severity: Severity,
        relative_path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            issue_type,
            severity,
            relative_path: Some(relative_path.into()),
            message: message.into(),
            details: None,
        }
    }

    /// Build a top-level issue not tied to a single file.
    #[must_use]
    pub fn top_level(
        issue_type: IssueType,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            issue_type,
            severity,
            relative_path: None,
            message: message.into(),
            details: None,
        }
    }

    /// Attach a details string.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Overall outcome of one validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Ok,
    Degraded,
    Failed,
}

/// Per-pass file counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ValidationStats {
    pub valid_files: usize,
    pub missing_files: usize,
    pub corrupted_files: usize,
}

/// Structured result of `PostInstallValidator::validate`.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub manifest_verified: bool,
    pub issues: Vec<Issue>,
    pub stats: ValidationStats,
}

impl ValidationReport {
    /// True when no issue at all was recorded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Iterate issues at `Critical` severity.
    pub fn critical_issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Critical)
    }
}

// ── Repair report ─────────────────────────────────────────────────────────────

/// One repair attempt that could not be completed.
#[derive(Debug, Clone, Serialize)]
pub struct RepairFailure {
    pub path: String,
    pub reason: String,
}

/// Result of a permitted `repair()` run. Refusals never produce this type.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairReport {
    pub success: bool,
    pub repaired: Vec<String>,
    pub failed: Vec<RepairFailure>,
}

// ── Upgrade report ────────────────────────────────────────────────────────────

/// One file slated for (or excluded from) an upgrade.
#[derive(Debug, Clone, Serialize)]
pub struct FileChange {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FileChange {
    #[must_use]
    pub fn new(path: impl Into<String>, file_type: Option<FileType>) -> Self {
        Self {
            path: path.into(),
            file_type,
            reason: None,
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Classification of every file across source manifest, installed manifest,
/// and the live tree. Derived once per upgrade check.
#[derive(Debug, Clone, Serialize)]
pub struct UpgradeReport {
    pub source_version: String,
    pub installed_version: String,
    pub new_files: Vec<FileChange>,
    pub modified_files: Vec<FileChange>,
    pub user_modified_files: Vec<FileChange>,
    pub deleted_files: Vec<FileChange>,
    pub upgrade_available: bool,
}

/// Result of `apply_upgrade`: what was installed and what was skipped.
///
/// With `dry_run` the same plan is returned with no filesystem mutation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyOutcome {
    pub success: bool,
    pub files_installed: Vec<FileChange>,
    pub files_skipped: Vec<FileChange>,
}
