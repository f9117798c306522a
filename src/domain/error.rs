//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`, or
//! `crate::output`. All error types implement `thiserror::Error` and convert
//! to `anyhow::Error` via the `?` operator.

use thiserror::Error;

// ── Hashing errors ────────────────────────────────────────────────────────────

/// Errors raised by the canonical hasher.
///
/// A missing path and a directory target are distinguishable so callers can
/// map them onto different validation issues.
#[derive(Debug, Error)]
pub enum HashError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("cannot hash a directory: {0}")]
    IsDirectory(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ── Manifest loading errors ───────────────────────────────────────────────────

/// Errors from the signed-manifest loader.
///
/// These are the loader's structured failure results: callers match on the
/// variant and degrade gracefully instead of crashing an install.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Manifest file not found: {0}")]
    ManifestNotFound(String),

    #[error("Manifest file exceeds maximum size ({limit} bytes)")]
    ManifestTooLarge { limit: u64 },

    #[error("Manifest signature file not found (.minisig)")]
    SignatureMissing,

    #[error("Signature file exceeds maximum size ({limit} bytes)")]
    SignatureTooLarge { limit: u64 },

    #[error("Invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    #[error("Signature verification failed: {0}")]
    VerificationFailed(String),

    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ── Manifest entry validation errors ──────────────────────────────────────────

/// Per-entry schema violations found while validating a manifest entry.
///
/// Each variant names the specific violation so reports stay actionable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntryError {
    #[error("entry {0} is not an object")]
    NotAnObject(usize),

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("missing required field 'path'")]
    MissingPath,

    #[error("path is empty")]
    EmptyPath,

    #[error("path contains '..' segment: {0}")]
    Traversal(String),

    #[error("path contains null byte")]
    NulByte,

    #[error("absolute path not permitted: {0}")]
    AbsolutePath(String),

    #[error("path contains alternate data stream marker: {0}")]
    AlternateDataStream(String),

    #[error("path exceeds maximum length ({max} chars)")]
    PathTooLong { max: usize },

    #[error("invalid hash format '{0}' (expected sha256:<64 lowercase hex>)")]
    InvalidHashFormat(String),

    #[error("size must be a non-negative integer")]
    InvalidSize,

    #[error("invalid type '{0}'")]
    InvalidType(String),
}

// ── Repair authorization errors ───────────────────────────────────────────────

/// Refusals returned by `repair()` before any I/O is performed.
///
/// Each precondition gets its own variant so the operator sees exactly which
/// trust prerequisite is missing.
#[derive(Debug, Error)]
pub enum RepairRefused {
    #[error("repair requires hash verification (run validation with verify_hashes enabled)")]
    HashVerificationDisabled,

    #[error("repair requires a verified manifest (signature verification did not succeed)")]
    ManifestNotVerified,

    #[error("repair requires a trusted source tree (no source directory configured)")]
    NoSourceTree,

    #[error("repair requires a prior validation pass")]
    NotValidated,
}
