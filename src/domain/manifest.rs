//! Manifest records and per-entry schema validation.
//!
//! A manifest entry is a closed record: every field is validated by name and
//! unknown fields are rejected, so a hostile manifest cannot smuggle extra
//! behavior through later stages. Entries are parsed leniently as YAML values
//! first and promoted to [`FileEntry`] only after validation succeeds.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::error::EntryError;

// ── Well-known paths and limits ───────────────────────────────────────────────

/// Directory holding framework assets inside an installed tree.
pub const CORE_DIR: &str = ".agora-core";

/// Source/shipped manifest file name.
pub const MANIFEST_NAME: &str = "install-manifest.yaml";

/// Local installed-state manifest name (leading dot: unsigned, local record).
pub const INSTALLED_MANIFEST_NAME: &str = ".installed-manifest.yaml";

/// Required prefix for content hashes.
pub const HASH_PREFIX: &str = "sha256:";

/// Limits enforced before any per-file work begins.
///
/// These bound the maximum work a hostile manifest can cause: both are
/// checked against byte sizes (stat results), never character counts.
pub struct SecurityLimits;

impl SecurityLimits {
    /// Maximum manifest file size in bytes (10 MiB).
    pub const MAX_MANIFEST_SIZE: u64 = 10 * 1024 * 1024;
    /// Maximum signature file size in bytes (minisig files are ~200 bytes).
    pub const MAX_SIGNATURE_SIZE: u64 = 10 * 1024;
    /// Maximum number of file entries in one manifest.
    pub const MAX_FILE_COUNT: usize = 10_000;
    /// Maximum length of a manifest-relative path.
    pub const MAX_PATH_LENGTH: usize = 1024;
}

// ── File type classification ──────────────────────────────────────────────────

/// Asset categories a manifest entry may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Agent,
    Task,
    Template,
    Checklist,
    Workflow,
    Code,
    Config,
    Documentation,
}

impl FileType {
    /// Canonical lowercase name, as written in manifests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Task => "task",
            Self::Template => "template",
            Self::Checklist => "checklist",
            Self::Workflow => "workflow",
            Self::Code => "code",
            Self::Config => "config",
            Self::Documentation => "documentation",
        }
    }
}

impl FromStr for FileType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(Self::Agent),
            "task" => Ok(Self::Task),
            "template" => Ok(Self::Template),
            "checklist" => Ok(Self::Checklist),
            "workflow" => Ok(Self::Workflow),
            "code" => Ok(Self::Code),
            "config" => Ok(Self::Config),
            "documentation" => Ok(Self::Documentation),
            _ => Err(()),
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assign a [`FileType`] from a manifest-relative path.
///
/// Directory names win over extensions; this is the classification table a
/// manifest generator applies when emitting entries.
#[must_use]
pub fn classify_file_type(relative_path: &str) -> FileType {
    let path = relative_path.to_lowercase();
    let segment = |name: &str| {
        path.split('/')
            .rev()
            .skip(1)
            .any(|s| s == name)
    };

    if segment("agents") {
        return FileType::Agent;
    }
    if segment("tasks") {
        return FileType::Task;
    }
    if segment("templates") {
        return FileType::Template;
    }
    if segment("checklists") {
        return FileType::Checklist;
    }
    if segment("workflows") {
        return FileType::Workflow;
    }
    if segment("scripts") || segment("tools") || segment("hooks") {
        return FileType::Code;
    }

    match Path::new(&path).extension().and_then(|e| e.to_str()) {
        Some("js" | "ts" | "rs" | "py" | "sh") => FileType::Code,
        Some("yaml" | "yml" | "json" | "toml") => FileType::Config,
        _ => FileType::Documentation,
    }
}

// ── Manifest records ──────────────────────────────────────────────────────────

/// One expected file in an installed tree.
///
/// `hash` carries the `sha256:` prefix; `path` is relative with forward
/// slashes. Unknown fields are rejected at deserialization and again by
/// [`validate_manifest_entry`] for the raw-value path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileEntry {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileType>,
}

/// Treat an explicit YAML `null` the same as an absent field (`files:` with
/// no entries is a null, not an empty sequence).
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Source manifest: shipped with new framework content, normally signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_count: Option<u64>,
    #[serde(default, deserialize_with = "null_default")]
    pub files: Vec<FileEntry>,
}

/// Installed-state manifest: the local, unsigned baseline recording what the
/// last install or upgrade actually placed on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledManifest {
    pub installed_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub files: Vec<FileEntry>,
}

// ── Entry validation ──────────────────────────────────────────────────────────

/// Check a hash string against the required `sha256:<64 lowercase hex>` shape.
#[must_use]
pub fn is_valid_hash_format(hash: &str) -> bool {
    let Some(hex) = hash.strip_prefix(HASH_PREFIX) else {
        return false;
    };
    hex.len() == 64
        && hex
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn validate_entry_path(path: &str) -> Result<(), EntryError> {
    if path.is_empty() {
        return Err(EntryError::EmptyPath);
    }
    if path.len() > SecurityLimits::MAX_PATH_LENGTH {
        return Err(EntryError::PathTooLong {
            max: SecurityLimits::MAX_PATH_LENGTH,
        });
    }
    if path.contains('\0') {
        return Err(EntryError::NulByte);
    }
    let normalized = crate::domain::paths::normalize_separators(path);
    if normalized.starts_with('/') {
        return Err(EntryError::AbsolutePath(path.to_string()));
    }
    if path.contains(':') {
        // Covers both drive-letter absolute paths (C:\...) and alternate
        // data stream markers (file.txt:stream).
        let bytes = path.as_bytes();
        if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
            return Err(EntryError::AbsolutePath(path.to_string()));
        }
        return Err(EntryError::AlternateDataStream(path.to_string()));
    }
    if normalized.split('/').any(|segment| segment == "..") {
        return Err(EntryError::Traversal(path.to_string()));
    }
    Ok(())
}

/// Validate one raw manifest entry against the closed [`FileEntry`] record.
///
/// Returns the sanitized entry (path separators normalized to `/`) or the
/// first violation found. A violating entry is excluded from all later
/// validation steps by the caller.
pub fn validate_manifest_entry(
    value: &serde_yaml::Value,
    index: usize,
) -> Result<FileEntry, EntryError> {
    let serde_yaml::Value::Mapping(map) = value else {
        return Err(EntryError::NotAnObject(index));
    };

    let mut path: Option<String> = None;
    let mut hash: Option<String> = None;
    let mut size: Option<u64> = None;
    let mut file_type: Option<FileType> = None;

    for (key, val) in map {
        let key = key.as_str().unwrap_or_default();
        match key {
            "path" => {
                path = Some(val.as_str().ok_or(EntryError::MissingPath)?.to_string());
            }
            "hash" => {
                if val.is_null() {
                    continue;
                }
                let raw = val.as_str().unwrap_or_default();
                if !is_valid_hash_format(raw) {
                    return Err(EntryError::InvalidHashFormat(raw.to_string()));
                }
                hash = Some(raw.to_string());
            }
            "size" => {
                if val.is_null() {
                    continue;
                }
                size = Some(val.as_u64().ok_or(EntryError::InvalidSize)?);
            }
            "type" => {
                if val.is_null() {
                    continue;
                }
                let raw = val.as_str().unwrap_or_default();
                file_type = Some(
                    FileType::from_str(raw)
                        .map_err(|()| EntryError::InvalidType(raw.to_string()))?,
                );
            }
            other => return Err(EntryError::UnknownField(other.to_string())),
        }
    }

    let path = path.ok_or(EntryError::MissingPath)?;
    validate_entry_path(&path)?;

    Ok(FileEntry {
        path: crate::domain::paths::normalize_separators(&path),
        hash,
        size,
        file_type,
    })
}
