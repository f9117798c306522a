//! Canonical content hashing — the trust primitive every other component
//! relies on.
//!
//! Text files are normalized before hashing (leading BOM stripped, CRLF and
//! lone CR mapped to LF) so two checkouts differing only in line-ending
//! convention hash identically on every platform. Binary files are hashed
//! raw, streamed in 64 KiB chunks.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::domain::error::HashError;
use crate::domain::manifest::HASH_PREFIX;

/// Extensions treated as binary: hashed byte-for-byte, never normalized.
const BINARY_EXTENSIONS: &[&str] = &[
    // archives
    "zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar",
    // images
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp",
    // fonts
    "woff", "woff2", "ttf", "otf", "eot",
    // executables and libraries
    "exe", "dll", "so", "dylib", "bin", "wasm",
    // media
    "mp3", "mp4", "wav", "avi", "mov",
    // documents and databases
    "pdf", "sqlite", "db",
];

/// Metadata for one file, as a manifest generator would record it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Forward-slash relative path from `root`, on every host platform.
    pub path: String,
    /// Content hash with the `sha256:` prefix.
    pub hash: String,
    /// Size in bytes, as stored on disk (pre-normalization).
    pub size: u64,
    pub is_binary: bool,
}

/// Classify a path as binary from its extension alone.
#[must_use]
pub fn is_binary_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            BINARY_EXTENSIONS.contains(&ext.as_str())
        })
}

/// Normalize text content for hashing: strip one leading UTF-8 BOM, then map
/// CRLF and lone CR to LF.
fn normalize_text(bytes: &[u8]) -> Vec<u8> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\r' {
            out.push(b'\n');
            if bytes.get(i + 1) == Some(&b'\n') {
                i += 1;
            }
        } else {
            out.push(bytes[i]);
        }
        i += 1;
    }
    out
}

fn hex_digest(hasher: Sha256) -> String {
    hex_encode(&hasher.finalize())
}

/// Encode bytes as lowercase hex.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(char::from(HEX[(b >> 4) as usize]));
        out.push(char::from(HEX[(b & 0xf) as usize]));
    }
    out
}

fn io_error(path: &Path, source: std::io::Error) -> HashError {
    if source.kind() == std::io::ErrorKind::NotFound {
        HashError::NotFound(path.display().to_string())
    } else {
        HashError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Compute the canonical SHA-256 hex digest of a file.
///
/// # Errors
///
/// Returns [`HashError::NotFound`] for a missing path,
/// [`HashError::IsDirectory`] when the path is a directory, and
/// [`HashError::Io`] for other read failures.
pub fn hash_file(path: &Path) -> Result<String, HashError> {
    let meta = std::fs::metadata(path).map_err(|e| io_error(path, e))?;
    if meta.is_dir() {
        return Err(HashError::IsDirectory(path.display().to_string()));
    }

    if is_binary_path(path) {
        // Raw bytes, streamed: binary assets can be large.
        let mut file = std::fs::File::open(path).map_err(|e| io_error(path, e))?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 65536];
        loop {
            let n = file.read(&mut buf).map_err(|e| io_error(path, e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex_digest(hasher))
    } else {
        let bytes = std::fs::read(path).map_err(|e| io_error(path, e))?;
        let mut hasher = Sha256::new();
        hasher.update(normalize_text(&bytes));
        Ok(hex_digest(hasher))
    }
}

/// Compute the canonical SHA-256 hex digest of a string, with the same text
/// normalization as [`hash_file`].
#[must_use]
pub fn hash_str(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(content.as_bytes()));
    hex_digest(hasher)
}

/// Compare two hash values case-insensitively, tolerating the `sha256:`
/// prefix on either side. Absent inputs never match (fails closed).
#[must_use]
pub fn hashes_match(a: Option<&str>, b: Option<&str>) -> bool {
    let (Some(a), Some(b)) = (a, b) else {
        return false;
    };
    let strip = |h: &str| h.strip_prefix(HASH_PREFIX).unwrap_or(h).to_ascii_lowercase();
    let (a, b) = (strip(a), strip(b));
    !a.is_empty() && a == b
}

/// Compute [`FileMetadata`] for one file under `root`.
///
/// The recorded path is always forward-slash separated, regardless of the
/// host's path separator.
///
/// # Errors
///
/// Propagates [`HashError`] from hashing; returns [`HashError::Io`] when the
/// file does not live under `root`.
pub fn file_metadata(path: &Path, root: &Path) -> Result<FileMetadata, HashError> {
    let relative = path.strip_prefix(root).map_err(|_| HashError::Io {
        path: path.display().to_string(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("not under root {}", root.display()),
        ),
    })?;

    let meta = std::fs::metadata(path).map_err(|e| io_error(path, e))?;
    if meta.is_dir() {
        return Err(HashError::IsDirectory(path.display().to_string()));
    }

    let rel = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    Ok(FileMetadata {
        path: rel,
        hash: format!("{HASH_PREFIX}{}", hash_file(path)?),
        size: meta.len(),
        is_binary: is_binary_path(path),
    })
}
