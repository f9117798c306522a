//! Signed-manifest loading — minisign-compatible detached signatures over
//! install manifests.
//!
//! Manifests are attacker-influenced input: both the manifest and its
//! signature file are stat'd and bounded *before* any byte is read, and the
//! signature container layout is checked before Ed25519 verification is
//! attempted. Signing happens offline in the release pipeline:
//!
//! ```text
//! minisign -Sm install-manifest.yaml -s agora-release.key
//! ```
//!
//! which produces the sibling `install-manifest.yaml.minisig`.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::domain::error::LoadError;
use crate::domain::manifest::SecurityLimits;
use crate::infra::hasher::hex_encode;

/// Detached signature file suffix.
pub const SIGNATURE_SUFFIX: &str = ".minisig";

/// Minimum decoded signature blob: 2-byte algorithm + 8-byte key id +
/// 64-byte Ed25519 signature.
const MIN_SIGNATURE_BLOB_LEN: usize = 74;

/// Embedded ed25519 public key (base64) for verifying signed manifests.
///
/// The corresponding private key lives only in the release pipeline. This is
/// the root of trust for manifest verification and is never loaded from
/// files or the environment.
pub const AGORA_PUBLIC_KEY_B64: &str = "11qYAYKxCrfVS/7TyWQHOg7hcvPapiMlrwIaaPcHURo=";

/// Key id carried in release signatures, compared as raw bytes.
pub const AGORA_KEY_ID: [u8; 8] = *b"AGORA001";

// ── Pinned key ────────────────────────────────────────────────────────────────

/// A pinned verification key: 8-byte key id plus 32-byte Ed25519 public key.
#[derive(Debug, Clone, Copy)]
pub struct PinnedKey {
    pub key_id: [u8; 8],
    pub public_key: [u8; 32],
}

impl PinnedKey {
    /// The production release key compiled into the binary.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::VerificationFailed`] if the embedded constant is
    /// not a well-formed 32-byte key (a build defect, not a runtime input).
    pub fn production() -> Result<Self, LoadError> {
        let bytes = BASE64
            .decode(AGORA_PUBLIC_KEY_B64)
            .map_err(|e| LoadError::VerificationFailed(format!("embedded public key: {e}")))?;
        let public_key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| LoadError::VerificationFailed("embedded public key must be 32 bytes".into()))?;
        Ok(Self {
            key_id: AGORA_KEY_ID,
            public_key,
        })
    }
}

// ── Container parsing ─────────────────────────────────────────────────────────

/// Parsed minisign signature container.
///
/// Layout: line 1 untrusted comment, line 2 base64 signature blob, optional
/// line 3 trusted comment and line 4 base64 global signature over
/// (signature bytes ‖ trusted comment).
#[derive(Debug, Clone)]
pub struct SignatureContainer {
    pub algorithm: [u8; 2],
    pub key_id: [u8; 8],
    pub signature: [u8; 64],
    pub trusted_comment: Option<String>,
    pub global_signature: Option<[u8; 64]>,
}

fn format_err(msg: impl Into<String>) -> LoadError {
    LoadError::InvalidSignatureFormat(msg.into())
}

/// Parse a `.minisig` container.
///
/// Every layout deviation is rejected here, before any semantic
/// verification is attempted.
///
/// # Errors
///
/// Returns [`LoadError::InvalidSignatureFormat`] naming the deviation.
pub fn parse_signature_container(content: &str) -> Result<SignatureContainer, LoadError> {
    let lines: Vec<&str> = content.trim().lines().collect();

    if lines.len() < 2 {
        return Err(format_err("insufficient lines"));
    }
    if !lines[0].starts_with("untrusted comment:") {
        return Err(format_err("missing untrusted comment"));
    }

    let blob = BASE64
        .decode(lines[1].trim())
        .map_err(|e| format_err(format!("signature blob is not valid base64: {e}")))?;
    if blob.len() < MIN_SIGNATURE_BLOB_LEN {
        return Err(format_err("signature too short"));
    }

    let algorithm = [blob[0], blob[1]];
    let mut key_id = [0u8; 8];
    key_id.copy_from_slice(&blob[2..10]);
    let mut signature = [0u8; 64];
    signature.copy_from_slice(&blob[10..74]);

    let mut trusted_comment = None;
    let mut global_signature = None;
    if lines.len() >= 4 && lines[2].starts_with("trusted comment:") {
        trusted_comment = Some(lines[2]["trusted comment:".len()..].trim().to_string());
        let global = BASE64
            .decode(lines[3].trim())
            .map_err(|e| format_err(format!("global signature is not valid base64: {e}")))?;
        let global: [u8; 64] = global.try_into().map_err(|g: Vec<u8>| {
            format_err(format!(
                "invalid global signature length: expected 64 bytes, got {}",
                g.len()
            ))
        })?;
        global_signature = Some(global);
    }

    Ok(SignatureContainer {
        algorithm,
        key_id,
        signature,
        trusted_comment,
        global_signature,
    })
}

// ── Verification ──────────────────────────────────────────────────────────────

fn verify_ed25519(message: &[u8], signature: &[u8; 64], public_key: &[u8; 32]) -> Result<(), LoadError> {
    let key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| LoadError::VerificationFailed(format!("invalid public key: {e}")))?;
    key.verify(message, &Signature::from_bytes(signature))
        .map_err(|_| LoadError::VerificationFailed("signature does not match manifest content".into()))
}

/// Verify a manifest's detached signature against a pinned key.
///
/// The manifest content must be treated as untrusted bytes until this
/// returns `Ok` — callers parse YAML only afterwards.
///
/// # Errors
///
/// Returns [`LoadError::InvalidSignatureFormat`] for container-layout
/// deviations and [`LoadError::VerificationFailed`] for algorithm, key-id,
/// or signature mismatches.
pub fn verify_manifest_signature(
    manifest: &[u8],
    signature_content: &str,
    key: &PinnedKey,
) -> Result<(), LoadError> {
    let container = parse_signature_container(signature_content)?;

    // Minisign tags pure Ed25519 as "Ed" and Blake2b-prehashed as "ED".
    // Agora's release signer emits pure mode only.
    match &container.algorithm {
        b"Ed" => {}
        b"ED" => {
            return Err(LoadError::VerificationFailed(
                "unsupported signature algorithm 'ED' (prehashed signatures are not accepted)"
                    .into(),
            ));
        }
        other => {
            return Err(LoadError::VerificationFailed(format!(
                "unsupported signature algorithm '{}'",
                String::from_utf8_lossy(other)
            )));
        }
    }

    if container.key_id != key.key_id {
        return Err(LoadError::VerificationFailed(format!(
            "key ID mismatch: expected {}, got {}",
            hex_encode(&key.key_id),
            hex_encode(&container.key_id)
        )));
    }

    verify_ed25519(manifest, &container.signature, &key.public_key)?;

    if let (Some(comment), Some(global)) = (&container.trusted_comment, &container.global_signature)
    {
        let mut message = container.signature.to_vec();
        message.extend_from_slice(comment.as_bytes());
        verify_ed25519(&message, global, &key.public_key).map_err(|_| {
            LoadError::VerificationFailed("trusted comment signature does not match".into())
        })?;
    }

    Ok(())
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Options for [`load_and_verify_manifest`].
pub struct LoadOptions {
    /// Fail when the signature file is missing. Production installs keep
    /// this on; `false` is the explicit development-mode escape hatch.
    pub require_signature: bool,
    /// Override the pinned key (test seam only).
    pub pinned_key: Option<PinnedKey>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            require_signature: true,
            pinned_key: None,
        }
    }
}

/// A successfully loaded manifest: raw bytes plus whether a signature was
/// actually verified (development mode loads report `verified = false`).
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub bytes: Vec<u8>,
    pub verified: bool,
}

/// Path of the detached signature sibling for a manifest.
#[must_use]
pub fn signature_path(manifest_path: &Path) -> PathBuf {
    let mut os = manifest_path.as_os_str().to_owned();
    os.push(SIGNATURE_SUFFIX);
    PathBuf::from(os)
}

/// True when a detached signature exists next to the manifest.
#[must_use]
pub fn signature_exists(manifest_path: &Path) -> bool {
    signature_path(manifest_path).exists()
}

fn stat_len(path: &Path) -> Result<Option<u64>, LoadError> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LoadError::Io {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, LoadError> {
    std::fs::read(path).map_err(|e| LoadError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Load a manifest and verify its detached signature.
///
/// Size limits are enforced from `stat` results *before* either file is
/// read, bounding the work a hostile input can cause. When
/// `require_signature` is false a missing signature file is tolerated
/// (`verified = false`); a signature file that exists is still fully
/// checked.
///
/// # Errors
///
/// Returns a [`LoadError`] variant describing the failure; callers degrade
/// gracefully instead of aborting an install.
pub fn load_and_verify_manifest(
    manifest_path: &Path,
    options: &LoadOptions,
) -> Result<LoadedManifest, LoadError> {
    let Some(manifest_len) = stat_len(manifest_path)? else {
        return Err(LoadError::ManifestNotFound(
            manifest_path.display().to_string(),
        ));
    };
    if manifest_len > SecurityLimits::MAX_MANIFEST_SIZE {
        return Err(LoadError::ManifestTooLarge {
            limit: SecurityLimits::MAX_MANIFEST_SIZE,
        });
    }

    let sig_path = signature_path(manifest_path);
    let Some(sig_len) = stat_len(&sig_path)? else {
        if options.require_signature {
            return Err(LoadError::SignatureMissing);
        }
        // Development mode: unsigned manifests load, but stay unverified.
        return Ok(LoadedManifest {
            bytes: read_bytes(manifest_path)?,
            verified: false,
        });
    };
    if sig_len > SecurityLimits::MAX_SIGNATURE_SIZE {
        return Err(LoadError::SignatureTooLarge {
            limit: SecurityLimits::MAX_SIGNATURE_SIZE,
        });
    }

    let manifest_bytes = read_bytes(manifest_path)?;
    let signature_content = String::from_utf8_lossy(&read_bytes(&sig_path)?).into_owned();

    let key = match options.pinned_key {
        Some(key) => key,
        None => PinnedKey::production()?,
    };
    verify_manifest_signature(&manifest_bytes, &signature_content, &key)?;

    Ok(LoadedManifest {
        bytes: manifest_bytes,
        verified: true,
    })
}
