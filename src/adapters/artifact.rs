//! Artifact integrity: manifest-bound, optionally signed model directories.
//!
//! Every artifact directory carries a `manifest.json` that binds each model
//! file to its SHA-256 digest. A detached Ed25519 signature over the manifest
//! bytes (`manifest.sig`) authenticates the manifest itself.
//!
//! # Security
//!
//! - Files not listed in the manifest cannot be read through a verified directory
//! - Digest mismatches are fatal (corrupt or tampered artifact)
//! - With `require_signature`, an unsigned or badly signed manifest is fatal
//! - Manifests dated in the future (beyond clock skew) are refused

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Manifest file name inside an artifact directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Detached signature file name inside an artifact directory.
pub const SIGNATURE_FILE: &str = "manifest.sig";

/// Only manifest version understood by this loader.
pub const MANIFEST_VERSION: u32 = 1;

/// Allowed clock skew for `created_at`, in seconds.
const MAX_CLOCK_SKEW_SECS: i64 = 300;

/// Errors raised while loading model artifacts. All of them are fatal at
/// startup.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid artifact format in {path:?}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Signature verification failed: {0}")]
    Signature(String),

    #[error("Artifact does not match the {schema} schema: {reason}")]
    Schema { schema: String, reason: String },
}

/// Signed content of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub version: u32,
    /// Unix timestamp (seconds) of manifest creation
    pub created_at: i64,
    /// Random 16-byte nonce (base64) making each manifest unique
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce_b64: Option<String>,
    /// Relative file path -> lowercase SHA-256 hex
    pub files: BTreeMap<String, String>,
}

impl ArtifactManifest {
    /// Build a manifest binding `files` (relative to `dir`).
    ///
    /// # Errors
    /// Returns `ArtifactError::Io` if a file cannot be read.
    pub fn for_files(
        dir: &Path,
        files: &[&str],
        created_at: i64,
        nonce_b64: Option<String>,
    ) -> Result<Self, ArtifactError> {
        let mut bound = BTreeMap::new();
        for rel in files {
            let path = dir.join(rel);
            let bytes = fs::read(&path).map_err(|source| ArtifactError::Io { path, source })?;
            bound.insert((*rel).to_string(), sha256_hex(&bytes));
        }
        Ok(Self {
            version: MANIFEST_VERSION,
            created_at,
            nonce_b64,
            files: bound,
        })
    }
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Current Unix time in seconds.
#[must_use]
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

/// Opens artifact directories after checking their manifest.
#[derive(Debug, Clone)]
pub struct ArtifactVerifier {
    verifying_key: Option<VerifyingKey>,
    require_signature: bool,
}

impl ArtifactVerifier {
    #[must_use]
    pub fn new(verifying_key: Option<VerifyingKey>, require_signature: bool) -> Self {
        Self {
            verifying_key,
            require_signature,
        }
    }

    /// Build a verifier from a base64-encoded Ed25519 public key.
    ///
    /// # Errors
    /// Returns `ArtifactError::Signature` if the key is malformed.
    pub fn from_public_key_b64(b64: &str, require_signature: bool) -> Result<Self, ArtifactError> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(b64.trim())
            .map_err(|e| ArtifactError::Signature(format!("public key is not valid base64: {e}")))?;
        let bytes: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| ArtifactError::Signature("public key must be 32 bytes".into()))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| ArtifactError::Signature(format!("invalid public key: {e}")))?;
        Ok(Self::new(Some(key), require_signature))
    }

    /// Read and verify the manifest of `dir`.
    ///
    /// # Errors
    /// Returns error if the manifest is missing, malformed, future-dated, or
    /// fails signature policy, or if any bound file fails its digest check.
    pub fn open(&self, dir: &Path) -> Result<VerifiedArtifactDir, ArtifactError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest_bytes = fs::read(&manifest_path).map_err(|source| ArtifactError::Io {
            path: manifest_path.clone(),
            source,
        })?;

        self.check_signature(dir, &manifest_bytes)?;

        let manifest: ArtifactManifest =
            serde_json::from_slice(&manifest_bytes).map_err(|e| ArtifactError::Format {
                path: manifest_path.clone(),
                reason: e.to_string(),
            })?;

        if manifest.version != MANIFEST_VERSION {
            return Err(ArtifactError::Format {
                path: manifest_path,
                reason: format!("unsupported manifest version {}", manifest.version),
            });
        }
        if manifest.created_at > unix_now() + MAX_CLOCK_SKEW_SECS {
            return Err(ArtifactError::Integrity(
                "manifest created_at is in the future".into(),
            ));
        }
        if manifest.files.is_empty() {
            return Err(ArtifactError::Integrity("manifest binds no files".into()));
        }

        // Check every bound file up front so a corrupt directory fails as a whole.
        for (rel, expected) in &manifest.files {
            let path = dir.join(rel);
            let bytes = fs::read(&path).map_err(|source| ArtifactError::Io { path, source })?;
            if !constant_time_eq(&sha256_hex(&bytes), expected) {
                return Err(ArtifactError::Integrity(format!(
                    "digest mismatch for {rel}"
                )));
            }
        }

        tracing::info!(
            "Verified artifact manifest in {:?} ({} files)",
            dir,
            manifest.files.len()
        );

        Ok(VerifiedArtifactDir {
            dir: dir.to_path_buf(),
            manifest,
        })
    }

    fn check_signature(&self, dir: &Path, manifest_bytes: &[u8]) -> Result<(), ArtifactError> {
        let sig_path = dir.join(SIGNATURE_FILE);

        if !sig_path.exists() {
            if self.require_signature {
                return Err(ArtifactError::Signature(format!(
                    "{SIGNATURE_FILE} not found in {dir:?}; signed artifacts are required"
                )));
            }
            tracing::warn!("Loading UNSIGNED artifacts from {:?}", dir);
            return Ok(());
        }

        let Some(key) = &self.verifying_key else {
            if self.require_signature {
                return Err(ArtifactError::Signature(
                    "artifacts are signed but no public key is configured".into(),
                ));
            }
            tracing::warn!(
                "Artifacts in {:?} are signed but no public key is configured; signature not checked",
                dir
            );
            return Ok(());
        };

        let sig_bytes = fs::read(&sig_path).map_err(|source| ArtifactError::Io {
            path: sig_path.clone(),
            source,
        })?;
        let sig_bytes: [u8; 64] = sig_bytes
            .as_slice()
            .try_into()
            .map_err(|_| ArtifactError::Signature("signature must be 64 bytes".into()))?;

        key.verify(manifest_bytes, &Signature::from_bytes(&sig_bytes))
            .map_err(|_| ArtifactError::Signature("invalid manifest signature".into()))
    }
}

/// An artifact directory whose manifest has been verified.
#[derive(Debug, Clone)]
pub struct VerifiedArtifactDir {
    dir: PathBuf,
    manifest: ArtifactManifest,
}

impl VerifiedArtifactDir {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn manifest(&self) -> &ArtifactManifest {
        &self.manifest
    }

    /// Read a manifest-bound file, re-checking its digest.
    ///
    /// # Errors
    /// Returns `ArtifactError::Integrity` if `rel` is not bound by the manifest
    /// or changed since verification.
    pub fn read(&self, rel: &str) -> Result<Vec<u8>, ArtifactError> {
        let expected = self.manifest.files.get(rel).ok_or_else(|| {
            ArtifactError::Integrity(format!("{rel} is not bound by {MANIFEST_FILE}"))
        })?;

        let path = self.dir.join(rel);
        let bytes = fs::read(&path).map_err(|source| ArtifactError::Io { path, source })?;
        if !constant_time_eq(&sha256_hex(&bytes), expected) {
            return Err(ArtifactError::Integrity(format!("digest mismatch for {rel}")));
        }
        Ok(bytes)
    }

    /// Read and deserialize a manifest-bound JSON file.
    ///
    /// # Errors
    /// Returns error if the file fails integrity checks or does not parse.
    pub fn read_json<T: DeserializeOwned>(&self, rel: &str) -> Result<T, ArtifactError> {
        let bytes = self.read(rel)?;
        serde_json::from_slice(&bytes).map_err(|e| ArtifactError::Format {
            path: self.dir.join(rel),
            reason: e.to_string(),
        })
    }
}
