//! Artifact signing utility for CycleCare pipelines.
//!
//! Writes `manifest.json` binding the classifier (and scaler, if present) of
//! one artifact directory to their SHA-256 digests, then signs the manifest
//! with Ed25519 into `manifest.sig` when a signing seed is available.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin sign_artifacts -- <artifact_dir> [--unsigned] [--nonce-b64 <b64>]
//! ```
//!
//! # Security
//!
//! - Signing seed read from a file or Docker secret (env var in debug builds only)
//! - Seed material zeroized after use
//! - Each manifest carries a fresh random nonce

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use cyclecare::adapters::artifact::{unix_now, ArtifactManifest, MANIFEST_FILE, SIGNATURE_FILE};
use cyclecare::adapters::linear::CLASSIFIER_FILE;
use cyclecare::adapters::scaler::SCALER_FILE;

const KEY_FILE_ENV: &str = "CYCLECARE_SIGNING_KEY_B64_FILE";
const KEY_ENV: &str = "CYCLECARE_SIGNING_KEY_B64";
const DOCKER_SECRET_PATH: &str = "/run/secrets/cyclecare_signing_key_b64";

#[derive(Zeroize, ZeroizeOnDrop)]
struct Seed([u8; 32]);

struct Args {
    dir: PathBuf,
    unsigned: bool,
    nonce_b64: Option<String>,
}

fn usage() -> anyhow::Error {
    anyhow!("Usage: sign_artifacts <artifact_dir> [--unsigned] [--nonce-b64 <b64_16_bytes>]")
}

fn parse_args() -> Result<Args> {
    let mut args = env::args().skip(1);
    let mut dir = None;
    let mut unsigned = false;
    let mut nonce_b64 = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--unsigned" => unsigned = true,
            "--nonce-b64" => nonce_b64 = Some(args.next().ok_or_else(usage)?),
            "-h" | "--help" => return Err(usage()),
            _ if dir.is_none() => dir = Some(PathBuf::from(arg)),
            _ => return Err(usage()),
        }
    }

    Ok(Args {
        dir: dir.ok_or_else(usage)?,
        unsigned,
        nonce_b64,
    })
}

fn read_secret(content: &str) -> Result<Zeroizing<String>> {
    let secret = content.trim_end_matches(['\n', '\r']).to_string();
    if secret.is_empty() {
        bail!("Empty signing key");
    }
    Ok(Zeroizing::new(secret))
}

fn read_signing_seed_b64() -> Result<Zeroizing<String>> {
    if let Ok(path) = env::var(KEY_FILE_ENV) {
        let content = Zeroizing::new(
            fs::read_to_string(path.trim()).context("Failed reading signing key file")?,
        );
        return read_secret(&content);
    }

    if Path::new(DOCKER_SECRET_PATH).exists() {
        let content = Zeroizing::new(
            fs::read_to_string(DOCKER_SECRET_PATH).context("Failed reading docker secret")?,
        );
        return read_secret(&content);
    }

    // Dev-only fallback.
    if cfg!(debug_assertions) {
        if let Ok(v) = env::var(KEY_ENV) {
            return read_secret(&Zeroizing::new(v));
        }
    }

    bail!(
        "Missing signing key. Provide {KEY_FILE_ENV} or {DOCKER_SECRET_PATH} \
         (env var {KEY_ENV} only in debug builds), or pass --unsigned."
    )
}

fn read_signing_seed() -> Result<Seed> {
    let b64 = read_signing_seed_b64()?;
    let raw = Zeroizing::new(
        general_purpose::STANDARD
            .decode(b64.trim())
            .context("Invalid base64 in signing key")?,
    );
    if raw.len() != 32 {
        bail!(
            "Signing key seed must be 32 bytes after base64 decode (got {})",
            raw.len()
        );
    }

    let mut seed = Seed([0u8; 32]);
    seed.0.copy_from_slice(&raw);
    Ok(seed)
}

fn make_nonce_b64() -> String {
    let mut nonce = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    general_purpose::STANDARD.encode(nonce)
}

fn validate_nonce_b64(nonce_b64: &str) -> Result<()> {
    let raw = general_purpose::STANDARD
        .decode(nonce_b64.trim())
        .context("Invalid base64 nonce")?;
    if raw.len() != 16 {
        bail!("nonce must decode to exactly 16 bytes");
    }
    Ok(())
}

/// Bind and (unless `args.unsigned`) sign one artifact directory.
///
/// The seed is resolved before anything in the directory is written, so a
/// failed run leaves an existing manifest/signature pair untouched.
fn run(args: Args, load_seed: impl FnOnce() -> Result<Seed>) -> Result<()> {
    let files: Vec<&str> = [CLASSIFIER_FILE, SCALER_FILE]
        .into_iter()
        .filter(|rel| args.dir.join(rel).is_file())
        .collect();
    if !files.contains(&CLASSIFIER_FILE) {
        bail!("No {CLASSIFIER_FILE} found in {:?}", args.dir);
    }

    let nonce_b64 = match args.nonce_b64 {
        Some(v) => {
            validate_nonce_b64(&v)?;
            v
        }
        None => make_nonce_b64(),
    };

    let signing_key = if args.unsigned {
        None
    } else {
        let seed = load_seed()?;
        Some(SigningKey::from_bytes(&seed.0))
    };

    let manifest = ArtifactManifest::for_files(&args.dir, &files, unix_now(), Some(nonce_b64))?;
    let manifest_bytes =
        serde_json::to_vec_pretty(&manifest).context("Failed to serialize manifest")?;
    let signature: Option<Signature> = signing_key.as_ref().map(|key| key.sign(&manifest_bytes));

    let manifest_path = args.dir.join(MANIFEST_FILE);
    fs::write(&manifest_path, &manifest_bytes)
        .with_context(|| format!("Failed to write {manifest_path:?}"))?;
    println!("Wrote manifest: {manifest_path:?} ({} files)", files.len());

    let sig_path = args.dir.join(SIGNATURE_FILE);
    match (signature, signing_key) {
        (Some(sig), Some(key)) => {
            fs::write(&sig_path, sig.to_bytes())
                .with_context(|| format!("Failed to write {sig_path:?}"))?;
            println!("Wrote signature: {sig_path:?}");
            println!(
                "CYCLECARE_ARTIFACT_PUBKEY_B64={}",
                general_purpose::STANDARD.encode(key.verifying_key().as_bytes())
            );
        }
        _ => {
            if sig_path.exists() {
                fs::remove_file(&sig_path)
                    .with_context(|| format!("Failed to remove stale {sig_path:?}"))?;
            }
            println!("Manifest left unsigned");
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    run(parse_args()?, read_signing_seed)
}
