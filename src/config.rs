//! Process configuration.
//!
//! Read once at startup from environment variables. Invalid values are
//! reported as warnings and replaced by defaults; nothing here is reloaded
//! at runtime.

use std::path::PathBuf;

use crate::domain::SchemaId;

const MODEL_DIR_ENV: &str = "CYCLECARE_MODEL_DIR";
const PIPELINES_ENV: &str = "CYCLECARE_PIPELINES";
const LOG_MODE_ENV: &str = "CYCLECARE_LOG_MODE";
const LOG_FILE_ENV: &str = "CYCLECARE_LOG_FILE";
const PUBKEY_ENV: &str = "CYCLECARE_ARTIFACT_PUBKEY_B64";
const REQUIRE_SIGNED_ENV: &str = "CYCLECARE_REQUIRE_SIGNED_ARTIFACTS";

/// Where log output goes. Stdout is reserved for responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogMode {
    Stderr,
    File(PathBuf),
}

/// Startup configuration for the assessment service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Root directory holding one artifact directory per pipeline
    pub model_dir: PathBuf,

    /// Pipelines to load at startup
    pub pipelines: Vec<SchemaId>,

    pub log_mode: LogMode,

    /// Base64 Ed25519 public key for artifact manifests
    pub artifact_public_key_b64: Option<String>,

    /// Refuse unsigned artifacts
    pub require_signed_artifacts: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            pipelines: vec![SchemaId::HormoneUltrasound, SchemaId::SymptomVitals],
            log_mode: LogMode::Stderr,
            artifact_public_key_b64: None,
            // Release builds only load signed artifacts unless told otherwise.
            require_signed_artifacts: cfg!(not(debug_assertions)),
        }
    }
}

impl ServiceConfig {
    /// Load overrides from the environment, logging any ignored values.
    ///
    /// Use [`Self::from_env_deferred`] when no subscriber is installed yet.
    #[must_use]
    pub fn from_env() -> Self {
        let (cfg, warnings) = Self::from_env_deferred();
        for warning in &warnings {
            tracing::warn!("{}", warning);
        }
        cfg
    }

    /// Load overrides from the environment and return the warnings for
    /// ignored values instead of logging them.
    ///
    /// The log destination is part of this config, so the binary reads it
    /// before a subscriber exists and logs the warnings once one does.
    ///
    /// Supported:
    /// - CYCLECARE_MODEL_DIR
    /// - CYCLECARE_PIPELINES="hormone_ultrasound,symptom_vitals"
    /// - CYCLECARE_LOG_MODE=stderr|file
    /// - CYCLECARE_LOG_FILE (file mode, default `cyclecare.log`)
    /// - CYCLECARE_ARTIFACT_PUBKEY_B64
    /// - CYCLECARE_REQUIRE_SIGNED_ARTIFACTS=true|false
    #[must_use]
    pub fn from_env_deferred() -> (Self, Vec<String>) {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> (Self, Vec<String>) {
        let mut cfg = Self::default();
        let mut warnings = Vec::new();

        if let Some(dir) = lookup(MODEL_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            cfg.model_dir = PathBuf::from(dir.trim());
        }

        if let Some(v) = lookup(PIPELINES_ENV).filter(|v| !v.trim().is_empty()) {
            let mut pipelines = Vec::new();
            for id in v.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                match SchemaId::from_id(id) {
                    Some(schema) if !pipelines.contains(&schema) => pipelines.push(schema),
                    Some(_) => {}
                    None => {
                        warnings
                            .push(format!("Ignoring unknown pipeline '{id}' in {PIPELINES_ENV}"));
                    }
                }
            }
            if pipelines.is_empty() {
                warnings.push(format!(
                    "No valid pipeline in {PIPELINES_ENV}='{v}', loading all pipelines"
                ));
            } else {
                cfg.pipelines = pipelines;
            }
        }

        match lookup(LOG_MODE_ENV).as_deref().map(str::trim) {
            None | Some("") | Some("stderr") => {}
            Some("file") => {
                let path = lookup(LOG_FILE_ENV)
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| "cyclecare.log".to_string());
                cfg.log_mode = LogMode::File(PathBuf::from(path));
            }
            Some(other) => {
                warnings.push(format!(
                    "Ignoring unknown {LOG_MODE_ENV} '{other}', using stderr"
                ));
            }
        }

        cfg.artifact_public_key_b64 = lookup(PUBKEY_ENV).filter(|v| !v.trim().is_empty());

        if let Some(v) = lookup(REQUIRE_SIGNED_ENV) {
            match parse_bool(&v) {
                Some(b) => cfg.require_signed_artifacts = b,
                None => warnings.push(format!("Ignoring invalid {REQUIRE_SIGNED_ENV} '{v}'")),
            }
        }

        (cfg, warnings)
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}
