//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the integration with the exported model artifacts:
//! - `artifact`: manifest digests and Ed25519 signatures for artifact directories
//! - `linear`: logistic-regression classifiers (probability or hard label)
//! - `scaler`: standard scaler for the symptom/vitals pipeline
//! - `sanitize`: identifier redaction for logs

pub mod artifact;
pub mod linear;
pub mod sanitize;
pub mod scaler;

pub use artifact::{ArtifactError, ArtifactVerifier, VerifiedArtifactDir};
pub use linear::{LogisticLabelModel, LogisticProbabilityModel};
pub use scaler::StandardScaler;
