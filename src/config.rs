//! Generator configuration.
//!
//! Settings come from defaults, optionally a TOML file, then CLI flags (applied
//! by the binary). Nothing here is process-global: the resulting
//! [`GeneratorConfig`] is passed to the generator explicitly.

use crate::cert::builder::Subject;
use crate::cert::{KeyAlgorithm, NativeBackend, OpensslCli, PkiBackend};
use crate::error::{FixtureError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default output directory, relative to the working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "certs";
/// Default subject for every fixture.
pub const DEFAULT_SUBJECT: &str = "/CN=credhub_test_client";

/// Which PKI backend performs the cryptographic steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Shell out to the openssl binary
    #[default]
    Openssl,
    /// Generate in-process with rcgen
    Native,
}

/// Settings for one generator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Wiped and recreated at the start of every run.
    pub output_dir: PathBuf,
    pub subject: String,
    pub key_algorithm: KeyAlgorithm,
    /// Append an `OU=app:<uuid>` to each subject so runs never collide.
    pub disambiguate_subjects: bool,
    /// Extensions applied to certificates signed by the caller's CA.
    pub extensions_file: Option<PathBuf>,
    pub backend: BackendKind,
    pub openssl_path: PathBuf,
    /// Attempt every fixture even after one fails.
    pub keep_going: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            subject: DEFAULT_SUBJECT.to_string(),
            key_algorithm: KeyAlgorithm::default(),
            disambiguate_subjects: false,
            extensions_file: None,
            backend: BackendKind::default(),
            openssl_path: PathBuf::from("openssl"),
            keep_going: false,
        }
    }
}

impl GeneratorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FixtureError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        tracing::info!("Loading config from: {}", path.display());
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: GeneratorConfig =
            toml::from_str(content).map_err(|e| FixtureError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(FixtureError::ConfigError(
                "output_dir cannot be empty".to_string(),
            ));
        }
        if self.output_dir.parent().is_none() {
            return Err(FixtureError::ConfigError(format!(
                "refusing to use {} as the output directory",
                self.output_dir.display()
            )));
        }
        Subject::parse(&self.subject)
            .map_err(|e| FixtureError::ConfigError(format!("invalid subject: {}", e)))?;
        Ok(())
    }

    /// Build the backend selected by this configuration.
    pub fn build_backend(&self) -> Box<dyn PkiBackend> {
        match self.backend {
            BackendKind::Openssl => Box::new(OpensslCli::new(&self.openssl_path)),
            BackendKind::Native => Box::new(NativeBackend::new()),
        }
    }
}
