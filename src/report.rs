//! Per-fixture results of a generator run.

use crate::fixture::{ArtifactPaths, Signer};
use crate::inspect::CertificateSummary;
use serde::Serialize;
use std::path::PathBuf;

/// What happened to one fixture.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FixtureStatus {
    Issued {
        artifacts: ArtifactPaths,
        summary: CertificateSummary,
        /// Whether the certificate verifies against the caller's CA.
        trusted_by_ca: bool,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct FixtureOutcome {
    pub name: String,
    pub signer: Signer,
    #[serde(flatten)]
    pub status: FixtureStatus,
}

impl FixtureOutcome {
    pub fn is_issued(&self) -> bool {
        matches!(self.status, FixtureStatus::Issued { .. })
    }

    /// Issued, and trust matches what the signer kind should produce.
    pub fn trust_as_expected(&self) -> bool {
        match &self.status {
            FixtureStatus::Issued { trusted_by_ca, .. } => {
                *trusted_by_ca == self.signer.trusted_by_caller_ca()
            }
            FixtureStatus::Failed { .. } => false,
        }
    }
}

/// The result of a full run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub output_dir: PathBuf,
    pub outcomes: Vec<FixtureOutcome>,
}

impl RunReport {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            outcomes: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(FixtureOutcome::is_issued)
    }

    pub fn failures(&self) -> impl Iterator<Item = &FixtureOutcome> {
        self.outcomes.iter().filter(|o| !o.is_issued())
    }

    pub fn outcome(&self, name: &str) -> Option<&FixtureOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
