//! Fixture descriptors and the files they produce.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Stem of the certificate valid for 30 days and signed by the caller's CA.
pub const CLIENT: &str = "client";
/// Stem of the self-signed certificate.
pub const SELF_SIGNED: &str = "selfsigned";
/// Stem of the certificate signed by a freshly minted, unrelated CA.
pub const UNKNOWN: &str = "unknown";
/// Stem of the already-expired certificate signed by the caller's CA.
pub const EXPIRED: &str = "expired";

/// The CA supplied by the caller. Never generated or validated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaRef {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl CaRef {
    pub fn new(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
        }
    }
}

/// Who signs a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signer {
    CallerCa,
    UnrelatedCa,
    SelfSigned,
}

impl Signer {
    /// Whether a certificate from this signer should chain to the caller's CA.
    pub fn trusted_by_caller_ca(self) -> bool {
        matches!(self, Signer::CallerCa)
    }
}

impl std::fmt::Display for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Signer::CallerCa => "caller CA",
            Signer::UnrelatedCa => "unrelated CA",
            Signer::SelfSigned => "self-signed",
        };
        f.write_str(label)
    }
}

/// One fixture to generate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureDescriptor {
    pub name: String,
    /// Negative values produce a certificate that is already expired.
    pub validity_days: i64,
    pub subject: String,
    pub signer: Signer,
}

impl FixtureDescriptor {
    pub fn new(name: &str, validity_days: i64, subject: &str, signer: Signer) -> Self {
        Self {
            name: name.to_string(),
            validity_days,
            subject: subject.to_string(),
            signer,
        }
    }

    /// The four fixtures every run produces, in generation order.
    pub fn standard_set(subject: &str) -> Vec<Self> {
        vec![
            Self::new(CLIENT, 30, subject, Signer::CallerCa),
            Self::new(SELF_SIGNED, 30, subject, Signer::SelfSigned),
            Self::new(UNKNOWN, 30, subject, Signer::UnrelatedCa),
            Self::new(EXPIRED, -30, subject, Signer::CallerCa),
        ]
    }
}

/// Paths of the PEM files written for one fixture stem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactPaths {
    pub key: PathBuf,
    /// Absent for self-signed certificates.
    pub csr: Option<PathBuf>,
    pub cert: PathBuf,
}

impl ArtifactPaths {
    pub fn signed(dir: &Path, stem: &str) -> Self {
        Self {
            key: dir.join(format!("{}_key.pem", stem)),
            csr: Some(Self::csr_path(dir, stem)),
            cert: dir.join(format!("{}.pem", stem)),
        }
    }

    pub fn self_signed(dir: &Path, stem: &str) -> Self {
        Self {
            csr: None,
            ..Self::signed(dir, stem)
        }
    }

    pub fn csr_path(dir: &Path, stem: &str) -> PathBuf {
        dir.join(format!("{}.csr", stem))
    }

    /// View these artifacts as a CA reference (for the unrelated CA).
    pub fn as_ca(&self) -> CaRef {
        CaRef::new(&self.cert, &self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_set_order_and_validity() {
        let set = FixtureDescriptor::standard_set("CN=credhub_test_client");
        let names: Vec<&str> = set.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec![CLIENT, SELF_SIGNED, UNKNOWN, EXPIRED]);

        assert_eq!(set[0].validity_days, 30);
        assert_eq!(set[0].signer, Signer::CallerCa);
        assert!(set[3].validity_days < 0);
        assert_eq!(set[3].signer, Signer::CallerCa);
        assert!(set.iter().all(|d| d.subject == "CN=credhub_test_client"));
    }

    #[test]
    fn test_artifact_paths_naming() {
        let paths = ArtifactPaths::signed(Path::new("certs"), "client");
        assert_eq!(paths.key, Path::new("certs/client_key.pem"));
        assert_eq!(paths.csr.as_deref(), Some(Path::new("certs/client.csr")));
        assert_eq!(paths.cert, Path::new("certs/client.pem"));

        let paths = ArtifactPaths::self_signed(Path::new("certs"), "selfsigned");
        assert!(paths.csr.is_none());
        assert_eq!(paths.cert, Path::new("certs/selfsigned.pem"));
    }

    #[test]
    fn test_signer_trust() {
        assert!(Signer::CallerCa.trusted_by_caller_ca());
        assert!(!Signer::UnrelatedCa.trusted_by_caller_ca());
        assert!(!Signer::SelfSigned.trusted_by_caller_ca());
    }
}
