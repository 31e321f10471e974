//! The fixture generator.
//!
//! A run wipes the output directory and then issues each fixture
//! independently. Failures are reported per fixture: in strict mode the run
//! stops at the first failure, with `keep_going` every fixture is attempted.

use crate::cert::builder::{Subject, ValidityWindow};
use crate::cert::{PkiBackend, SelfSignedRequest, SigningRequest};
use crate::config::GeneratorConfig;
use crate::error::{FixtureError, Result};
use crate::fixture::{ArtifactPaths, CaRef, FixtureDescriptor, Signer};
use crate::inspect::{read_summary, verify_issued_by};
use crate::report::{FixtureOutcome, FixtureStatus, RunReport};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Subject of the throwaway CA that signs the `unknown` fixture.
const UNRELATED_CA_SUBJECT: &str = "CN=fixture_unknown_ca";
const UNRELATED_CA_VALIDITY_DAYS: i64 = 365;
const UNKNOWN_VALIDITY_DAYS: i64 = 30;

/// Produces fixture certificates with a [`PkiBackend`].
pub struct FixtureGenerator<B> {
    backend: B,
    config: GeneratorConfig,
}

impl<B: PkiBackend> FixtureGenerator<B> {
    pub fn new(backend: B, config: GeneratorConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    /// Refuse output directories whose reset would destroy the working
    /// directory or the caller's CA.
    pub fn check_output_dir(&self, ca: &CaRef) -> Result<()> {
        let output_dir = resolve_path(self.output_dir())?;
        let working_dir = resolve_path(&std::env::current_dir()?)?;

        if working_dir.starts_with(&output_dir) {
            return Err(FixtureError::ConfigError(format!(
                "refusing to wipe {}: it contains the working directory",
                output_dir.display()
            )));
        }
        for ca_file in [&ca.cert, &ca.key] {
            if resolve_path(ca_file)?.starts_with(&output_dir) {
                return Err(FixtureError::ConfigError(format!(
                    "refusing to wipe {}: it contains {}",
                    output_dir.display(),
                    ca_file.display()
                )));
            }
        }
        Ok(())
    }

    /// Delete the output directory (if any) and recreate it empty.
    pub fn reset_output_dir(&self) -> Result<()> {
        let dir = self.output_dir();
        if dir.exists() {
            tracing::info!("Removing {}", dir.display());
            fs::remove_dir_all(dir)?;
        }
        fs::create_dir_all(dir)?;
        Ok(())
    }

    fn subject(&self, subject: &str) -> Result<Subject> {
        let subject = Subject::parse(subject)?;
        if self.config.disambiguate_subjects {
            Ok(subject.with_random_id())
        } else {
            Ok(subject)
        }
    }

    /// Issue `name` from a fresh key and CSR, signed by `signer`.
    ///
    /// A negative `validity_days` yields an already expired certificate.
    pub fn issue_certificate(
        &self,
        signer: &CaRef,
        name: &str,
        validity_days: i64,
        subject: &str,
    ) -> Result<ArtifactPaths> {
        self.issue_signed(signer, name, validity_days, subject, self.config.extensions_file.as_deref())
    }

    fn issue_signed(
        &self,
        signer: &CaRef,
        name: &str,
        validity_days: i64,
        subject: &str,
        extensions: Option<&Path>,
    ) -> Result<ArtifactPaths> {
        let subject = self.subject(subject)?;
        let paths = ArtifactPaths::signed(self.output_dir(), name);
        let csr = ArtifactPaths::csr_path(self.output_dir(), name);

        tracing::info!(fixture = name, %subject, validity_days, "issuing certificate");
        self.backend.generate_key(self.config.key_algorithm, &paths.key)?;
        self.backend.create_csr(&paths.key, &subject, &csr)?;
        self.backend.sign_csr(&SigningRequest {
            csr: &csr,
            ca: signer,
            validity: ValidityWindow::starting_now(validity_days),
            extensions,
            cert_out: &paths.cert,
        })?;

        Ok(paths)
    }

    /// Issue `name` as a self-signed certificate.
    pub fn issue_self_signed(
        &self,
        name: &str,
        validity_days: i64,
        subject: &str,
    ) -> Result<ArtifactPaths> {
        let subject = self.subject(subject)?;
        tracing::info!(fixture = name, %subject, validity_days, "issuing self-signed certificate");
        self.self_signed(name, &subject, validity_days, false)
    }

    fn self_signed(
        &self,
        name: &str,
        subject: &Subject,
        validity_days: i64,
        is_ca: bool,
    ) -> Result<ArtifactPaths> {
        let paths = ArtifactPaths::self_signed(self.output_dir(), name);
        self.backend.self_signed(&SelfSignedRequest {
            algorithm: self.config.key_algorithm,
            subject,
            validity: ValidityWindow::starting_now(validity_days),
            is_ca,
            key_out: &paths.key,
            cert_out: &paths.cert,
        })?;
        Ok(paths)
    }

    /// Mint a new CA (`<name>_ca`) and issue `name` from it, so the result
    /// chains to an authority nobody trusts.
    pub fn issue_from_unrelated_authority(&self, name: &str) -> Result<ArtifactPaths> {
        self.issue_from_unrelated(name, UNKNOWN_VALIDITY_DAYS, &self.config.subject)
    }

    fn issue_from_unrelated(
        &self,
        name: &str,
        validity_days: i64,
        subject: &str,
    ) -> Result<ArtifactPaths> {
        let ca_name = format!("{}_ca", name);
        let ca_subject = Subject::parse(UNRELATED_CA_SUBJECT)?.with_random_id();

        tracing::info!(fixture = %ca_name, subject = %ca_subject, "minting unrelated CA");
        let ca = self
            .self_signed(&ca_name, &ca_subject, UNRELATED_CA_VALIDITY_DAYS, true)?
            .as_ca();

        self.issue_signed(&ca, name, validity_days, subject, None)
    }

    /// Produce one fixture.
    pub fn generate(&self, descriptor: &FixtureDescriptor, ca: &CaRef) -> Result<ArtifactPaths> {
        let FixtureDescriptor {
            name,
            validity_days,
            subject,
            signer,
        } = descriptor;

        match signer {
            Signer::CallerCa => self.issue_certificate(ca, name, *validity_days, subject),
            Signer::SelfSigned => self.issue_self_signed(name, *validity_days, subject),
            Signer::UnrelatedCa => self.issue_from_unrelated(name, *validity_days, subject),
        }
    }

    /// Produce one fixture and read it back.
    fn outcome(&self, descriptor: &FixtureDescriptor, ca: &CaRef) -> Result<FixtureStatus> {
        let artifacts = self.generate(descriptor, ca)?;
        let summary = read_summary(&artifacts.cert)?;
        let trusted_by_ca = match verify_issued_by(&artifacts.cert, &ca.cert) {
            Ok(trusted) => {
                if trusted != descriptor.signer.trusted_by_caller_ca() {
                    tracing::warn!(
                        fixture = %descriptor.name,
                        signer = %descriptor.signer,
                        trusted,
                        "certificate trust does not match its signer"
                    );
                }
                trusted
            }
            Err(e) => {
                tracing::warn!(fixture = %descriptor.name, "cannot check against caller CA: {}", e);
                false
            }
        };

        Ok(FixtureStatus::Issued {
            artifacts,
            summary,
            trusted_by_ca,
        })
    }

    /// Reset the output directory and produce every descriptor in order.
    pub fn run_fixtures(&self, ca: &CaRef, fixtures: &[FixtureDescriptor]) -> Result<RunReport> {
        self.check_output_dir(ca)?;
        self.reset_output_dir()?;
        let mut report = RunReport::new(self.output_dir().to_path_buf());

        for descriptor in fixtures {
            let status = match self.outcome(descriptor, ca) {
                Ok(status) => status,
                Err(e) => {
                    let error = FixtureError::for_fixture(&descriptor.name, e);
                    if !self.config.keep_going {
                        return Err(error);
                    }
                    tracing::error!("{}", error);
                    FixtureStatus::Failed {
                        error: error.to_string(),
                    }
                }
            };

            report.outcomes.push(FixtureOutcome {
                name: descriptor.name.clone(),
                signer: descriptor.signer,
                status,
            });
        }

        Ok(report)
    }

    /// Produce the standard set: `client`, `selfsigned`, `unknown`, `expired`.
    pub fn run(&self, ca: &CaRef) -> Result<RunReport> {
        tracing::info!(
            backend = self.backend.name(),
            output_dir = %self.output_dir().display(),
            "generating fixtures"
        );
        let fixtures = FixtureDescriptor::standard_set(&self.config.subject);
        self.run_fixtures(ca, &fixtures)
    }
}

/// Absolute form of `path` with `.`/`..` removed and symlinks resolved as far
/// as the path exists.
fn resolve_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }

    let mut existing = normalized.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return Ok(missing.iter().rev().fold(canonical, |path, name| path.join(name)));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(normalized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::{KeyAlgorithm, NativeBackend};
    use crate::fixture::{CLIENT, EXPIRED, SELF_SIGNED, UNKNOWN};
    use tempfile::TempDir;

    fn config(dir: &Path) -> GeneratorConfig {
        GeneratorConfig {
            output_dir: dir.join("certs"),
            key_algorithm: KeyAlgorithm::EcdsaP256,
            ..GeneratorConfig::default()
        }
    }

    fn caller_ca(dir: &Path) -> CaRef {
        let ca_config = GeneratorConfig {
            output_dir: dir.join("ca"),
            key_algorithm: KeyAlgorithm::EcdsaP256,
            ..GeneratorConfig::default()
        };
        let generator = FixtureGenerator::new(NativeBackend, ca_config);
        generator.reset_output_dir().unwrap();
        let subject = Subject::parse("CN=Caller Root CA").unwrap();
        generator.self_signed("root", &subject, 365, true).unwrap().as_ca()
    }

    #[test]
    fn test_reset_output_dir_removes_stale_files() {
        let dir = TempDir::new().unwrap();
        let generator = FixtureGenerator::new(NativeBackend, config(dir.path()));

        fs::create_dir_all(generator.output_dir().join("nested")).unwrap();
        fs::write(generator.output_dir().join("stale.pem"), "old").unwrap();

        generator.reset_output_dir().unwrap();
        assert!(generator.output_dir().is_dir());
        assert_eq!(fs::read_dir(generator.output_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_refuses_working_directory_as_output() {
        let dir = TempDir::new().unwrap();
        let ca = CaRef::new(dir.path().join("ca.pem"), dir.path().join("ca_key.pem"));
        let cwd = std::env::current_dir().unwrap();

        for output_dir in [PathBuf::from("."), PathBuf::from(".."), cwd.clone()] {
            let generator = FixtureGenerator::new(
                NativeBackend,
                GeneratorConfig {
                    output_dir: output_dir.clone(),
                    ..config(dir.path())
                },
            );
            let result = generator.run(&ca);
            assert!(
                matches!(result, Err(FixtureError::ConfigError(_))),
                "{}",
                output_dir.display()
            );
        }
        assert!(cwd.join("Cargo.toml").is_file());
    }

    #[test]
    fn test_refuses_output_dir_holding_ca() {
        let dir = TempDir::new().unwrap();
        let ca = caller_ca(dir.path());
        let generator = FixtureGenerator::new(
            NativeBackend,
            GeneratorConfig {
                output_dir: dir.path().join("ca"),
                ..config(dir.path())
            },
        );

        let result = generator.run(&ca);
        assert!(matches!(result, Err(FixtureError::ConfigError(_))));
        assert!(ca.cert.is_file());
        assert!(ca.key.is_file());

        // a sibling output dir is fine
        let generator = FixtureGenerator::new(NativeBackend, config(dir.path()));
        assert!(generator.check_output_dir(&ca).is_ok());
    }

    #[test]
    fn test_resolve_path_removes_dot_components() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().canonicalize().unwrap();

        let resolved = resolve_path(&dir.path().join("a/./b/../certs")).unwrap();
        assert_eq!(resolved, base.join("a/certs"));
    }

    #[test]
    fn test_issue_certificate_writes_all_artifacts() {
        let dir = TempDir::new().unwrap();
        let ca = caller_ca(dir.path());
        let generator = FixtureGenerator::new(NativeBackend, config(dir.path()));
        generator.reset_output_dir().unwrap();

        let paths = generator.issue_certificate(&ca, "client", 30, "CN=credhub_test_client").unwrap();
        assert!(paths.key.is_file());
        assert!(paths.csr.as_ref().unwrap().is_file());
        assert!(paths.cert.is_file());
        assert!(verify_issued_by(&paths.cert, &ca.cert).unwrap());
    }

    #[test]
    fn test_issue_from_unrelated_authority() {
        let dir = TempDir::new().unwrap();
        let ca = caller_ca(dir.path());
        let generator = FixtureGenerator::new(NativeBackend, config(dir.path()));
        generator.reset_output_dir().unwrap();

        let paths = generator.issue_from_unrelated_authority("unknown").unwrap();
        let unrelated_ca = generator.output_dir().join("unknown_ca.pem");
        assert!(unrelated_ca.is_file());
        assert!(generator.output_dir().join("unknown_ca_key.pem").is_file());
        assert!(verify_issued_by(&paths.cert, &unrelated_ca).unwrap());
        assert!(!verify_issued_by(&paths.cert, &ca.cert).unwrap());
    }

    #[test]
    fn test_disambiguated_subjects_differ() {
        let dir = TempDir::new().unwrap();
        let generator = FixtureGenerator::new(
            NativeBackend,
            GeneratorConfig {
                disambiguate_subjects: true,
                ..config(dir.path())
            },
        );
        generator.reset_output_dir().unwrap();

        let first = generator.issue_self_signed("a", 30, "CN=credhub_test_client").unwrap();
        let second = generator.issue_self_signed("b", 30, "CN=credhub_test_client").unwrap();
        let first = read_summary(&first.cert).unwrap();
        let second = read_summary(&second.cert).unwrap();

        assert!(first.subject.starts_with("CN=credhub_test_client"));
        assert!(first.subject.contains("OU=app:"));
        assert_ne!(first.subject, second.subject);
    }

    #[test]
    fn test_run_produces_standard_set() {
        let dir = TempDir::new().unwrap();
        let ca = caller_ca(dir.path());
        let generator = FixtureGenerator::new(NativeBackend, config(dir.path()));

        let report = generator.run(&ca).unwrap();
        assert!(report.is_success());
        let names: Vec<&str> = report.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec![CLIENT, SELF_SIGNED, UNKNOWN, EXPIRED]);
        assert!(report.outcomes.iter().all(FixtureOutcome::trust_as_expected));

        let client = read_summary(&generator.output_dir().join("client.pem")).unwrap();
        assert_eq!(client.subject, "CN=credhub_test_client");
    }

    #[test]
    fn test_strict_mode_stops_at_first_failure() {
        let dir = TempDir::new().unwrap();
        let ca = CaRef::new(dir.path().join("missing.pem"), dir.path().join("missing_key.pem"));
        let generator = FixtureGenerator::new(NativeBackend, config(dir.path()));

        match generator.run(&ca) {
            Err(FixtureError::FixtureFailed { name, .. }) => assert_eq!(name, CLIENT),
            other => panic!("expected fixture failure, got {:?}", other.map(|r| r.outcomes.len())),
        }
        assert!(!generator.output_dir().join("selfsigned.pem").exists());
    }

    #[test]
    fn test_keep_going_reports_each_fixture() {
        let dir = TempDir::new().unwrap();
        let ca = CaRef::new(dir.path().join("missing.pem"), dir.path().join("missing_key.pem"));
        let generator = FixtureGenerator::new(
            NativeBackend,
            GeneratorConfig {
                keep_going: true,
                ..config(dir.path())
            },
        );

        let report = generator.run(&ca).unwrap();
        assert!(!report.is_success());
        assert_eq!(report.outcomes.len(), 4);

        let failed: Vec<&str> = report.failures().map(|o| o.name.as_str()).collect();
        assert_eq!(failed, vec![CLIENT, EXPIRED]);
        assert!(report.outcome(SELF_SIGNED).unwrap().is_issued());
        assert!(report.outcome(UNKNOWN).unwrap().is_issued());
        assert!(generator.output_dir().join("selfsigned.pem").is_file());
    }
}
