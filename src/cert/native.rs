//! In-process backend built on rcgen.
//!
//! RSA keys are generated with the `rsa` crate (rcgen cannot generate them)
//! and loaded into rcgen as PKCS#8.

use crate::cert::builder::{Subject, ValidityWindow};
use crate::cert::extensions::X509Extensions;
use crate::cert::loader::{read_certificate_pem, read_private_key_pkcs8};
use crate::cert::{KeyAlgorithm, PkiBackend, SelfSignedRequest, SigningRequest};
use crate::error::{FixtureError, Result};
use crate::fixture::CaRef;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateSigningRequest, IsCa, KeyPair,
    KeyUsagePurpose, SignatureAlgorithm,
};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use std::fs;
use std::path::Path;

/// Signature algorithms a loaded key may be used with, in preference order.
static SIGNATURE_ALGORITHMS: &[&SignatureAlgorithm] = &[
    &rcgen::PKCS_RSA_SHA256,
    &rcgen::PKCS_ECDSA_P256_SHA256,
    &rcgen::PKCS_ECDSA_P384_SHA384,
    &rcgen::PKCS_ED25519,
];

/// Generates everything in-process; no external tool required.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

impl PkiBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn generate_key(&self, algorithm: KeyAlgorithm, key_out: &Path) -> Result<()> {
        let pem = generate_key_pem(algorithm)?;
        fs::write(key_out, pem)?;
        Ok(())
    }

    fn create_csr(&self, key: &Path, subject: &Subject, csr_out: &Path) -> Result<()> {
        let key_pair = load_key_pair(key)?;

        let mut params = CertificateParams::default();
        params.alg = signature_algorithm(&key_pair)?;
        params.distinguished_name = subject.to_distinguished_name();
        params.key_pair = Some(key_pair);

        let cert = Certificate::from_params(params)
            .map_err(certificate_error("Failed to build CSR"))?;
        let csr = cert
            .serialize_request_pem()
            .map_err(certificate_error("Failed to serialize CSR"))?;

        fs::write(csr_out, csr)?;
        Ok(())
    }

    fn sign_csr(&self, request: &SigningRequest<'_>) -> Result<()> {
        let ca = load_ca(request.ca)?;

        let csr_pem = fs::read_to_string(request.csr)?;
        let mut csr = CertificateSigningRequest::from_pem(&csr_pem)
            .map_err(certificate_error("Failed to parse CSR"))?;
        set_validity(&mut csr.params, &request.validity);
        if let Some(path) = request.extensions {
            X509Extensions::from_file(path)?.apply(&mut csr.params);
        }

        let pem = csr
            .serialize_pem_with_signer(&ca)
            .map_err(certificate_error("Failed to sign CSR"))?;

        fs::write(request.cert_out, pem)?;
        Ok(())
    }

    fn self_signed(&self, request: &SelfSignedRequest<'_>) -> Result<()> {
        let key_pem = generate_key_pem(request.algorithm)?;
        let key_pair = KeyPair::from_pem(&key_pem)
            .map_err(|e| FixtureError::InvalidKeyError(format!("Failed to load key: {}", e)))?;

        let mut params = CertificateParams::default();
        params.alg = signature_algorithm(&key_pair)?;
        params.distinguished_name = request.subject.to_distinguished_name();
        set_validity(&mut params, &request.validity);
        if request.is_ca {
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
            params.key_usages = vec![
                KeyUsagePurpose::KeyCertSign,
                KeyUsagePurpose::CrlSign,
                KeyUsagePurpose::DigitalSignature,
            ];
        }
        params.key_pair = Some(key_pair);

        let cert = Certificate::from_params(params)
            .map_err(certificate_error("Failed to create self-signed certificate"))?;
        let cert_pem = cert
            .serialize_pem()
            .map_err(certificate_error("Failed to convert to PEM"))?;

        fs::write(request.key_out, key_pem)?;
        fs::write(request.cert_out, cert_pem)?;
        Ok(())
    }
}

/// Generate a private key as PKCS#8 PEM.
pub fn generate_key_pem(algorithm: KeyAlgorithm) -> Result<String> {
    match algorithm {
        KeyAlgorithm::Rsa2048 => {
            let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).map_err(|e| {
                FixtureError::InvalidKeyError(format!("Failed to generate RSA key: {}", e))
            })?;
            let pem = key.to_pkcs8_pem(LineEnding::LF).map_err(|e| {
                FixtureError::InvalidKeyError(format!("Failed to encode RSA key: {}", e))
            })?;
            Ok(pem.to_string())
        }
        KeyAlgorithm::EcdsaP256 => {
            let key = KeyPair::generate(&rcgen::PKCS_ECDSA_P256_SHA256).map_err(|e| {
                FixtureError::InvalidKeyError(format!("Failed to generate ECDSA key: {}", e))
            })?;
            Ok(key.serialize_pem())
        }
    }
}

fn load_key_pair(path: &Path) -> Result<KeyPair> {
    let pem = read_private_key_pkcs8(path)?;
    KeyPair::from_pem(&pem).map_err(|e| {
        FixtureError::InvalidKeyError(format!("Failed to load {}: {}", path.display(), e))
    })
}

/// Load the CA as an rcgen certificate able to sign others.
fn load_ca(ca: &CaRef) -> Result<Certificate> {
    let cert_pem = read_certificate_pem(&ca.cert)?;
    let key_pair = load_key_pair(&ca.key)?;

    let params = CertificateParams::from_ca_cert_pem(&cert_pem, key_pair)
        .map_err(certificate_error("Failed to load CA certificate"))?;

    Certificate::from_params(params).map_err(certificate_error("CA certificate and key do not match"))
}

fn signature_algorithm(key_pair: &KeyPair) -> Result<&'static SignatureAlgorithm> {
    SIGNATURE_ALGORITHMS
        .iter()
        .copied()
        .find(|alg| key_pair.is_compatible(alg))
        .ok_or_else(|| FixtureError::InvalidKeyError("Unsupported key algorithm".to_string()))
}

fn set_validity(params: &mut CertificateParams, validity: &ValidityWindow) {
    params.not_before = validity.not_before;
    params.not_after = validity.not_after;
}

fn certificate_error<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> FixtureError {
    move |e| FixtureError::CertificateError(format!("{}: {}", context, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::{read_summary, verify_issued_by};
    use tempfile::TempDir;

    fn make_ca(dir: &Path, algorithm: KeyAlgorithm) -> CaRef {
        let ca = CaRef::new(dir.join("ca.pem"), dir.join("ca_key.pem"));
        let subject = Subject::parse("CN=Test Root CA").unwrap();
        NativeBackend
            .self_signed(&SelfSignedRequest {
                algorithm,
                subject: &subject,
                validity: ValidityWindow::starting_now(365),
                is_ca: true,
                key_out: &ca.key,
                cert_out: &ca.cert,
            })
            .unwrap();
        ca
    }

    #[test]
    fn test_generate_ecdsa_key() {
        let pem = generate_key_pem(KeyAlgorithm::EcdsaP256).unwrap();
        assert!(pem.contains("BEGIN PRIVATE KEY"));
        assert!(KeyPair::from_pem(&pem).is_ok());
    }

    #[test]
    fn test_self_signed_ca() {
        let dir = TempDir::new().unwrap();
        let ca = make_ca(dir.path(), KeyAlgorithm::EcdsaP256);

        let summary = read_summary(&ca.cert).unwrap();
        assert!(summary.is_ca);
        assert!(summary.is_self_issued());
        assert_eq!(summary.subject, "CN=Test Root CA");
    }

    #[test]
    fn test_csr_signed_by_ca() {
        let dir = TempDir::new().unwrap();
        let ca = make_ca(dir.path(), KeyAlgorithm::EcdsaP256);
        let backend = NativeBackend::new();

        let key = dir.path().join("client_key.pem");
        let csr = dir.path().join("client.csr");
        let cert = dir.path().join("client.pem");
        let subject = Subject::parse("CN=credhub_test_client").unwrap();

        backend.generate_key(KeyAlgorithm::EcdsaP256, &key).unwrap();
        backend.create_csr(&key, &subject, &csr).unwrap();
        assert!(fs::read_to_string(&csr).unwrap().contains("CERTIFICATE REQUEST"));

        backend
            .sign_csr(&SigningRequest {
                csr: &csr,
                ca: &ca,
                validity: ValidityWindow::starting_now(30),
                extensions: None,
                cert_out: &cert,
            })
            .unwrap();

        let summary = read_summary(&cert).unwrap();
        assert_eq!(summary.subject, "CN=credhub_test_client");
        assert_eq!(summary.issuer, "CN=Test Root CA");
        assert!(!summary.is_ca);
        assert!(verify_issued_by(&cert, &ca.cert).unwrap());
    }

    #[test]
    fn test_negative_validity_is_expired() {
        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("old.pem");
        let subject = Subject::parse("CN=old").unwrap();

        NativeBackend
            .self_signed(&SelfSignedRequest {
                algorithm: KeyAlgorithm::EcdsaP256,
                subject: &subject,
                validity: ValidityWindow::starting_now(-30),
                is_ca: false,
                key_out: &dir.path().join("old_key.pem"),
                cert_out: &cert,
            })
            .unwrap();

        let summary = read_summary(&cert).unwrap();
        assert!(summary.is_expired_at(time::OffsetDateTime::now_utc().unix_timestamp()));
    }

    #[test]
    fn test_sign_with_missing_ca_fails() {
        let dir = TempDir::new().unwrap();
        let ca = CaRef::new(dir.path().join("missing.pem"), dir.path().join("missing_key.pem"));
        let csr = dir.path().join("x.csr");
        let result = NativeBackend.sign_csr(&SigningRequest {
            csr: &csr,
            ca: &ca,
            validity: ValidityWindow::starting_now(30),
            extensions: None,
            cert_out: &dir.path().join("x.pem"),
        });
        assert!(matches!(result, Err(FixtureError::StorageError(_))));
    }

    #[test]
    fn test_rsa_key_round_trips_through_rcgen() {
        let pem = generate_key_pem(KeyAlgorithm::Rsa2048).unwrap();
        let key_pair = KeyPair::from_pem(&pem).unwrap();
        assert!(std::ptr::eq(
            signature_algorithm(&key_pair).unwrap(),
            &rcgen::PKCS_RSA_SHA256
        ));
    }
}
