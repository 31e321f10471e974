//! Reading back generated certificates.
//!
//! Used to report what a run produced and whether each certificate chains to
//! the caller's CA.

use crate::error::{FixtureError, Result};
use serde::Serialize;
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::public_key::PublicKey;
use x509_parser::pem::{parse_x509_pem, Pem};

/// The fields of a certificate that matter for fixtures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CertificateSummary {
    pub subject: String,
    pub issuer: String,
    /// Unix timestamp
    pub not_before: i64,
    /// Unix timestamp
    pub not_after: i64,
    pub is_ca: bool,
    /// `RSA` or `EC`
    pub key_algorithm: String,
    pub key_bits: usize,
    /// e.g. `sha256WithRSAEncryption`
    pub signature_algorithm: String,
    /// OpenSSL spelling, e.g. `DNS:localhost`
    pub subject_alt_names: Vec<String>,
    pub client_auth: bool,
}

impl CertificateSummary {
    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }

    pub fn is_expired_at(&self, unix_time: i64) -> bool {
        self.not_after <= unix_time
    }

    /// `not_after` as `YYYY-MM-DD HH:MM:SS` (UTC).
    pub fn not_after_display(&self) -> String {
        chrono::DateTime::from_timestamp(self.not_after, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

fn read_pem(path: &Path) -> Result<Pem> {
    let data = fs::read(path)?;
    let (_, pem) = parse_x509_pem(&data).map_err(|e| {
        FixtureError::PemError(format!("Failed to read {}: {}", path.display(), e))
    })?;
    Ok(pem)
}

fn parse_certificate(pem: &Pem) -> Result<X509Certificate<'_>> {
    pem.parse_x509()
        .map_err(|e| FixtureError::CertificateError(format!("Failed to decode certificate: {}", e)))
}

/// Summarise the certificate stored at `path`.
pub fn read_summary(path: &Path) -> Result<CertificateSummary> {
    let pem = read_pem(path)?;
    let cert = parse_certificate(&pem)?;

    let is_ca = cert
        .basic_constraints()
        .ok()
        .flatten()
        .map(|ext| ext.value.ca)
        .unwrap_or(false);

    let (key_algorithm, key_bits) = match cert.public_key().parsed() {
        Ok(key @ PublicKey::RSA(_)) => ("RSA", key.key_size()),
        Ok(key @ PublicKey::EC(_)) => ("EC", key.key_size()),
        Ok(key) => ("other", key.key_size()),
        Err(_) => ("unknown", 0),
    };

    let subject_alt_names = cert
        .subject_alternative_name()
        .ok()
        .flatten()
        .map(|ext| ext.value.general_names.iter().map(general_name).collect())
        .unwrap_or_default();

    let client_auth = cert
        .extended_key_usage()
        .ok()
        .flatten()
        .map(|ext| ext.value.client_auth)
        .unwrap_or(false);

    Ok(CertificateSummary {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        not_before: cert.validity().not_before.timestamp(),
        not_after: cert.validity().not_after.timestamp(),
        is_ca,
        key_algorithm: key_algorithm.to_string(),
        key_bits,
        signature_algorithm: signature_algorithm_name(&cert),
        subject_alt_names,
        client_auth,
    })
}

fn signature_algorithm_name(cert: &X509Certificate<'_>) -> String {
    let oid = cert.signature_algorithm.algorithm.to_id_string();
    let name = match oid.as_str() {
        "1.2.840.113549.1.1.11" => "sha256WithRSAEncryption",
        "1.2.840.113549.1.1.12" => "sha384WithRSAEncryption",
        "1.2.840.10045.4.3.2" => "ecdsa-with-SHA256",
        "1.2.840.10045.4.3.3" => "ecdsa-with-SHA384",
        "1.3.101.112" => "ED25519",
        _ => return oid,
    };
    name.to_string()
}

fn general_name(name: &GeneralName<'_>) -> String {
    match name {
        GeneralName::DNSName(dns) => format!("DNS:{}", dns),
        GeneralName::RFC822Name(email) => format!("email:{}", email),
        GeneralName::URI(uri) => format!("URI:{}", uri),
        GeneralName::IPAddress(bytes) => match bytes.len() {
            4 => format!("IP:{}", IpAddr::from(<[u8; 4]>::try_from(*bytes).unwrap_or_default())),
            16 => format!("IP:{}", IpAddr::from(<[u8; 16]>::try_from(*bytes).unwrap_or_default())),
            _ => name.to_string(),
        },
        other => other.to_string(),
    }
}

/// Check that the certificate at `cert_path` names the certificate at
/// `issuer_path` as its issuer and carries a valid signature from its key.
///
/// Validity dates are not checked, so an expired certificate from the right
/// issuer still verifies.
pub fn verify_issued_by(cert_path: &Path, issuer_path: &Path) -> Result<bool> {
    let cert_pem = read_pem(cert_path)?;
    let issuer_pem = read_pem(issuer_path)?;
    let cert = parse_certificate(&cert_pem)?;
    let issuer = parse_certificate(&issuer_pem)?;

    if cert.issuer().to_string() != issuer.subject().to_string() {
        return Ok(false);
    }

    Ok(cert.verify_signature(Some(issuer.public_key())).is_ok())
}
