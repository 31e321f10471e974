//! Loading CA material from PEM files.
//!
//! The caller's CA may come from any tool: keys are accepted as PKCS#8
//! (`PRIVATE KEY`) or PKCS#1 RSA (`RSA PRIVATE KEY`) and normalised to PKCS#8,
//! which is the only form rcgen can load.

use crate::error::{FixtureError, Result};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use rustls_pemfile::Item;
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Read a certificate PEM file, checking that it contains a certificate.
///
/// Returns the file contents unchanged.
pub fn read_certificate_pem(path: &Path) -> Result<String> {
    let pem = fs::read_to_string(path)?;
    load_certificate_from_pem(&pem)?;
    Ok(pem)
}

/// Extract the DER bytes of the first certificate in a PEM string.
pub fn load_certificate_from_pem(pem_str: &str) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(pem_str.as_bytes());

    loop {
        match rustls_pemfile::read_one(&mut cursor)
            .map_err(|e| FixtureError::PemError(format!("Failed to read PEM: {}", e)))?
        {
            Some(Item::X509Certificate(cert_der)) => return Ok(cert_der.to_vec()),
            Some(_) => continue,
            None => {
                return Err(FixtureError::PemError(
                    "PEM file does not contain a certificate".to_string(),
                ))
            }
        }
    }
}

/// Read a private key PEM file and return it as PKCS#8 PEM.
pub fn read_private_key_pkcs8(path: &Path) -> Result<String> {
    let pem = fs::read_to_string(path)?;
    private_key_to_pkcs8(&pem)
}

/// Normalise the first private key in a PEM string to PKCS#8 PEM.
pub fn private_key_to_pkcs8(pem_str: &str) -> Result<String> {
    let mut cursor = Cursor::new(pem_str.as_bytes());

    loop {
        match rustls_pemfile::read_one(&mut cursor)
            .map_err(|e| FixtureError::PemError(format!("Failed to read PEM: {}", e)))?
        {
            Some(Item::Pkcs8Key(_)) => return Ok(pem_str.to_string()),
            Some(Item::Pkcs1Key(key)) => {
                let rsa_key = RsaPrivateKey::from_pkcs1_der(key.secret_pkcs1_der()).map_err(|e| {
                    FixtureError::InvalidKeyError(format!("Failed to decode RSA key: {}", e))
                })?;
                let pkcs8 = rsa_key.to_pkcs8_pem(LineEnding::LF).map_err(|e| {
                    FixtureError::InvalidKeyError(format!("Failed to encode PKCS#8: {}", e))
                })?;
                return Ok(pkcs8.to_string());
            }
            Some(Item::Sec1Key(_)) => {
                return Err(FixtureError::InvalidKeyError(
                    "SEC1 EC keys are not supported, convert to PKCS#8".to_string(),
                ))
            }
            Some(_) => continue,
            None => {
                return Err(FixtureError::PemError(
                    "PEM file does not contain a private key".to_string(),
                ))
            }
        }
    }
}
