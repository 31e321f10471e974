//! OpenSSL-style X.509v3 extension files.
//!
//! The OpenSSL backend hands the file to `-extfile` untouched. The native
//! backend parses the subset below and applies it to rcgen parameters:
//!
//! ```text
//! # client extensions
//! basicConstraints = critical, CA:FALSE
//! keyUsage = digitalSignature, keyEncipherment
//! extendedKeyUsage = clientAuth
//! subjectAltName = @alt_names
//!
//! [ alt_names ]
//! DNS.1 = localhost
//! IP.1 = 127.0.0.1
//! ```

use crate::error::{FixtureError, Result};
use rcgen::{
    BasicConstraints, CertificateParams, ExtendedKeyUsagePurpose, IsCa, KeyUsagePurpose, SanType,
};
use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

/// Extensions parsed from an extensions file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct X509Extensions {
    pub is_ca: Option<bool>,
    pub key_usages: Vec<KeyUsagePurpose>,
    pub extended_key_usages: Vec<ExtendedKeyUsagePurpose>,
    pub subject_alt_names: Vec<SanType>,
}

impl X509Extensions {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse an extensions file the way `openssl x509 -extfile` reads it:
    /// only the unnamed section at the top applies, and named sections are
    /// used solely as `@section` targets of `subjectAltName`.
    pub fn parse(content: &str) -> Result<Self> {
        let sections = split_sections(content)?;
        let mut extensions = Self::default();

        for (key, value) in sections.get("").into_iter().flatten() {
            let values: Vec<&str> = value
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty() && *v != "critical")
                .collect();

            match key.as_str() {
                "basicConstraints" => extensions.is_ca = Some(parse_basic_constraints(&values)?),
                "keyUsage" => {
                    for v in values {
                        extensions.key_usages.push(parse_key_usage(v)?);
                    }
                }
                "extendedKeyUsage" => {
                    for v in values {
                        extensions.extended_key_usages.push(parse_extended_key_usage(v)?);
                    }
                }
                "subjectAltName" => match value.strip_prefix('@') {
                    // a section reference must be the whole value
                    Some(name) => {
                        let entries = sections.get(name.trim()).ok_or_else(|| {
                            FixtureError::ParseError(format!("Missing section: {}", name))
                        })?;
                        for (kind, entry) in entries {
                            // DNS.1 = example.com
                            let kind = kind.split('.').next().unwrap_or_default();
                            extensions
                                .subject_alt_names
                                .push(parse_san(&format!("{}:{}", kind, entry))?);
                        }
                    }
                    None => {
                        for v in values {
                            extensions.subject_alt_names.push(parse_san(v)?);
                        }
                    }
                },
                other => {
                    return Err(FixtureError::ParseError(format!(
                        "Unsupported extension: {}",
                        other
                    )))
                }
            }
        }

        Ok(extensions)
    }

    /// Apply to certificate parameters, replacing whatever they already hold
    /// for each extension present in the file.
    pub fn apply(&self, params: &mut CertificateParams) {
        if let Some(is_ca) = self.is_ca {
            params.is_ca = if is_ca {
                IsCa::Ca(BasicConstraints::Unconstrained)
            } else {
                IsCa::ExplicitNoCa
            };
        }
        if !self.key_usages.is_empty() {
            params.key_usages = self.key_usages.clone();
        }
        if !self.extended_key_usages.is_empty() {
            params.extended_key_usages = self.extended_key_usages.clone();
        }
        if !self.subject_alt_names.is_empty() {
            params.subject_alt_names = self.subject_alt_names.clone();
        }
    }
}

/// `key = value` pairs per section; the unnamed top section is `""`.
fn split_sections(content: &str) -> Result<HashMap<String, Vec<(String, String)>>> {
    let mut sections: HashMap<String, Vec<(String, String)>> = HashMap::new();
    let mut current = String::new();

    for line in content.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = name.trim().to_string();
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            FixtureError::ParseError(format!("Invalid extension line: {}", line))
        })?;
        sections
            .entry(current.clone())
            .or_default()
            .push((key.trim().to_string(), value.trim().to_string()));
    }

    Ok(sections)
}

fn parse_basic_constraints(values: &[&str]) -> Result<bool> {
    let mut is_ca = None;
    for value in values {
        match value.to_uppercase().as_str() {
            "CA:TRUE" => is_ca = Some(true),
            "CA:FALSE" => is_ca = Some(false),
            other if other.starts_with("PATHLEN:") => {}
            other => {
                return Err(FixtureError::ParseError(format!(
                    "Unsupported basicConstraints value: {}",
                    other
                )))
            }
        }
    }
    is_ca.ok_or_else(|| FixtureError::ParseError("basicConstraints needs CA:TRUE or CA:FALSE".to_string()))
}

fn parse_key_usage(value: &str) -> Result<KeyUsagePurpose> {
    let usage = match value {
        "digitalSignature" => KeyUsagePurpose::DigitalSignature,
        "nonRepudiation" => KeyUsagePurpose::ContentCommitment,
        "keyEncipherment" => KeyUsagePurpose::KeyEncipherment,
        "dataEncipherment" => KeyUsagePurpose::DataEncipherment,
        "keyAgreement" => KeyUsagePurpose::KeyAgreement,
        "keyCertSign" => KeyUsagePurpose::KeyCertSign,
        "cRLSign" => KeyUsagePurpose::CrlSign,
        "encipherOnly" => KeyUsagePurpose::EncipherOnly,
        "decipherOnly" => KeyUsagePurpose::DecipherOnly,
        other => {
            return Err(FixtureError::ParseError(format!(
                "Unknown keyUsage: {}",
                other
            )))
        }
    };
    Ok(usage)
}

fn parse_extended_key_usage(value: &str) -> Result<ExtendedKeyUsagePurpose> {
    let usage = match value {
        "serverAuth" => ExtendedKeyUsagePurpose::ServerAuth,
        "clientAuth" => ExtendedKeyUsagePurpose::ClientAuth,
        "codeSigning" => ExtendedKeyUsagePurpose::CodeSigning,
        "emailProtection" => ExtendedKeyUsagePurpose::EmailProtection,
        "timeStamping" => ExtendedKeyUsagePurpose::TimeStamping,
        "OCSPSigning" => ExtendedKeyUsagePurpose::OcspSigning,
        other => {
            return Err(FixtureError::ParseError(format!(
                "Unknown extendedKeyUsage: {}",
                other
            )))
        }
    };
    Ok(usage)
}

fn parse_san(value: &str) -> Result<SanType> {
    let (kind, name) = value
        .split_once(':')
        .ok_or_else(|| FixtureError::ParseError(format!("Invalid subjectAltName: {}", value)))?;
    let name = name.trim();

    match kind.trim() {
        "DNS" => Ok(SanType::DnsName(name.to_string())),
        "email" => Ok(SanType::Rfc822Name(name.to_string())),
        "URI" => Ok(SanType::URI(name.to_string())),
        "IP" => name
            .parse::<IpAddr>()
            .map(SanType::IpAddress)
            .map_err(|e| FixtureError::ParseError(format!("Invalid IP {}: {}", name, e))),
        other => Err(FixtureError::ParseError(format!(
            "Unsupported subjectAltName type: {}",
            other
        ))),
    }
}
