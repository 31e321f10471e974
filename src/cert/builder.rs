//! Certificate builder utilities.
//!
//! Subject parsing and validity windows shared by every backend.

use crate::error::{FixtureError, Result};
use rand::RngCore;
use rcgen::{DistinguishedName, DnType};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Prefix of the identifier `OU` added by [`Subject::with_random_id`].
pub const APP_ID_PREFIX: &str = "app:";

/// A distinguished name attribute supported in fixture subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnAttribute {
    CommonName,
    Country,
    Organization,
    OrganizationalUnit,
    State,
    Locality,
}

impl DnAttribute {
    fn from_key(key: &str) -> Result<Self> {
        match key.to_uppercase().as_str() {
            "CN" => Ok(DnAttribute::CommonName),
            "C" => Ok(DnAttribute::Country),
            "O" => Ok(DnAttribute::Organization),
            "OU" => Ok(DnAttribute::OrganizationalUnit),
            "ST" => Ok(DnAttribute::State),
            "L" => Ok(DnAttribute::Locality),
            _ => Err(FixtureError::ParseError(format!("Unknown DN type: {}", key))),
        }
    }

    fn key(self) -> &'static str {
        match self {
            DnAttribute::CommonName => "CN",
            DnAttribute::Country => "C",
            DnAttribute::Organization => "O",
            DnAttribute::OrganizationalUnit => "OU",
            DnAttribute::State => "ST",
            DnAttribute::Locality => "L",
        }
    }

    fn dn_type(self) -> DnType {
        match self {
            DnAttribute::CommonName => DnType::CommonName,
            DnAttribute::Country => DnType::CountryName,
            DnAttribute::Organization => DnType::OrganizationName,
            DnAttribute::OrganizationalUnit => DnType::OrganizationalUnitName,
            DnAttribute::State => DnType::StateOrProvinceName,
            DnAttribute::Locality => DnType::LocalityName,
        }
    }
}

/// An ordered certificate subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    attributes: Vec<(DnAttribute, String)>,
}

impl Subject {
    /// Parse a subject string.
    ///
    /// Both the comma form (`CN=example.com,O=Example Org`) and the OpenSSL
    /// slash form (`/CN=example.com/O=Example Org`) are accepted.
    ///
    /// # Example
    ///
    /// ```
    /// use fixture_certs::cert::builder::Subject;
    ///
    /// let subject = Subject::parse("/CN=credhub_test_client/O=Acme").unwrap();
    /// assert_eq!(subject.to_string(), "CN=credhub_test_client,O=Acme");
    /// ```
    pub fn parse(subject: &str) -> Result<Self> {
        let subject = subject.trim();
        let parts: Vec<&str> = match subject.strip_prefix('/') {
            Some(rest) => rest.split('/').collect(),
            None => subject.split(',').collect(),
        };

        let mut attributes = Vec::new();
        for part in parts {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part.split_once('=').ok_or_else(|| {
                FixtureError::ParseError(format!("Invalid subject format: {}", part))
            })?;
            let value = value.trim();
            if value.is_empty() {
                return Err(FixtureError::ParseError(format!(
                    "Empty value for {}",
                    key.trim()
                )));
            }
            attributes.push((DnAttribute::from_key(key.trim())?, value.to_string()));
        }

        if attributes.is_empty() {
            return Err(FixtureError::ParseError(
                "Subject cannot be empty".to_string(),
            ));
        }

        Ok(Self { attributes })
    }

    /// Returns a copy with an `OU=app:<uuid>` identifier appended, so that
    /// fixtures from different runs never share a subject.
    pub fn with_random_id(&self) -> Self {
        let mut attributes = self.attributes.clone();
        attributes.push((
            DnAttribute::OrganizationalUnit,
            format!("{}{}", APP_ID_PREFIX, Uuid::new_v4()),
        ));
        Self { attributes }
    }

    pub fn attributes(&self) -> &[(DnAttribute, String)] {
        &self.attributes
    }

    /// Render for `openssl req -subj`.
    pub fn to_openssl(&self) -> String {
        self.attributes
            .iter()
            .map(|(attr, value)| format!("/{}={}", attr.key(), value.replace('/', "\\/")))
            .collect()
    }

    pub fn to_distinguished_name(&self) -> DistinguishedName {
        let mut dn = DistinguishedName::new();
        for (attr, value) in &self.attributes {
            dn.push(attr.dn_type(), value.as_str());
        }
        dn
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self
            .attributes
            .iter()
            .map(|(attr, value)| format!("{}={}", attr.key(), value))
            .collect();
        write!(f, "{}", rendered.join(","))
    }
}

/// The period a certificate is valid for.
///
/// A positive day count gives `[now, now + days]`. A non-positive count gives a
/// window of the same length that ended `|days|` days ago, so the certificate is
/// already expired when written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    pub days: i64,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl ValidityWindow {
    pub fn from_days(days: i64, now: OffsetDateTime) -> Self {
        let (not_before, not_after) = if days > 0 {
            (now, now + Duration::days(days))
        } else {
            (now + Duration::days(2 * days), now + Duration::days(days))
        };
        Self {
            days,
            not_before,
            not_after,
        }
    }

    pub fn starting_now(days: i64) -> Self {
        Self::from_days(days, OffsetDateTime::now_utc())
    }

    pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
        self.not_after <= instant
    }
}

/// Format a timestamp as an ASN.1 GeneralizedTime (`YYYYMMDDHHMMSSZ`).
pub fn generalized_time(instant: OffsetDateTime) -> String {
    let utc = instant.to_offset(time::UtcOffset::UTC);
    format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}Z",
        utc.year(),
        u8::from(utc.month()),
        utc.day(),
        utc.hour(),
        utc.minute(),
        utc.second()
    )
}

/// Random positive certificate serial, hex encoded.
pub fn random_serial_hex() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes[0] &= 0x7F;
    bytes[0] |= 0x01;
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_parse_subject_single_field() {
        let subject = Subject::parse("CN=example.com").unwrap();
        assert_eq!(subject.attributes().len(), 1);
    }

    #[test]
    fn test_parse_subject_multiple_fields() {
        let subject = Subject::parse("CN=example.com,O=Example Org,C=US").unwrap();
        assert_eq!(subject.attributes().len(), 3);
        assert_eq!(subject.attributes()[2], (DnAttribute::Country, "US".to_string()));
    }

    #[test]
    fn test_parse_subject_openssl_form() {
        let subject = Subject::parse("/CN=credhub_test_client/OU=acceptance").unwrap();
        assert_eq!(subject.to_string(), "CN=credhub_test_client,OU=acceptance");
        assert_eq!(subject.to_openssl(), "/CN=credhub_test_client/OU=acceptance");
    }

    #[test]
    fn test_parse_subject_with_spaces() {
        let subject = Subject::parse("CN = example.com , O = Example Org").unwrap();
        assert_eq!(subject.to_string(), "CN=example.com,O=Example Org");
    }

    #[test]
    fn test_parse_subject_empty() {
        assert!(Subject::parse("").is_err());
        assert!(Subject::parse("/").is_err());
    }

    #[test]
    fn test_parse_subject_invalid_format() {
        assert!(Subject::parse("invalid").is_err());
        assert!(Subject::parse("CN=").is_err());
    }

    #[test]
    fn test_parse_subject_unknown_type() {
        assert!(Subject::parse("XX=value").is_err());
    }

    #[test]
    fn test_openssl_escapes_slashes() {
        let subject = Subject::parse("CN=a/b").unwrap();
        assert_eq!(subject.to_openssl(), "/CN=a\\/b");
    }

    #[test]
    fn test_with_random_id_appends_ou() {
        let subject = Subject::parse("CN=client").unwrap();
        let first = subject.with_random_id();
        let second = subject.with_random_id();

        assert_eq!(first.attributes().len(), 2);
        let (attr, value) = &first.attributes()[1];
        assert_eq!(*attr, DnAttribute::OrganizationalUnit);
        let id = value.strip_prefix(APP_ID_PREFIX).unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_ne!(first, second);
        assert!(first.to_openssl().starts_with("/CN=client/OU=app:"));
    }

    #[test]
    fn test_distinguished_name_has_all_attributes() {
        let dn = Subject::parse("CN=client,O=Org").unwrap().to_distinguished_name();
        assert_eq!(dn.iter().count(), 2);
    }

    #[test]
    fn test_validity_positive() {
        let now = datetime!(2026-01-01 00:00 UTC);
        let window = ValidityWindow::from_days(30, now);
        assert_eq!(window.not_before, now);
        assert_eq!(window.not_after, datetime!(2026-01-31 00:00 UTC));
        assert!(!window.is_expired_at(now));
    }

    #[test]
    fn test_validity_negative_is_expired() {
        let now = datetime!(2026-03-01 00:00 UTC);
        let window = ValidityWindow::from_days(-30, now);
        assert_eq!(window.not_after, now - Duration::days(30));
        assert_eq!(window.not_after - window.not_before, Duration::days(30));
        assert!(window.is_expired_at(now));
    }

    #[test]
    fn test_generalized_time() {
        let instant = datetime!(2026-02-03 04:05:06 UTC);
        assert_eq!(generalized_time(instant), "20260203040506Z");
    }

    #[test]
    fn test_random_serial_is_positive() {
        let serial = random_serial_hex();
        assert_eq!(serial.len(), 32);
        let first = u8::from_str_radix(&serial[..2], 16).unwrap();
        assert!(first < 0x80 && first > 0);
    }
}
