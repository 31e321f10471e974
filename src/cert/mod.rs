//! Certificate generation backends.
//!
//! A [`PkiBackend`] performs the four primitive steps every fixture is built
//! from: key generation, CSR creation, CSR signing and self-signing. All steps
//! read and write PEM files so the backends are interchangeable.

pub mod builder;
pub mod extensions;
pub mod loader;
pub mod native;
pub mod openssl;

use crate::cert::builder::{Subject, ValidityWindow};
use crate::error::Result;
use crate::fixture::CaRef;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use native::NativeBackend;
pub use openssl::OpensslCli;

/// Private key algorithm for generated fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum KeyAlgorithm {
    /// 2048-bit RSA with SHA-256 signatures
    #[default]
    Rsa2048,
    /// NIST P-256 ECDSA with SHA-256 signatures
    EcdsaP256,
}

/// Sign a CSR with a CA.
#[derive(Debug, Clone, Copy)]
pub struct SigningRequest<'a> {
    pub csr: &'a Path,
    pub ca: &'a CaRef,
    pub validity: ValidityWindow,
    /// OpenSSL-style X.509v3 extensions file applied to the new certificate.
    pub extensions: Option<&'a Path>,
    pub cert_out: &'a Path,
}

/// Generate a fresh key and a certificate signed by that same key.
#[derive(Debug, Clone, Copy)]
pub struct SelfSignedRequest<'a> {
    pub algorithm: KeyAlgorithm,
    pub subject: &'a Subject,
    pub validity: ValidityWindow,
    pub is_ca: bool,
    pub key_out: &'a Path,
    pub cert_out: &'a Path,
}

/// The primitive PKI operations fixtures are composed from.
pub trait PkiBackend {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Write a new private key to `key_out`.
    fn generate_key(&self, algorithm: KeyAlgorithm, key_out: &Path) -> Result<()>;

    /// Write a CSR for the key at `key` with the given subject.
    fn create_csr(&self, key: &Path, subject: &Subject, csr_out: &Path) -> Result<()>;

    /// Sign a CSR with the CA in `request`.
    fn sign_csr(&self, request: &SigningRequest<'_>) -> Result<()>;

    /// Generate a key and a self-signed certificate.
    fn self_signed(&self, request: &SelfSignedRequest<'_>) -> Result<()>;
}

impl<B: PkiBackend + ?Sized> PkiBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn generate_key(&self, algorithm: KeyAlgorithm, key_out: &Path) -> Result<()> {
        (**self).generate_key(algorithm, key_out)
    }

    fn create_csr(&self, key: &Path, subject: &Subject, csr_out: &Path) -> Result<()> {
        (**self).create_csr(key, subject, csr_out)
    }

    fn sign_csr(&self, request: &SigningRequest<'_>) -> Result<()> {
        (**self).sign_csr(request)
    }

    fn self_signed(&self, request: &SelfSignedRequest<'_>) -> Result<()> {
        (**self).self_signed(request)
    }
}
