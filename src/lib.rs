//! fixture-certs: TLS certificate fixtures for acceptance tests
//!
//! Given a trusted CA certificate and key, this library produces a fixed set of
//! PEM files that exercise distinct trust outcomes:
//!
//! - `client`: valid for 30 days, signed by the supplied CA
//! - `selfsigned`: self-signed, no external issuer
//! - `unknown`: signed by a freshly minted CA nobody trusts
//! - `expired`: signed by the supplied CA, already past its validity
//!
//! # Architecture
//!
//! The [`generator::FixtureGenerator`] composes every fixture from four
//! primitive steps exposed by a [`cert::PkiBackend`]: key generation, CSR
//! creation, CSR signing and self-signing. [`cert::OpensslCli`] runs each step
//! through the `openssl` binary and checks its exit status;
//! [`cert::NativeBackend`] does the same work in-process with rcgen.
//!
//! # Example
//!
//! ```rust,no_run
//! use fixture_certs::cert::NativeBackend;
//! use fixture_certs::config::GeneratorConfig;
//! use fixture_certs::fixture::CaRef;
//! use fixture_certs::generator::FixtureGenerator;
//! use fixture_certs::error::Result;
//!
//! fn example() -> Result<()> {
//!     let generator = FixtureGenerator::new(NativeBackend, GeneratorConfig::default());
//!     let report = generator.run(&CaRef::new("ca.pem", "ca_key.pem"))?;
//!     assert!(report.is_success());
//!     Ok(())
//! }
//! ```

pub mod cert;
pub mod config;
pub mod error;
pub mod fixture;
pub mod generator;
pub mod inspect;
pub mod report;

// Re-export commonly used types
pub use error::{FixtureError, Result};
