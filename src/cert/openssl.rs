//! Backend that shells out to the `openssl` command-line tool.
//!
//! Every invocation's exit status is checked. `openssl x509 -days` rejects
//! negative periods, so non-positive validity is signed with `openssl ca`
//! against a throwaway database with explicit start and end dates.

use crate::cert::builder::{generalized_time, random_serial_hex, Subject};
use crate::cert::{KeyAlgorithm, PkiBackend, SelfSignedRequest, SigningRequest};
use crate::error::{FixtureError, Result};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// Minimal `openssl ca` configuration. Every DN field is optional.
const CA_CONFIG: &str = "\
[ ca ]
default_ca = fixture_ca

[ fixture_ca ]
database = index.txt
new_certs_dir = .
serial = serial
default_md = sha256
policy = fixture_policy
unique_subject = no
email_in_dn = no
copy_extensions = none

[ fixture_policy ]
countryName = optional
stateOrProvinceName = optional
localityName = optional
organizationName = optional
organizationalUnitName = optional
commonName = optional
";

/// Drives an `openssl` binary.
#[derive(Debug, Clone)]
pub struct OpensslCli {
    program: PathBuf,
}

impl Default for OpensslCli {
    fn default() -> Self {
        Self::new("openssl")
    }
}

impl OpensslCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Whether the binary can be started at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Run one openssl subcommand, failing on a non-zero exit status.
    fn run<I, S>(&self, subcommand: &str, args: I, current_dir: Option<&Path>) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.program);
        command
            .arg(subcommand)
            .args(args)
            .stdin(Stdio::null());
        if let Some(dir) = current_dir {
            command.current_dir(dir);
        }
        tracing::debug!(?command, "running openssl");

        let output = command.output().map_err(|source| FixtureError::SpawnError {
            program: self.program.display().to_string(),
            source,
        })?;

        if !output.status.success() {
            return Err(FixtureError::ToolError {
                program: self.program.display().to_string(),
                subcommand: subcommand.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }

    /// Sign with `openssl ca` so arbitrary (including past) dates are possible.
    fn sign_with_dates(&self, request: &SigningRequest<'_>) -> Result<()> {
        let scratch = TempDir::new()?;
        fs::write(scratch.path().join("openssl.cnf"), CA_CONFIG)?;
        fs::write(scratch.path().join("index.txt"), "")?;
        fs::write(scratch.path().join("serial"), format!("{}\n", random_serial_hex()))?;

        let csr = absolute(request.csr)?;
        let cert_out = absolute(request.cert_out)?;
        let ca_cert = absolute(&request.ca.cert)?;
        let ca_key = absolute(&request.ca.key)?;

        let mut args: Vec<std::ffi::OsString> = vec![
            "-batch".into(),
            "-preserveDN".into(),
            "-config".into(),
            "openssl.cnf".into(),
            "-notext".into(),
            "-cert".into(),
            ca_cert.into(),
            "-keyfile".into(),
            ca_key.into(),
            "-in".into(),
            csr.into(),
            "-out".into(),
            cert_out.into(),
            "-startdate".into(),
            generalized_time(request.validity.not_before).into(),
            "-enddate".into(),
            generalized_time(request.validity.not_after).into(),
        ];
        if let Some(extensions) = request.extensions {
            args.push("-extfile".into());
            args.push(absolute(extensions)?.into());
        }

        self.run("ca", args, Some(scratch.path()))
    }
}

impl PkiBackend for OpensslCli {
    fn name(&self) -> &'static str {
        "openssl"
    }

    fn generate_key(&self, algorithm: KeyAlgorithm, key_out: &Path) -> Result<()> {
        match algorithm {
            KeyAlgorithm::Rsa2048 => self.run(
                "genrsa",
                [OsStr::new("-out"), key_out.as_os_str(), OsStr::new("2048")],
                None,
            ),
            KeyAlgorithm::EcdsaP256 => self.run(
                "genpkey",
                [
                    OsStr::new("-algorithm"),
                    OsStr::new("EC"),
                    OsStr::new("-pkeyopt"),
                    OsStr::new("ec_paramgen_curve:P-256"),
                    OsStr::new("-out"),
                    key_out.as_os_str(),
                ],
                None,
            ),
        }
    }

    fn create_csr(&self, key: &Path, subject: &Subject, csr_out: &Path) -> Result<()> {
        let subj = subject.to_openssl();
        self.run(
            "req",
            [
                OsStr::new("-new"),
                OsStr::new("-sha256"),
                OsStr::new("-key"),
                key.as_os_str(),
                OsStr::new("-out"),
                csr_out.as_os_str(),
                OsStr::new("-subj"),
                OsStr::new(&subj),
            ],
            None,
        )
    }

    fn sign_csr(&self, request: &SigningRequest<'_>) -> Result<()> {
        if request.validity.days <= 0 {
            return self.sign_with_dates(request);
        }

        let days = request.validity.days.to_string();
        let serial = format!("0x{}", random_serial_hex());
        let mut args = vec![
            OsStr::new("-req"),
            OsStr::new("-in"),
            request.csr.as_os_str(),
            OsStr::new("-CA"),
            request.ca.cert.as_os_str(),
            OsStr::new("-CAkey"),
            request.ca.key.as_os_str(),
            OsStr::new("-set_serial"),
            OsStr::new(&serial),
            OsStr::new("-days"),
            OsStr::new(&days),
            OsStr::new("-sha256"),
            OsStr::new("-out"),
            request.cert_out.as_os_str(),
        ];
        if let Some(extensions) = request.extensions {
            args.push(OsStr::new("-extfile"));
            args.push(extensions.as_os_str());
        }

        self.run("x509", args, None)
    }

    fn self_signed(&self, request: &SelfSignedRequest<'_>) -> Result<()> {
        if request.validity.days <= 0 {
            return Err(FixtureError::CertificateError(format!(
                "openssl cannot self-sign with a validity of {} days",
                request.validity.days
            )));
        }

        let days = request.validity.days.to_string();
        let subj = request.subject.to_openssl();
        let newkey = match request.algorithm {
            KeyAlgorithm::Rsa2048 => vec!["-newkey", "rsa:2048"],
            KeyAlgorithm::EcdsaP256 => {
                vec!["-newkey", "ec", "-pkeyopt", "ec_paramgen_curve:P-256"]
            }
        };

        let mut args: Vec<&OsStr> = vec![OsStr::new("-x509")];
        args.extend(newkey.into_iter().map(OsStr::new));
        args.extend([
            OsStr::new("-days"),
            OsStr::new(&days),
            OsStr::new("-subj"),
            OsStr::new(&subj),
            OsStr::new("-nodes"),
            OsStr::new("-sha256"),
            OsStr::new("-keyout"),
            request.key_out.as_os_str(),
            OsStr::new("-out"),
            request.cert_out.as_os_str(),
        ]);
        if request.is_ca {
            args.extend([
                OsStr::new("-addext"),
                OsStr::new("basicConstraints=critical,CA:TRUE"),
                OsStr::new("-addext"),
                OsStr::new("keyUsage=critical,keyCertSign,cRLSign,digitalSignature"),
            ]);
        } else {
            args.extend([
                OsStr::new("-addext"),
                OsStr::new("basicConstraints=CA:FALSE"),
            ]);
        }

        self.run("req", args, None)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
