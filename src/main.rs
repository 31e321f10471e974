//! fixture-certs CLI application.
//!
//! Wipes `./certs` (or `--out-dir`) and fills it with the fixture set, signed
//! where appropriate by the CA given with `--ca-cert`/`--ca-key`.

use clap::{CommandFactory, Parser};
use fixture_certs::cert::KeyAlgorithm;
use fixture_certs::config::{BackendKind, GeneratorConfig};
use fixture_certs::error::Result;
use fixture_certs::fixture::CaRef;
use fixture_certs::generator::FixtureGenerator;
use fixture_certs::report::{FixtureStatus, RunReport};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fixture-certs", version)]
#[command(about = "TLS certificate generator for acceptance tests", long_about = None)]
struct Cli {
    /// Path to PEM encoded CA public cert
    #[arg(short = 'c', long = "ca-cert", visible_alias = "caCert", alias = "c", value_name = "PATH")]
    ca_cert: Option<PathBuf>,

    /// Path to PEM encoded CA private key
    #[arg(short = 'k', long = "ca-key", visible_alias = "caKey", alias = "k", value_name = "PATH")]
    ca_key: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output directory, wiped on every run (default: certs)
    #[arg(short = 'o', long, value_name = "PATH")]
    out_dir: Option<PathBuf>,

    /// PKI backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// openssl binary to run
    #[arg(long = "openssl", value_name = "PATH")]
    openssl_path: Option<PathBuf>,

    /// Private key algorithm
    #[arg(long, value_enum)]
    key_type: Option<KeyAlgorithm>,

    /// Fixture subject (default: /CN=credhub_test_client)
    #[arg(long)]
    subject: Option<String>,

    /// Append OU=app:<uuid> to every subject
    #[arg(long)]
    random_subject: bool,

    /// X.509v3 extensions file for certificates signed by the CA. The native
    /// backend reads the top section only: basicConstraints, keyUsage,
    /// extendedKeyUsage and subjectAltName (DNS, IP, email, URI, @section)
    #[arg(long, value_name = "PATH")]
    extensions_file: Option<PathBuf>,

    /// Keep generating after a fixture fails
    #[arg(long)]
    keep_going: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Rewrite the single-dash long spellings (`-caCert`, `-caKey`) that clap
/// would otherwise read as clustered short flags.
fn normalize_legacy_flags(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some(s) if is_legacy_flag(s, "-caCert") || is_legacy_flag(s, "-caKey") => {
                OsString::from(format!("-{}", s))
            }
            _ => arg,
        })
        .collect()
}

fn is_legacy_flag(arg: &str, flag: &str) -> bool {
    arg == flag || arg.strip_prefix(flag).is_some_and(|rest| rest.starts_with('='))
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_config(cli: &Cli) -> Result<GeneratorConfig> {
    let mut config = match &cli.config {
        Some(path) => GeneratorConfig::from_file(path)?,
        None => GeneratorConfig::default(),
    };

    if let Some(out_dir) = &cli.out_dir {
        config.output_dir = out_dir.clone();
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(openssl_path) = &cli.openssl_path {
        config.openssl_path = openssl_path.clone();
    }
    if let Some(key_type) = cli.key_type {
        config.key_algorithm = key_type;
    }
    if let Some(subject) = &cli.subject {
        config.subject = subject.clone();
    }
    if let Some(extensions_file) = &cli.extensions_file {
        config.extensions_file = Some(extensions_file.clone());
    }
    config.disambiguate_subjects |= cli.random_subject;
    config.keep_going |= cli.keep_going;

    config.validate()?;
    Ok(config)
}

fn run(cli: &Cli, ca: &CaRef) -> Result<RunReport> {
    let config = build_config(cli)?;
    let backend = config.build_backend();
    let generator = FixtureGenerator::new(backend, config);
    generator.run(ca)
}

fn print_report(report: &RunReport) {
    println!("Fixtures in {}:", report.output_dir.display());
    println!(
        "{:<12} {:<14} {:<9} {:<20} Subject",
        "Fixture", "Signer", "Trusted", "Expires"
    );
    println!("{}", "-".repeat(80));

    for outcome in &report.outcomes {
        match &outcome.status {
            FixtureStatus::Issued {
                summary,
                trusted_by_ca,
                ..
            } => println!(
                "{:<12} {:<14} {:<9} {:<20} {}",
                outcome.name,
                outcome.signer.to_string(),
                if *trusted_by_ca { "yes" } else { "no" },
                summary.not_after_display(),
                summary.subject
            ),
            FixtureStatus::Failed { error } => {
                println!("{:<12} FAILED: {}", outcome.name, error)
            }
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_legacy_flags(std::env::args_os()));

    let (Some(ca_cert), Some(ca_key)) = (&cli.ca_cert, &cli.ca_key) else {
        eprintln!("{}", Cli::command().render_usage());
        return ExitCode::from(1);
    };
    let ca = CaRef::new(ca_cert, ca_key);

    init_tracing(cli.verbose);

    let report = match run(&cli, &ca) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(1);
        }
    };

    if cli.json {
        match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                tracing::error!("{}", e);
                return ExitCode::from(1);
            }
        }
    } else {
        print_report(&report);
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        for failure in report.failures() {
            tracing::error!("fixture {} was not generated", failure.name);
        }
        ExitCode::from(1)
    }
}
