// SPDX-License-Identifier: GPL-3.0-only

//! eMMC Storage Service - management front end for an encrypted eMMC volume
//!
//! Each invocation runs one operation against the configured volume and
//! prints its outcome as JSON on stdout. Passphrases are read from stdin,
//! one per line.

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use storage_types::{ErasePass, EraseRequest, FilesystemType};
use tracing_subscriber::{EnvFilter, fmt};
use zeroize::Zeroizing;

mod config;
mod error;
mod guard;
mod volume;

use config::{DEFAULT_CONFIG_PATH, ServiceConfig};
use guard::{SharedVolume, VolumeLock};
use volume::{Outcome, Request, Secret};

#[derive(Parser)]
#[command(name = "emmc-storage-service")]
#[command(about = "Provision, lock and securely erase an encrypted eMMC volume", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show lock state, geometry and device health
    Status,
    /// Create a new encrypted volume and mount it (destroys existing data)
    Format {
        /// Filesystem to create inside the volume
        #[arg(long, default_value = "ext4")]
        fs_type: FilesystemType,
    },
    /// Open the volume and mount its filesystem
    Unlock,
    /// Unmount the filesystem and close the volume
    Lock,
    /// Replace a passphrase (old then new on stdin)
    ChangePassword,
    /// Erase or verify the device
    Erase {
        method: EraseMethodArg,
        /// Write the data or check what an earlier run wrote
        #[arg(long, value_enum, default_value_t = PassArg::Overwrite)]
        pass: PassArg,
        /// Limit the operation to the first N bytes
        #[arg(long)]
        bytes: Option<u64>,
    },
    /// Enable background operations on the card
    Bkops,
}

#[derive(Clone, Copy, ValueEnum)]
enum EraseMethodArg {
    VerifyGeometry,
    Pattern,
    Zero,
    Sanitize,
    Crypto,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PassArg {
    Overwrite,
    Verify,
}

impl From<PassArg> for ErasePass {
    fn from(pass: PassArg) -> Self {
        match pass {
            PassArg::Overwrite => ErasePass::Overwrite,
            PassArg::Verify => ErasePass::Verify,
        }
    }
}

fn erase_request(method: EraseMethodArg, pass: PassArg, bytes: Option<u64>) -> EraseRequest {
    let pass = ErasePass::from(pass);
    match method {
        EraseMethodArg::VerifyGeometry => EraseRequest::VerifyGeometry,
        EraseMethodArg::Pattern => EraseRequest::Pattern { pass, bytes },
        EraseMethodArg::Zero => EraseRequest::Zero { pass, bytes },
        EraseMethodArg::Sanitize => EraseRequest::Sanitize {
            bytes,
            ext_csd: None,
        },
        EraseMethodArg::Crypto => EraseRequest::CryptoErase,
    }
}

/// Read one passphrase line, without its line ending
fn read_secret(input: &mut impl BufRead) -> Result<Secret> {
    let mut line = Zeroizing::new(Vec::new());
    input
        .read_until(b'\n', &mut line)
        .context("Failed to read passphrase from stdin")?;
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
    if line.is_empty() {
        anyhow::bail!("Empty passphrase on stdin");
    }
    Ok(line)
}

fn build_request(command: Commands, input: &mut impl BufRead) -> Result<Request> {
    Ok(match command {
        Commands::Status => Request::Status,
        Commands::Format { fs_type } => Request::Format {
            password: read_secret(input)?,
            fs_type,
        },
        Commands::Unlock => Request::Unlock {
            password: read_secret(input)?,
        },
        Commands::Lock => Request::Lock,
        Commands::ChangePassword => Request::ChangePassword {
            old_password: read_secret(input)?,
            new_password: read_secret(input)?,
        },
        Commands::Erase {
            method,
            pass,
            bytes,
        } => Request::Erase(erase_request(method, pass, bytes)),
        Commands::Bkops => Request::Bkops,
    })
}

/// Run `request` on the blocking pool
///
/// Sanitize and BKOPS ioctls cannot be interrupted once issued, so Ctrl-C
/// only logs and keeps waiting for the call to return.
async fn run_blocking(shared: SharedVolume, request: Request) -> Result<Outcome> {
    let name = request.name();
    let mut task = tokio::task::spawn_blocking(move || {
        let mut manager = shared.try_claim()?;
        volume::execute(&mut manager, request)
    });

    let outcome = loop {
        tokio::select! {
            joined = &mut task => break joined,
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                tracing::warn!(
                    "{} is in progress and cannot be cancelled; waiting for it to finish",
                    name
                );
            }
        }
    };

    let outcome = outcome.map_err(|e| error::ServiceError::Task(e.to_string()))?;
    match outcome {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&err)?);
            Err(err).with_context(|| format!("{name} failed"))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they don't interfere with JSON on stdout
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("storage_service=info,storage_volume=info,storage_sys=info,warn")
        }))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::info!("eMMC Storage Service v{}", env!("CARGO_PKG_VERSION"));

    if unsafe { libc::geteuid() } != 0 {
        tracing::error!("Storage service must run as root");
        anyhow::bail!("Service must run with root privileges");
    }

    let config = ServiceConfig::load(&cli.config)?;
    let request = {
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        build_request(cli.command, &mut input)?
    };

    let _lock = VolumeLock::acquire(&config.lock_dir, &config.volume.container_name)?;
    let manager = volume::open_volume(&config)?;
    let outcome = run_blocking(SharedVolume::new(manager), request).await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_lose_their_line_endings() {
        let mut input = std::io::Cursor::new(b"old pass\r\nnew-pass\n".to_vec());
        assert_eq!(read_secret(&mut input).expect("first").as_slice(), b"old pass");
        assert_eq!(read_secret(&mut input).expect("second").as_slice(), b"new-pass");
        assert!(read_secret(&mut input).is_err());
    }

    #[test]
    fn change_password_reads_two_lines() {
        let mut input = std::io::Cursor::new(b"a\nb\n".to_vec());
        let request = build_request(Commands::ChangePassword, &mut input).expect("request");
        match request {
            Request::ChangePassword {
                old_password,
                new_password,
            } => {
                assert_eq!(old_password.as_slice(), b"a");
                assert_eq!(new_password.as_slice(), b"b");
            }
            _ => panic!("unexpected request {}", request.name()),
        }
    }

    #[test]
    fn erase_arguments_select_the_strategy() {
        assert_eq!(
            erase_request(EraseMethodArg::Zero, PassArg::Verify, Some(4096)),
            EraseRequest::Zero {
                pass: ErasePass::Verify,
                bytes: Some(4096)
            }
        );
        assert_eq!(
            erase_request(EraseMethodArg::Crypto, PassArg::Overwrite, None),
            EraseRequest::CryptoErase
        );
    }

    #[test]
    fn cli_parses_erase_flags() {
        let cli = Cli::try_parse_from([
            "emmc-storage-service",
            "erase",
            "pattern",
            "--pass",
            "verify",
        ])
        .expect("parse");
        assert!(matches!(
            cli.command,
            Commands::Erase {
                method: EraseMethodArg::Pattern,
                pass: PassArg::Verify,
                bytes: None
            }
        ));
    }
}
