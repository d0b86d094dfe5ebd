//! chainstamp CLI

use anyhow::{bail, Context, Result};
use chainstamp_client::{api, ClientConfig};
use chainstamp_core::{parse, BlockInfo, Chain, LedgerAccess, LedgerError};
use chainstamp_types::DigestKind;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Extension appended to the stamped file's name for the proof file.
const PROOF_EXTENSION: &str = "stamp";

#[derive(Parser)]
#[command(name = "chainstamp")]
#[command(about = "Decentralized timestamping client", long_about = None)]
struct Cli {
    /// Calendar server URL (repeatable)
    #[arg(short, long = "calendar", global = true)]
    calendars: Vec<String>,

    /// Per-calendar request timeout in seconds
    #[arg(long, default_value_t = 5, global = true)]
    timeout: u64,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Timestamp one or more files via the configured calendars
    Stamp {
        /// Files to timestamp; a batch shares a single calendar submission
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Hash used for the file digests
        #[arg(long, default_value = "sha256")]
        digest: String,
    },

    /// Poll calendars and upgrade a pending proof in place
    Upgrade {
        /// Proof file
        proof: PathBuf,
    },

    /// Print the structure of a proof
    Info {
        /// Proof file
        proof: PathBuf,
    },

    /// Check a proof's attestations, optionally against the original file
    Verify {
        /// Proof file
        proof: PathBuf,

        /// The file the proof should attest to
        #[arg(short, long)]
        target: Option<PathBuf>,

        /// Hex digest the proof should attest to, instead of a file
        #[arg(long, conflicts_with = "target", value_name = "HEX")]
        digest: Option<String>,
    },
}

/// Stand-in ledger for a CLI run without node access: chain attestations
/// come back inconclusive rather than silently passing.
struct NoLedger;

impl LedgerAccess for NoLedger {
    fn merkle_root_at(
        &self,
        _chain: Chain,
        _height: u64,
    ) -> std::result::Result<BlockInfo, LedgerError> {
        Err(LedgerError::Backend(
            "ledger access not configured".to_string(),
        ))
    }
}

fn digest_kind(name: &str) -> Result<DigestKind> {
    match name {
        "sha1" => Ok(DigestKind::Sha1),
        "sha256" => Ok(DigestKind::Sha256),
        "ripemd160" => Ok(DigestKind::Ripemd160),
        "keccak256" => Ok(DigestKind::Keccak256),
        other => bail!("unknown digest kind: {other}"),
    }
}

fn proof_path_for(file: &Path) -> PathBuf {
    PathBuf::from(format!("{}.{}", file.display(), PROOF_EXTENSION))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            Level::DEBUG
        } else {
            Level::WARN
        })
        .init();

    let config = ClientConfig {
        timeout: Duration::from_secs(cli.timeout),
        ..ClientConfig::default()
    };

    match cli.command {
        Commands::Stamp { files, digest } => {
            if cli.calendars.is_empty() {
                bail!("at least one --calendar is required");
            }
            let kind = digest_kind(&digest)?;
            let mut digests = Vec::with_capacity(files.len());
            for file in &files {
                let data = std::fs::read(file)
                    .with_context(|| format!("reading {}", file.display()))?;
                digests.push(kind.hash(&data));
            }

            let (proofs, warnings) =
                api::stamp_batch(kind, &digests, &cli.calendars, &config).await?;
            for warning in &warnings {
                eprintln!("warning: {warning}");
            }

            for ((file, file_digest), proof_bytes) in files.iter().zip(&digests).zip(proofs) {
                let out = proof_path_for(file);
                std::fs::write(&out, proof_bytes)
                    .with_context(|| format!("writing {}", out.display()))?;
                println!("Submitted {} digest {}", kind, hex::encode(file_digest));
                println!("Proof written to {}", out.display());
            }
        }

        Commands::Upgrade { proof } => {
            let bytes = std::fs::read(&proof)
                .with_context(|| format!("reading {}", proof.display()))?;
            let (upgraded, report) = api::upgrade(&bytes, &config).await?;
            for warning in &report.warnings {
                eprintln!("warning: {warning}");
            }
            if report.changed {
                std::fs::write(&proof, upgraded)
                    .with_context(|| format!("writing {}", proof.display()))?;
                println!("Proof upgraded: {}", proof.display());
            } else {
                println!("No upgrade available yet");
            }
        }

        Commands::Info { proof } => {
            let bytes = std::fs::read(&proof)
                .with_context(|| format!("reading {}", proof.display()))?;
            print!("{}", api::info(&bytes)?);
        }

        Commands::Verify {
            proof,
            target,
            digest,
        } => {
            let bytes = std::fs::read(&proof)
                .with_context(|| format!("reading {}", proof.display()))?;
            let parsed = parse(&bytes)?;

            if let Some(target) = target {
                let data = std::fs::read(&target)
                    .with_context(|| format!("reading {}", target.display()))?;
                let file_digest = parsed.digest_kind.hash(&data);
                if file_digest != parsed.file_digest() {
                    bail!(
                        "digest mismatch: {} hashes to {}, proof is for {}",
                        target.display(),
                        hex::encode(&file_digest),
                        hex::encode(parsed.file_digest())
                    );
                }
                println!("File matches proof digest");
            } else if let Some(digest) = digest {
                let claimed = hex::decode(digest.trim())
                    .context("--digest expects a hex-encoded digest")?;
                if claimed != parsed.file_digest() {
                    bail!(
                        "digest mismatch: expected {}, proof is for {}",
                        hex::encode(&claimed),
                        hex::encode(parsed.file_digest())
                    );
                }
                println!("Digest matches proof");
            }

            let results = chainstamp_core::verify(&parsed, &NoLedger);
            if results.is_empty() {
                bail!("proof carries no attestations");
            }
            let mut failed = false;
            for result in &results {
                failed |= result.is_failure();
                println!("{result}");
            }
            if failed {
                bail!("verification failed");
            }
        }
    }

    Ok(())
}
