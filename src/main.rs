//! proofmarshal CLI - build, prove and verify commitment structures
//!
//! Builds mountain ranges of integers and digest-keyed maps, extracts
//! compact proofs from them, and checks those proofs against a root hash.
//! Output is JSON so the tool can be driven from scripts.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use proofmarshal::{Bits, Codec, DigestMap, Hash, MerbinnerTree, MerkleMountainRange, U64Range};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

type Range = MerkleMountainRange<U64Range>;
type Map = MerbinnerTree<DigestMap>;

#[derive(Parser)]
#[command(name = "proofmarshal")]
#[command(about = "Prunable, hash-committed proof structures")]
#[command(version)]
struct Cli {
    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect a bit string
    Bits {
        /// Bits written as 0s and 1s
        bits: String,
    },

    /// Merkle mountain ranges of integers
    #[command(subcommand)]
    Range(RangeCommand),

    /// Merbinner trees keyed by 32-byte digests
    #[command(subcommand)]
    Map(MapCommand),
}

#[derive(Subcommand)]
enum RangeCommand {
    /// Build a range and print its root
    Build {
        /// Values, in order
        values: Vec<u64>,
    },

    /// Prove the value at one position
    Prove {
        /// Values, in order
        values: Vec<u64>,
        /// Position to prove; negative counts from the end
        #[arg(short, long, allow_negative_numbers = true)]
        index: i64,
        /// Also write the binary proof to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Read one position from a proof
    Verify {
        #[command(flatten)]
        input: ProofInput,
        /// Position to read; negative counts from the end
        #[arg(short, long, allow_negative_numbers = true)]
        index: i64,
    },
}

#[derive(Subcommand)]
enum MapCommand {
    /// Build a map and print its root
    Build {
        /// Entries as <64 hex digit key>=<value>
        #[arg(value_parser = parse_entry)]
        entries: Vec<([u8; 32], u64)>,
    },

    /// Prove the presence or absence of one key
    Prove {
        /// Entries as <64 hex digit key>=<value>
        #[arg(value_parser = parse_entry)]
        entries: Vec<([u8; 32], u64)>,
        /// Key to prove, 64 hex digits
        #[arg(short, long, value_parser = parse_key)]
        key: [u8; 32],
        /// Also write the binary proof to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Look one key up in a proof
    Verify {
        #[command(flatten)]
        input: ProofInput,
        /// Key to look up, 64 hex digits
        #[arg(short, long, value_parser = parse_key)]
        key: [u8; 32],
    },
}

/// Where a proof comes from, and what root it should have
#[derive(Args)]
struct ProofInput {
    /// Hex-encoded proof
    proof: Option<String>,

    /// Read the binary proof from a file instead
    #[arg(long, conflicts_with = "proof")]
    file: Option<PathBuf>,

    /// Expected root hash, 64 hex digits
    #[arg(short, long)]
    root: Option<String>,
}

impl ProofInput {
    fn bytes(&self) -> anyhow::Result<Vec<u8>> {
        match (&self.proof, &self.file) {
            (Some(hex_proof), _) => hex::decode(hex_proof.trim()).context("proof is not valid hex"),
            (None, Some(path)) => {
                std::fs::read(path).with_context(|| format!("reading {}", path.display()))
            }
            (None, None) => bail!("either a hex proof or --file is required"),
        }
    }

    fn expected_root(&self) -> anyhow::Result<Option<Hash>> {
        self.root
            .as_deref()
            .map(|root| Hash::from_hex(root).context("root is not a 64 hex digit hash"))
            .transpose()
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Bits { bits } => {
            let bits: Bits = bits.parse()?;
            output(
                &cli.format,
                &serde_json::json!({
                    "bits": bits.to_string(),
                    "length": bits.len(),
                    "encoding": hex::encode(bits.serialize()),
                    "complement": (!&bits).to_string(),
                }),
            )?;
        }

        Commands::Range(RangeCommand::Build { values }) => {
            let range = Range::from_values(values)?;
            let serialized = range.serialize();
            output(
                &cli.format,
                &serde_json::json!({
                    "length": range.len()?,
                    "root": range.hash().to_hex(),
                    "serialized": hex::encode(&serialized),
                    "bytes": serialized.len(),
                }),
            )?;
        }

        Commands::Range(RangeCommand::Prove { values, index, out }) => {
            let range = Range::from_values(values)?;
            let value = range.get(index)?;
            let proof = range.prove(index)?.serialize();
            debug!(index, bytes = proof.len(), "extracted range proof");
            write_proof(out.as_ref(), &proof)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "index": index,
                    "value": value,
                    "length": range.len()?,
                    "root": range.hash().to_hex(),
                    "proof": hex::encode(&proof),
                    "bytes": proof.len(),
                }),
            )?;
        }

        Commands::Range(RangeCommand::Verify { input, index }) => {
            let range = Range::deserialize(&input.bytes()?)?;
            let length = range.len()?;
            let value = match range.get(index) {
                Ok(value) => Some(value),
                Err(proofmarshal::Error::IndexOutOfRange { .. }) => None,
                Err(e) => return Err(e).context("proof does not cover the requested index"),
            };
            let root = range.hash();
            output(
                &cli.format,
                &serde_json::json!({
                    "index": index,
                    "present": value.is_some(),
                    "value": value,
                    "length": length,
                    "root": root.to_hex(),
                    "matches_root": input.expected_root()?.map(|expected| expected == root),
                }),
            )?;
        }

        Commands::Map(MapCommand::Build { entries }) => {
            let map = Map::from_items(entries)?;
            let serialized = map.serialize();
            output(
                &cli.format,
                &serde_json::json!({
                    "items": map.len()?,
                    "root": map.hash().to_hex(),
                    "serialized": hex::encode(&serialized),
                    "bytes": serialized.len(),
                }),
            )?;
        }

        Commands::Map(MapCommand::Prove { entries, key, out }) => {
            let map = Map::from_items(entries)?;
            let value = lookup(&map, &key)?;
            let proof = map.prove(&key)?.serialize();
            debug!(key = %hex::encode(key), bytes = proof.len(), "extracted map proof");
            write_proof(out.as_ref(), &proof)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "key": hex::encode(key),
                    "present": value.is_some(),
                    "value": value,
                    "root": map.hash().to_hex(),
                    "proof": hex::encode(&proof),
                    "bytes": proof.len(),
                }),
            )?;
        }

        Commands::Map(MapCommand::Verify { input, key }) => {
            let map = Map::deserialize(&input.bytes()?)?;
            let value = lookup(&map, &key).context("proof does not cover the requested key")?;
            let root = map.hash();
            output(
                &cli.format,
                &serde_json::json!({
                    "key": hex::encode(key),
                    "present": value.is_some(),
                    "value": value,
                    "root": root.to_hex(),
                    "matches_root": input.expected_root()?.map(|expected| expected == root),
                }),
            )?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Value under `key`, or `None` if the map provably lacks it
fn lookup(map: &Map, key: &[u8; 32]) -> proofmarshal::Result<Option<u64>> {
    match map.get(key) {
        Ok(value) => Ok(Some(value)),
        Err(proofmarshal::Error::KeyNotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn write_proof(path: Option<&PathBuf>, proof: &[u8]) -> anyhow::Result<()> {
    if let Some(path) = path {
        std::fs::write(path, proof).with_context(|| format!("writing {}", path.display()))?;
        debug!(path = %path.display(), "wrote proof");
    }
    Ok(())
}

fn parse_key(s: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(s).map_err(|e| format!("invalid hex key: {}", e))?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| format!("key must be 32 bytes, got {}", bytes.len()))
}

fn parse_entry(s: &str) -> Result<([u8; 32], u64), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <key>=<value>, got {:?}", s))?;
    let value = value
        .parse()
        .map_err(|e| format!("invalid value {:?}: {}", value, e))?;
    Ok((parse_key(key)?, value))
}

fn output(format: &OutputFormat, value: &serde_json::Value) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(value)?);
        }
        OutputFormat::Text => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}
