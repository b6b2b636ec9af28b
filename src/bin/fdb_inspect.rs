//! Offline inspection tool for FormDB stores

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use formbd::introspect::{RenderFormat, RenderOpts};
use formbd::{BlockType, Database};

#[derive(Parser)]
#[command(name = "fdb-inspect", about = "Inspect FormDB block stores", version)]
struct Cli {
    /// Path to the store file
    #[arg(long, short = 'f')]
    file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every live block of a given type
    Blocks {
        /// Block type name (document, edge, schema, journal)
        #[arg(default_value = "document")]
        block_type: String,
    },
    /// Render one block as canonical JSON
    Render {
        block_id: u64,
        /// Wrap the payload with block metadata
        #[arg(long)]
        metadata: bool,
    },
    /// Render the journal chain, oldest first
    Journal {
        /// Only entries with sequence greater than this
        #[arg(long, default_value_t = 0)]
        since: u64,
        #[arg(long)]
        metadata: bool,
    },
    /// Walk the journal chain and checksum every block
    Verify,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open(&cli.file)?;

    match cli.command {
        Command::Blocks { block_type } => {
            let block_type = BlockType::from_name(&block_type)
                .ok_or_else(|| format!("unknown block type: {block_type}"))?;
            println!("{}", db.read_blocks_json(block_type)?);
        }
        Command::Render { block_id, metadata } => {
            let opts = RenderOpts {
                format: RenderFormat::Json,
                include_metadata: metadata,
            };
            println!("{}", db.render_block(block_id, &opts)?);
        }
        Command::Journal { since, metadata } => {
            let opts = RenderOpts {
                format: RenderFormat::Json,
                include_metadata: metadata,
            };
            let rendered = db.render_journal(since, &opts)?;
            if !rendered.is_empty() {
                println!("{rendered}");
            }
        }
        Command::Verify => {
            let entries = db.verify_journal()?;
            let corrupt = db.verify_checksums()?;
            println!("journal chain: {entries} entries intact");
            if corrupt.is_empty() {
                println!("checksums: all {} blocks clean", db.block_count());
            } else {
                println!("checksums: {} corrupt blocks: {corrupt:?}", corrupt.len());
                return Err("corruption detected".into());
            }
        }
    }

    db.close()?;
    Ok(())
}
