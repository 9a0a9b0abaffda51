use std::fs::File;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use alpaca::collect::{parse_time, FileFilterer, Merger};
use alpaca::{CaptureFile, EventTable, StationIdentity};

#[derive(Parser)]
#[command(name = "packets")]
#[command(author, version, about = "A packet (pcap) command-line utility")]
#[command(propagate_version = true)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get packet files and merge them
    Get {
        /// Directory holding the capture files
        source: PathBuf,

        /// File to write the merged capture to
        target: PathBuf,

        /// File-glob to match files in the source directory
        #[arg(short, long, default_value = "*")]
        glob: String,

        /// Earliest packet time to get
        #[arg(long)]
        start: Option<String>,

        /// Latest packet time to get
        #[arg(long)]
        end: Option<String>,
    },

    /// Find the join event timestamps in captures
    Events {
        /// MAC address of the client
        #[arg(long)]
        client: String,

        /// MAC address of the access point
        #[arg(long)]
        ap: String,

        /// Network name the client probes for
        #[arg(long)]
        ssid: String,

        /// Take the first frame of each event instead of the last retry
        #[arg(long)]
        first: bool,

        /// CSV file to write (stdout if not given)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Capture files
        #[arg(required = true)]
        captures: Vec<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run_command(cli.command) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Get {
            source,
            target,
            glob,
            start,
            end,
        } => {
            let start = start.as_deref().map(parse_time).transpose()?;
            let end = end.as_deref().map(parse_time).transpose()?;
            let files = FileFilterer::new(&source, &glob, start, end)?
                .file_names()
                .with_context(|| format!("Failed to pick captures from {}", source.display()))?;
            Merger::new(files, &target)?
                .run()
                .with_context(|| format!("Failed to merge into {}", target.display()))?;
            println!("Merged captures into {}", target.display());
        }

        Commands::Events {
            client,
            ap,
            ssid,
            first,
            output,
            captures,
        } => {
            let identity = StationIdentity::parse(&client, &ap, &ssid)?;
            let sources = captures
                .iter()
                .map(CaptureFile::open)
                .collect::<alpaca::Result<Vec<_>>>()?;
            let table = EventTable::extract(&sources, &identity, !first);
            info!("{} of {} captures completed the handshake", table.completed(), table.len());

            match output {
                Some(path) => {
                    let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
                    table.write_csv(file)?;
                    info!("wrote {}", path.display());
                }
                None => table.write_csv(io::stdout().lock())?,
            }
        }
    }
    Ok(())
}
