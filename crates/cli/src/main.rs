use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::commands::{self, Overrides};
use metafuse_core::config::{self, ConflictPolicy, ExifMode};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // stdout carries the report; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load(cli.config.as_deref())?;
    tracing::debug!(?cfg, "configuration loaded");
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Fuse {
            dir,
            dry_run,
            json,
            exclusive_assets,
            exif_mode,
            conflict,
            decoder,
        } => {
            Overrides {
                exclusive_assets,
                exif_mode,
                conflict,
                decoder,
            }
            .apply(&mut cfg);
            commands::run_fuse(&cfg, &dir, dry_run, json, &mut out)
        }
        Commands::Convert { dir, json, decoder } => {
            Overrides {
                decoder,
                ..Overrides::default()
            }
            .apply(&mut cfg);
            commands::run_convert(&cfg, &dir, json, &mut out)
        }
        Commands::Dates { dir, json } => commands::run_dates(&cfg, &dir, json, &mut out),
    }
}

#[derive(Parser)]
#[command(name = "metafuse")]
#[command(about = "Fuse exported JSON sidecars into their photos and videos", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match sidecars to media, convert HEIC, write metadata, archive sidecars
    Fuse {
        /// Directory holding the sidecars and media
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Only print the planned matches
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Output JSON
        #[arg(long)]
        json: bool,
        /// Never hand the same asset to a second sidecar
        #[arg(long, default_value_t = false)]
        exclusive_assets: bool,
        /// JPEG EXIF handling: preserve|embed
        #[arg(long)]
        exif_mode: Option<ExifMode>,
        /// Archive name collisions: overwrite|rename
        #[arg(long)]
        conflict: Option<ConflictPolicy>,
        /// HEIC decoder: auto|libheif|command
        #[arg(long)]
        decoder: Option<String>,
    },
    /// Convert every HEIC file to JPEG without touching metadata
    Convert {
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Output JSON
        #[arg(long)]
        json: bool,
        /// HEIC decoder: auto|libheif|command
        #[arg(long)]
        decoder: Option<String>,
    },
    /// Set file timestamps from EXIF or movie-header capture dates
    Dates {
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}
