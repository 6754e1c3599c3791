use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Terrain-RGB elevation CLI tool
#[derive(Parser)]
#[command(name = "demtiles")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// PMTiles or MBTiles archives, scanned in order (repeatable or comma separated)
    #[arg(
        short,
        long = "archive",
        env = "DEMTILES_ARCHIVES",
        value_delimiter = ',',
        global = true
    )]
    archives: Vec<PathBuf>,

    /// Maximum decoded tiles in cache
    #[arg(long, env = "DEMTILES_CACHE_SIZE", default_value = "5", global = true)]
    cache_size: usize,

    /// Maximum directory levels walked per lookup
    #[arg(
        long,
        env = "DEMTILES_MAX_DIRECTORY_DEPTH",
        default_value = "4",
        global = true
    )]
    max_depth: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query elevation for a single coordinate
    Query {
        /// Latitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add an elevation column to a CSV file of coordinates
    Batch {
        /// Input CSV file
        input: PathBuf,

        /// Output file (defaults to <input>_elevation.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Column name for latitude
        #[arg(long, default_value = "lat")]
        lat_col: String,

        /// Column name for longitude
        #[arg(long, default_value = "lon")]
        lon_col: String,
    },

    /// Display the header of an archive
    Info {
        /// Path to a .pmtiles or .mbtiles file
        archive: PathBuf,

        /// Also resolve the tile covering this latitude
        #[arg(long, requires = "lon", allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Also resolve the tile covering this longitude
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lon: Option<f64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "demtiles=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = commands::ServiceConfig {
        archives: cli.archives,
        cache_size: cli.cache_size,
        max_depth: cli.max_depth,
    };

    match cli.command {
        Commands::Query { lat, lon, json } => commands::query::run(&config, lat, lon, json),
        Commands::Batch {
            input,
            output,
            lat_col,
            lon_col,
        } => commands::batch::run(&config, input, output, lat_col, lon_col),
        Commands::Info { archive, lat, lon } => {
            commands::info::run(archive, cli.max_depth, lat.zip(lon))
        }
    }
}
