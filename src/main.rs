//! geocode-enricher: resolves address records to coordinates.
//!
//! Thin CLI over the resolver engine:
//! 1. Loads configuration and connects to the spatial database (if any)
//! 2. Reads addresses from CSV
//! 3. Runs them through the cached provider cascade
//! 4. Writes one JSON object per input row to stdout

mod config;

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use common::{AddressInput, Error, GeocodeResult, GeocoderConfig};
use postgis_client::PostgisClient;
use resolver::batch::assign_ids;
use resolver::{build_geocoder, build_reverse_resolver};

/// Address geocoding enricher
#[derive(Parser)]
#[command(name = "geocode-enricher", about = "Resolve addresses to coordinates")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Geocode a CSV file with columns id,street,city,state,zip.
    Geocode {
        /// Input CSV path (header row required).
        #[arg(long)]
        input: PathBuf,

        /// Submit cache misses through the Census batch endpoint first.
        #[arg(long)]
        bulk: bool,
    },
    /// Look up the nearest address for a coordinate pair.
    Reverse {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },
}

#[derive(Serialize)]
struct OutputRow<'a> {
    id: &'a str,
    #[serde(flatten)]
    result: &'a GeocodeResult,
}

fn read_addresses(path: &Path) -> Result<Vec<AddressInput>, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| Error::Parse(format!("Failed to open {}: {}", path.display(), e)))?;

    let mut addrs = Vec::new();
    for (line, record) in reader.deserialize::<AddressInput>().enumerate() {
        let addr = record
            .map_err(|e| Error::Parse(format!("{} row {}: {}", path.display(), line + 1, e)))?;
        addrs.push(addr);
    }
    Ok(addrs)
}

fn write_results(addrs: &[AddressInput], results: &[GeocodeResult]) -> Result<(), Error> {
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for (addr, result) in addrs.iter().zip(results) {
        serde_json::to_writer(
            &mut out,
            &OutputRow {
                id: &addr.id,
                result,
            },
        )?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

async fn connect_db(cfg: &GeocoderConfig) -> Result<Option<PostgisClient>, Error> {
    if cfg.database_url.is_empty() {
        warn!("DATABASE_URL not set: TIGER and reverse geocoding disabled");
        return Ok(None);
    }
    PostgisClient::connect(&cfg.database_url).await.map(Some)
}

async fn run_geocode(
    cfg: &GeocoderConfig,
    db: Option<PostgisClient>,
    cancel: &CancellationToken,
    input: &Path,
    bulk: bool,
) -> Result<(), Error> {
    let geocoder = build_geocoder(cfg, db)?;

    let mut addrs = read_addresses(input)?;
    assign_ids(&mut addrs);
    info!("Loaded {} addresses from {}", addrs.len(), input.display());

    let started = Instant::now();
    let results = if bulk {
        geocoder.bulk_geocode(cancel, addrs.clone()).await
    } else {
        geocoder.batch_geocode(cancel, addrs.clone()).await
    };

    if cancel.is_cancelled() {
        warn!("Run interrupted; unfinished rows are reported unmatched");
    }
    info!(
        "Resolved {}/{} addresses in {:.1}s",
        results.iter().filter(|r| r.matched).count(),
        results.len(),
        started.elapsed().as_secs_f64()
    );

    write_results(&addrs, &results)
}

async fn run_reverse(
    db: Option<PostgisClient>,
    cancel: &CancellationToken,
    lat: f64,
    lng: f64,
) -> Result<(), Error> {
    let resolver = build_reverse_resolver(db)?;
    let result = resolver.reverse_geocode(cancel, lat, lng).await?;
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "geocode_enricher=info,resolver=info,census_client=info,google_geocode_client=info,postgis_client=info".into()
            }),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Load configuration.
    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    info!("Provider order: {:?}", cfg.providers.order);
    info!(
        "Cache: enabled={}, ttl_days={}, table={}",
        cfg.cache.enabled, cfg.cache.ttl_days, cfg.cache.table
    );

    let db = match connect_db(&cfg).await {
        Ok(db) => db,
        Err(e) => {
            error!("Database error: {}", e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    let outcome = match cli.command {
        Command::Geocode { input, bulk } => run_geocode(&cfg, db, &cancel, &input, bulk).await,
        Command::Reverse { lat, lng } => run_reverse(db, &cancel, lat, lng).await,
    };

    if let Err(e) = outcome {
        error!("{}", e);
        std::process::exit(1);
    }
}
