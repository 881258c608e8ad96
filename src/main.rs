use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use geostamp::{
    config::{Config, DEFAULT_CONFIG_FILE},
    metadata::{ExifTool, LocationHistory, VisitAnchor},
    pipeline::{BatchSummary, MatchEngine, MatchPolicy},
    scan::collect_images,
};

#[derive(Parser)]
#[command(name = "geostamp", version)]
#[command(about = "Geotag JPEG photos from a Google Timeline location history export")]
struct Args {
    /// Location history JSON file
    #[arg(short, long, value_name = "FILE")]
    json: Utf8PathBuf,

    /// Directory containing the photos
    #[arg(short, long, value_name = "DIR")]
    dir: Utf8PathBuf,

    /// Hours of tolerance for matching a photo to a location [default: 1]
    #[arg(short = 't', long = "time", value_name = "HOURS")]
    tolerance_hours: Option<f64>,

    /// Replace GPS data that is already present
    #[arg(long)]
    overwrite: bool,

    /// Process directories recursively
    #[arg(short = 'R', long)]
    recursive: bool,

    /// Dry run - show what would be written without doing it
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Instant of a visit used as its location timestamp [default: midpoint]
    #[arg(long, value_enum)]
    visit_anchor: Option<VisitAnchor>,

    /// exiftool program to invoke
    #[arg(long, value_name = "PATH")]
    exiftool: Option<String>,

    /// UTC offset assumed for photos without OffsetTimeOriginal, e.g. +02:00
    #[arg(long, value_name = "OFFSET", allow_hyphen_values = true)]
    default_offset: Option<String>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<Utf8PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = load_config(&args)?;
    let policy = MatchPolicy {
        tolerance: config.tolerance()?,
        overwrite: config.overwrite,
    };

    let exiftool = ExifTool::detect(config.exiftool.as_str())
        .context("exiftool is required to read and write photo metadata")?
        .with_default_offset(config.default_offset()?);

    info!("Loading location history from {}", args.json);
    let history = LocationHistory::from_json_file(&args.json, config.visit_anchor)?;
    if history.is_empty() {
        warn!("No usable location points in {}, nothing will match", args.json);
    }

    let files = collect_images(&args.dir, config.recursive)?;
    if files.is_empty() {
        println!("No JPEG files found in {}", args.dir);
        return Ok(());
    }
    info!("Found {} photo(s) to process", files.len());

    if args.dry_run {
        println!("DRY RUN MODE - No files will be modified");
    }

    let engine = MatchEngine::new(&history, policy);
    let summary = engine.run(&exiftool, &files, args.dry_run);

    print_summary(&summary, args.dry_run);
    Ok(())
}

/// Defaults, then the config file, then command line flags.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(Utf8Path::new(DEFAULT_CONFIG_FILE))?,
    };

    if let Some(hours) = args.tolerance_hours {
        config.tolerance_hours = hours;
    }
    config.overwrite |= args.overwrite;
    config.recursive |= args.recursive;
    if let Some(anchor) = args.visit_anchor {
        config.visit_anchor = anchor;
    }
    if let Some(program) = &args.exiftool {
        config.exiftool = program.clone();
    }
    if let Some(offset) = &args.default_offset {
        config.default_offset = Some(offset.clone());
    }

    config.validate()?;
    Ok(config)
}

fn print_summary(summary: &BatchSummary, dry_run: bool) {
    if !summary.skipped.is_empty() {
        println!("\nSkipped photos:");
        for (file, reason) in &summary.skipped {
            println!("   - {file}: {reason}");
        }
    }

    println!("\nSummary:");
    println!("   Photos processed: {}", summary.processed);
    if dry_run {
        println!("   Would be tagged: {}", summary.tagged.len());
    } else {
        println!("   Tagged: {}", summary.tagged.len());
    }
    println!(
        "   Skipped: {} ({} errors)",
        summary.skipped.len(),
        summary.failures()
    );
}
