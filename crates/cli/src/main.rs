//! CumView CLI - cumulative viewsheds along a line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use cumview_algorithms::imagery::{band_difference, ndvi};
use cumview_algorithms::statistics::pearson_correlation;
use cumview_algorithms::terrain::{viewshed, ViewshedParams};
use cumview_batch::config::HeightFilterConfig;
use cumview_batch::viewpoint::{parse_line, read_viewpoints_file, viewpoints_along_line, write_viewpoints_file};
use cumview_batch::{
    filter_by_height, Aggregator, BatchReport, Coordinator, EngineKind, FilterOutcome, GrassConfig, GrassEngine,
    JobConfig, NativeEngine, PointSource, RunSummary, Viewpoint, ViewshedWorker, VisibilityEngine, WorkerConfig,
};
use cumview_core::io::{read_geotiff, write_geotiff};
use cumview_core::{DirStore, Raster, RasterName};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "cumview")]
#[command(author, version, about = "Cumulative viewsheds along a line", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Generate viewpoints at a fixed spacing along a line
    Points {
        /// Line vertices as "x,y;x,y;..."
        #[arg(short, long)]
        line: String,
        /// Distance between consecutive viewpoints (map units)
        #[arg(short, long)]
        spacing: f64,
        /// Output CSV file (id,x,y)
        output: PathBuf,
    },
    /// Height above ground: DSM minus DTM
    Height {
        /// Digital surface model
        #[arg(long)]
        dsm: PathBuf,
        /// Digital terrain model
        #[arg(long)]
        dtm: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Drop viewpoints standing higher than a threshold above ground
    Filter {
        /// Input viewpoints CSV
        #[arg(short, long)]
        points: PathBuf,
        /// Height-above-ground raster
        #[arg(long)]
        height: PathBuf,
        /// Maximum height above ground to keep a viewpoint
        #[arg(short, long)]
        max_height: f64,
        /// Output CSV file
        output: PathBuf,
    },
    /// Viewshed from a single observer
    Viewshed {
        /// Input DEM file
        #[arg(short, long)]
        dem: PathBuf,
        /// Observer X (map units)
        #[arg(short)]
        x: f64,
        /// Observer Y (map units)
        #[arg(short)]
        y: f64,
        /// Maximum visibility distance (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        max_distance: f64,
        /// Observer height above ground
        #[arg(long, default_value = "1.75")]
        observer_elevation: f64,
        /// Target height above ground
        #[arg(long, default_value = "0")]
        target_elevation: f64,
        /// Output file
        output: PathBuf,
    },
    /// Cumulative viewshed over many viewpoints
    Cumulative(Box<CumulativeArgs>),
    /// Normalized Difference Vegetation Index
    Ndvi {
        /// Near-infrared band
        #[arg(long)]
        nir: PathBuf,
        /// Red band
        #[arg(long)]
        red: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Pearson correlation between two rasters
    Correlate {
        /// First raster
        #[arg(short, long)]
        a: PathBuf,
        /// Second raster
        #[arg(short, long)]
        b: PathBuf,
    },
}

// ─── Cumulative arguments ───────────────────────────────────────────────

/// Flags override the values of the job file
#[derive(clap::Args)]
struct CumulativeArgs {
    /// YAML job file
    #[arg(short, long)]
    job: Option<PathBuf>,
    /// Viewpoints CSV (id,x,y)
    #[arg(short, long, conflicts_with = "line")]
    points: Option<PathBuf>,
    /// Line vertices as "x,y;x,y;..."
    #[arg(short, long, requires = "spacing")]
    line: Option<String>,
    /// Viewpoint spacing along --line
    #[arg(short, long)]
    spacing: Option<f64>,
    /// Height-above-ground raster for the viewpoint filter
    #[arg(long, requires = "max_height")]
    height: Option<PathBuf>,
    /// Maximum height above ground to keep a viewpoint
    #[arg(long)]
    max_height: Option<f64>,
    /// Engine: native, grass
    #[arg(short, long)]
    engine: Option<String>,
    /// Raster directory for the native engine
    #[arg(long)]
    store: Option<PathBuf>,
    /// Elevation raster name
    #[arg(long)]
    elevation: Option<String>,
    /// Maximum visibility distance (map units)
    #[arg(short, long)]
    max_distance: Option<f64>,
    /// Observer height above ground
    #[arg(long)]
    observer_elevation: Option<f64>,
    /// Concurrent viewshed invocations
    #[arg(short, long)]
    workers: Option<usize>,
    /// Compute each viewshed on a region around its viewpoint
    #[arg(long)]
    restrict_region: bool,
    /// Timeout per GRASS module call, in seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Directory holding the GRASS module executables
    #[arg(long)]
    grass_bin: Option<PathBuf>,
    /// Cumulative raster name
    #[arg(short, long)]
    output: Option<String>,
    /// Remove per-point rasters after aggregation
    #[arg(long)]
    cleanup: bool,
    /// Write the run summary as JSON to this file
    #[arg(long)]
    summary: Option<PathBuf>,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install logger")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} viewpoints ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

fn read_raster(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> =
        read_geotiff(path).with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn write_result(raster: &Raster<f64>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn raster_name(s: &str) -> Result<RasterName> {
    RasterName::new(s).with_context(|| format!("Invalid raster name: {}", s))
}

fn parse_engine(s: &str) -> Result<EngineKind> {
    match s.to_lowercase().as_str() {
        "native" => Ok(EngineKind::Native),
        "grass" => Ok(EngineKind::Grass),
        _ => anyhow::bail!("Unknown engine: {}. Use native or grass.", s),
    }
}

// ─── Cumulative run ─────────────────────────────────────────────────────

/// Job file (or defaults) with command-line overrides applied
fn build_job(args: &CumulativeArgs) -> Result<JobConfig> {
    let mut job = match &args.job {
        Some(path) => JobConfig::load(path).with_context(|| format!("Failed to load job file {}", path.display()))?,
        None => {
            let points = match (&args.points, &args.line, args.spacing) {
                (Some(path), _, _) => PointSource::Csv { path: path.clone() },
                (None, Some(line), Some(spacing)) => PointSource::Line {
                    coordinates: line.clone(),
                    spacing,
                },
                _ => anyhow::bail!("Give --points, or --line with --spacing, or a --job file"),
            };
            let elevation = args
                .elevation
                .as_deref()
                .context("--elevation is required without a job file")?;
            let max_distance = args
                .max_distance
                .context("--max-distance is required without a job file")?;
            let output = args.output.as_deref().context("--output is required without a job file")?;
            JobConfig {
                engine: EngineKind::default(),
                store: PathBuf::from("."),
                points,
                height_filter: None,
                viewshed: WorkerConfig::new(raster_name(elevation)?, max_distance),
                workers: 1,
                output: raster_name(output)?,
                cleanup: false,
                grass: GrassConfig::default(),
            }
        }
    };

    if let Some(path) = &args.points {
        job.points = PointSource::Csv { path: path.clone() };
    } else if let (Some(line), Some(spacing)) = (&args.line, args.spacing) {
        job.points = PointSource::Line {
            coordinates: line.clone(),
            spacing,
        };
    }
    if let (Some(raster), Some(max_height)) = (&args.height, args.max_height) {
        job.height_filter = Some(HeightFilterConfig {
            raster: raster.clone(),
            max_height,
        });
    }
    if let Some(engine) = &args.engine {
        job.engine = parse_engine(engine)?;
    }
    if let Some(store) = &args.store {
        job.store = store.clone();
    }
    if let Some(elevation) = &args.elevation {
        job.viewshed.elevation = raster_name(elevation)?;
    }
    if let Some(d) = args.max_distance {
        job.viewshed.max_distance = d;
    }
    if let Some(h) = args.observer_elevation {
        job.viewshed.observer_elevation = h;
    }
    if args.restrict_region {
        job.viewshed.restrict_region = true;
    }
    if let Some(w) = args.workers {
        job.workers = w;
    }
    if let Some(t) = args.timeout {
        job.grass.timeout_secs = t;
    }
    if let Some(bin) = &args.grass_bin {
        job.grass.bin_dir = Some(bin.clone());
    }
    if let Some(output) = &args.output {
        job.output = raster_name(output)?;
    }
    if args.cleanup {
        job.cleanup = true;
    }

    job.validate().context("Invalid cumulative job")?;
    Ok(job)
}

fn load_viewpoints(source: &PointSource) -> Result<Vec<Viewpoint>> {
    let points = match source {
        PointSource::Csv { path } => {
            read_viewpoints_file(path).with_context(|| format!("Failed to read viewpoints {}", path.display()))?
        }
        PointSource::Line { coordinates, spacing } => {
            let line = parse_line(coordinates).context("Invalid line")?;
            viewpoints_along_line(&line, *spacing).context("Failed to place viewpoints")?
        }
    };
    info!("{} viewpoints", points.len());
    Ok(points)
}

/// Batch, aggregation and optional cleanup on one engine
fn run_batch<E: VisibilityEngine>(engine: &E, job: &JobConfig, points: &[Viewpoint]) -> Result<(BatchReport, usize)> {
    let worker = ViewshedWorker::new(engine, &job.viewshed).context("Failed to prepare viewshed worker")?;
    let coordinator = Coordinator::new(job.workers)?;

    let pb = progress_bar(points.len());
    let report = coordinator.run_with_progress(&worker, points, |outcome| {
        if !outcome.result.is_success() {
            pb.set_message(format!("last failure: {}", outcome.viewpoint.id));
        }
        pb.inc(1);
    });
    pb.finish_and_clear();
    let report = report.context("Batch aborted")?;

    let template = engine
        .grid(&job.viewshed.elevation)
        .context("Failed to read elevation grid")?;
    let aggregator = Aggregator::new(engine);
    aggregator
        .aggregate_report(&report, &template, &job.output)
        .context("Failed to build cumulative raster")?;

    let removed = if job.cleanup {
        aggregator.cleanup(&report).context("Failed to remove per-point rasters")?
    } else {
        0
    };
    Ok((report, removed))
}

fn run_cumulative(args: &CumulativeArgs) -> Result<()> {
    let job = build_job(args)?;
    let start = Instant::now();

    let points = load_viewpoints(&job.points)?;
    let total = points.len();

    let filter: Option<FilterOutcome> = match &job.height_filter {
        Some(f) => {
            let height = read_raster(&f.raster)?;
            let outcome = filter_by_height(&points, &height, f.max_height);
            info!(
                "Height filter kept {} of {} viewpoints ({} too high, {} unknown)",
                outcome.kept.len(),
                total,
                outcome.too_high.len(),
                outcome.unknown.len()
            );
            Some(outcome)
        }
        None => None,
    };
    let kept = filter.as_ref().map_or(points.as_slice(), |f| f.kept.as_slice());

    let (engine_name, (report, removed)) = match job.engine {
        EngineKind::Native => {
            let store = DirStore::open(&job.store)
                .with_context(|| format!("Failed to open raster store {}", job.store.display()))?;
            let engine = NativeEngine::new(store);
            (engine.name(), run_batch(&engine, &job, kept)?)
        }
        EngineKind::Grass => {
            let engine = GrassEngine::new(job.grass.clone());
            (engine.name(), run_batch(&engine, &job, kept)?)
        }
    };

    for (id, failure) in &report.failed {
        warn!("Viewpoint {} dropped ({:?}): {}", id, failure.kind, failure.reason);
    }

    let summary = RunSummary::new(engine_name, job.workers, total, filter.as_ref(), &report, job.output.clone())
        .with_cleaned_up(removed)
        .with_elapsed(start.elapsed());
    let json = summary.to_json().context("Failed to serialize run summary")?;
    println!("{}", json);

    if let Some(path) = &args.summary {
        std::fs::write(path, &json).with_context(|| format!("Failed to write summary {}", path.display()))?;
        info!("Summary saved to: {}", path.display());
    }
    println!(
        "Cumulative viewshed {}: {} of {} viewpoints succeeded",
        job.output,
        report.succeeded.len(),
        kept.len()
    );
    println!("  Processing time: {:.2?}", start.elapsed());
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster = read_raster(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
            );
        }

        // ── Viewpoints ───────────────────────────────────────────────
        Commands::Points { line, spacing, output } => {
            let start = Instant::now();
            let line = parse_line(&line).context("Invalid line")?;
            let points = viewpoints_along_line(&line, spacing).context("Failed to place viewpoints")?;
            write_viewpoints_file(&output, &points).context("Failed to write viewpoints")?;
            info!("{} viewpoints", points.len());
            done("Viewpoints", &output, start.elapsed());
        }

        Commands::Height { dsm, dtm, output } => {
            let dsm = read_raster(&dsm)?;
            let dtm = read_raster(&dtm)?;
            let start = Instant::now();
            let result = band_difference(&dsm, &dtm).context("Failed to compute height above ground")?;
            let elapsed = start.elapsed();
            write_result(&result, &output)?;
            done("Height", &output, elapsed);
        }

        Commands::Filter {
            points,
            height,
            max_height,
            output,
        } => {
            let viewpoints = read_viewpoints_file(&points).context("Failed to read viewpoints")?;
            let height = read_raster(&height)?;
            let start = Instant::now();
            let outcome = filter_by_height(&viewpoints, &height, max_height);
            write_viewpoints_file(&output, &outcome.kept).context("Failed to write viewpoints")?;
            println!(
                "Kept {} of {} viewpoints ({} too high, {} unknown height)",
                outcome.kept.len(),
                viewpoints.len(),
                outcome.too_high.len(),
                outcome.unknown.len()
            );
            done("Filtered viewpoints", &output, start.elapsed());
        }

        // ── Visibility ───────────────────────────────────────────────
        Commands::Viewshed {
            dem,
            x,
            y,
            max_distance,
            observer_elevation,
            target_elevation,
            output,
        } => {
            let dem = read_raster(&dem)?;
            let (observer_row, observer_col) = dem
                .grid()
                .cell_of(x, y)
                .with_context(|| format!("Observer ({}, {}) is outside the DEM", x, y))?;
            let start = Instant::now();
            let result = viewshed(
                &dem,
                ViewshedParams {
                    observer_row,
                    observer_col,
                    observer_height: observer_elevation,
                    target_height: target_elevation,
                    max_distance,
                    max_radius: None,
                },
            )
            .context("Failed to calculate viewshed")?;
            let elapsed = start.elapsed();
            write_result(&result.convert::<f64>(), &output)?;
            done("Viewshed", &output, elapsed);
        }

        Commands::Cumulative(args) => run_cumulative(&args)?,

        // ── Analysis ─────────────────────────────────────────────────
        Commands::Ndvi { nir, red, output } => {
            let nir = read_raster(&nir)?;
            let red = read_raster(&red)?;
            let start = Instant::now();
            let result = ndvi(&nir, &red).context("Failed to calculate NDVI")?;
            let elapsed = start.elapsed();
            write_result(&result, &output)?;
            done("NDVI", &output, elapsed);
        }

        Commands::Correlate { a, b } => {
            let a = read_raster(&a)?;
            let b = read_raster(&b)?;
            let c = pearson_correlation(&a, &b).context("Failed to correlate rasters")?;
            println!("Pearson r: {:.6}", c.r);
            println!("  Pairs: {}", c.n);
            println!("  Mean A: {:.4}", c.mean_a);
            println!("  Mean B: {:.4}", c.mean_b);
        }
    }

    Ok(())
}
