//! gridtrace-bench: CLI tool for tracing contours and collecting diagnostics.
//!
//! Traces a given image file with configurable parameters, printing
//! per-stage and per-step diagnostics. Useful for:
//!
//! - Comparing the grid tracer against sequential border following
//! - Measuring how worker count and seeding density affect step timings
//! - Checking contour and point counts for a threshold setting
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin gridtrace-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use gridtrace_core::diagnostics::{Clock, TraceDiagnostics};
use gridtrace_core::{PatternKind, ReduceDirection, SeederKind, TraceConfig, TracerKind};

/// Contour tracing diagnostics for gridtrace.
///
/// Traces every closed border in an image with configurable parameters
/// and prints per-stage timing and count diagnostics.
#[derive(Parser)]
#[command(name = "gridtrace-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Luma values strictly above this are foreground.
    #[arg(long, default_value_t = TraceConfig::DEFAULT_THRESHOLD)]
    threshold: u8,

    /// Swap foreground and background after thresholding.
    #[arg(long)]
    invert: bool,

    /// Seeding core size.
    #[arg(long, value_enum, default_value_t = Pattern::W1h1)]
    pattern: Pattern,

    /// Buffer slots reserved per pixel (4 for w1h1, 3 for w2h1, 2 otherwise).
    #[arg(long, default_value_t = TraceConfig::DEFAULT_DENSITY)]
    density: u32,

    /// Axis of the first reduction pass.
    #[arg(long, value_enum, default_value_t = Start::Vertical)]
    start: Start,

    /// Per-pixel fragment seeder.
    #[arg(long, value_enum, default_value_t = Seeder::Lookup)]
    seeder: Seeder,

    /// Contour tracing algorithm.
    #[arg(long, value_enum, default_value_t = Tracer::Grid)]
    tracer: Tracer,

    /// Worker threads (0 = one per core).
    #[arg(long, default_value_t = TraceConfig::DEFAULT_THREADS)]
    threads: usize,

    /// Write SVG output to file.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full trace config as a JSON string.
    ///
    /// When provided, all other trace parameter flags are ignored.
    /// Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// First reduction axis selection.
#[derive(Clone, Copy, ValueEnum)]
enum Start {
    /// Merge left/right neighbours first.
    Horizontal,
    /// Merge top/bottom neighbours first.
    Vertical,
}

/// Seeding core selection.
#[derive(Clone, Copy, ValueEnum)]
enum Pattern {
    /// One pixel per cell.
    #[value(name = "w1h1")]
    W1h1,
    /// Two pixels side by side.
    #[value(name = "w2h1")]
    W2h1,
    /// A 2x2 block.
    #[value(name = "w2h2")]
    W2h2,
    /// A 4x2 block.
    #[value(name = "w4h2")]
    W4h2,
}

/// Seeder selection.
#[derive(Clone, Copy, ValueEnum)]
enum Seeder {
    /// Precomputed 256-entry neighbourhood table.
    Lookup,
    /// Evaluate the neighbourhood ring per pixel.
    Kernel,
}

/// Tracer selection.
#[derive(Clone, Copy, ValueEnum)]
enum Tracer {
    /// Parallel grid merge.
    Grid,
    /// Sequential Suzuki-Abe border following.
    BorderFollowing,
}

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info";

/// Build a [`TraceConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<TraceConfig, String> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        TraceConfig {
            threshold: cli.threshold,
            invert: cli.invert,
            pattern: match cli.pattern {
                Pattern::W1h1 => PatternKind::W1H1,
                Pattern::W2h1 => PatternKind::W2H1,
                Pattern::W2h2 => PatternKind::W2H2,
                Pattern::W4h2 => PatternKind::W4H2,
            },
            density: cli.density,
            start_direction: match cli.start {
                Start::Horizontal => ReduceDirection::Horizontal,
                Start::Vertical => ReduceDirection::Vertical,
            },
            seeder: match cli.seeder {
                Seeder::Lookup => SeederKind::Lookup,
                Seeder::Kernel => SeederKind::Kernel,
            },
            tracer: match cli.tracer {
                Tracer::Grid => TracerKind::Grid,
                Tracer::BorderFollowing => TracerKind::BorderFollowing,
            },
            threads: cli.threads,
        }
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_LOG_FILTER)).init();
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes)",
        cli.image_path.display(),
        image_bytes.len(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }
        log::debug!("starting run {}", run + 1);

        match gridtrace_core::diagnostics::process_with_diagnostics(&image_bytes, &config, &StdClock)
        {
            Ok((result, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Write SVG on the first run only.
                if run == 0
                    && let Some(ref svg_path) = cli.svg
                {
                    let title = cli
                        .image_path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or("gridtrace");
                    let desc = format!(
                        "threshold={} invert={} tracer={:?}",
                        config.threshold, config.invert, config.tracer
                    );
                    let metadata = gridtrace_export::SvgMetadata {
                        title: Some(title),
                        description: Some(&desc),
                    };
                    let svg = gridtrace_export::to_svg(&result.contours, result.dimensions, &metadata);
                    match std::fs::write(svg_path, &svg) {
                        Ok(()) => {
                            eprintln!(
                                "SVG written to {} ({} bytes)",
                                svg_path.display(),
                                svg.len(),
                            );
                        }
                        Err(e) => {
                            eprintln!("Error writing SVG to {}: {e}", svg_path.display());
                            return ExitCode::FAILURE;
                        }
                    }
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Trace error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&TraceDiagnostics) -> Option<Duration>;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[TraceDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Decode", |d| d.decode.as_ref().map(|s| s.duration)),
        ("Binarize", |d| Some(d.binarize.duration)),
        ("Seeding", |d| d.seeding.as_ref().map(|s| s.duration)),
        ("Reduction", |d| {
            (!d.steps.is_empty()).then(|| d.steps.iter().map(|s| s.duration).sum())
        }),
        ("Tracing", |d| Some(d.tracing.duration)),
    ];

    for (name, extractor) in stage_extractors {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(extractor)
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}
