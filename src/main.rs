//! # restime CLI
//!
//! Reads an analysis input file, runs the residence-time analysis over the
//! trajectories it names and writes the histogram table.
//!
//! Usage:
//!   restime --in-file water.inp
//!   restime -i water.json --json water.report.json --runs water.runs -v

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use restime::{report, run_from_config, AnalysisConfig};

/// Residence times of particles in the axial bins of a cylinder
#[derive(Parser, Debug)]
#[command(name = "restime", version)]
#[command(about = "Residence-time histogram of a selection in cylindrical bins")]
struct Args {
    /// Analysis input file (keyword format, or JSON when it ends in .json)
    #[arg(short, long)]
    in_file: PathBuf,

    /// Histogram table, overrides the `out` keyword
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Also write the full report as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Also write every closed run, one per line
    #[arg(long)]
    runs: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match (args.quiet, args.verbose) {
        (true, _) => LevelFilter::Warn,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let start_time = Instant::now();

    let config = AnalysisConfig::from_file(&args.in_file)
        .with_context(|| format!("Failed to load input file {}", args.in_file.display()))?;
    let report = run_from_config(&config, args.runs.is_some())
        .context("Residence-time analysis failed")?;

    let out_path = args.out.unwrap_or_else(|| config.output.clone());
    let mut out = BufWriter::new(
        File::create(&out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?,
    );
    report::write_table(&report, &mut out)
        .and_then(|_| out.flush())
        .with_context(|| format!("Failed to write {}", out_path.display()))?;
    info!("histogram written to {}", out_path.display());

    if let Some(path) = &args.json {
        let mut file = BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        );
        report::write_json(&report, &mut file)
            .and_then(|_| file.flush())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("JSON report written to {}", path.display());
    }

    if let Some(path) = &args.runs {
        let mut file = BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        );
        report::write_runs(&report.runs, &mut file)
            .and_then(|_| file.flush())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("{} runs written to {}", report.runs.len(), path.display());
    }

    let elapsed = start_time.elapsed();
    let fps = report.frames as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    info!(
        "analysed {} frames in {:.2?} ({:.1} frames/sec)",
        report.frames, elapsed, fps
    );

    Ok(())
}
