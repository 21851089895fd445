//! # Report writers
//!
//! Plain-text table, JSON document and run log for an [`AnalysisReport`].

use std::io::{self, Write};

use crate::analysis::AnalysisReport;
use crate::tracker::ResidencyRun;

/// Writes the histogram as a whitespace-separated table
///
/// Header lines start with `#`. One row per bin with its z range, raw
/// occupancy (particle-frames) and one column per duration bucket, followed
/// by a totals row. A `discarded` column follows the buckets whenever the
/// sub-minimum policy is `discard`, even if no run was dropped.
pub fn write_table<W: Write>(report: &AnalysisReport, out: &mut W) -> io::Result<()> {
    let g = &report.geometry;
    let h = &report.histogram;

    writeln!(out, "# residence-time histogram")?;
    writeln!(
        out,
        "# selection: {} ({} particles)",
        report.selection, report.n_particles
    )?;
    writeln!(out, "# frames: {}", report.frames)?;
    if report.time_gaps > 0 {
        writeln!(out, "# time gaps split: {}", report.time_gaps)?;
    }
    writeln!(
        out,
        "# cylinder: z {} .. {}, radius {}, axis ({}, {}), {} bins of {:.4}, boundary {:?}",
        g.z_min, g.z_max, g.radius, g.axis[0], g.axis[1], g.n_bins, g.bin_size, g.boundary
    )?;
    writeln!(out, "# run lengths in frames")?;

    write!(out, "#{:>5} {:>12} {:>12} {:>12}", "bin", "z_low", "z_high", "occupancy")?;
    for bucket in &h.buckets {
        write!(out, " {:>12}", bucket.label)?;
    }
    let discard_column = h.discards_sub_minimum();
    if discard_column {
        write!(out, " {:>12}", "discarded")?;
    }
    writeln!(out)?;

    for (bin, row) in h.counts.iter().enumerate() {
        let occupancy = report.occupancy.get(bin).copied().unwrap_or(0);
        write!(
            out,
            "{:>6} {:>12.4} {:>12.4} {:>12}",
            bin,
            g.edges[bin],
            g.edges[bin + 1],
            occupancy
        )?;
        for count in row {
            write!(out, " {:>12}", count)?;
        }
        if discard_column {
            write!(out, " {:>12}", h.discarded[bin])?;
        }
        writeln!(out)?;
    }

    let occupancy: u64 = report.occupancy.iter().sum();
    write!(out, "{:>6} {:>12} {:>12} {:>12}", "total", "", "", occupancy)?;
    for total in h.bucket_totals() {
        write!(out, " {:>12}", total)?;
    }
    if discard_column {
        write!(out, " {:>12}", h.total_discarded())?;
    }
    writeln!(out)?;
    Ok(())
}

/// Writes the report as pretty-printed JSON
pub fn write_json<W: Write>(report: &AnalysisReport, out: W) -> io::Result<()> {
    serde_json::to_writer_pretty(out, report)?;
    Ok(())
}

/// Writes one line per closed run
pub fn write_runs<W: Write>(runs: &[ResidencyRun], out: &mut W) -> io::Result<()> {
    writeln!(out, "# particle bin start_frame length")?;
    for run in runs {
        writeln!(
            out,
            "{} {} {} {}",
            run.particle, run.bin, run.start_frame, run.length
        )?;
    }
    Ok(())
}
