//! # Analysis driver
//!
//! One sequential pass over a trajectory: every frame is aligned, turned
//! into a [`Snapshot`](crate::snapshot::Snapshot) and fed to the
//! [`OccupancyTracker`]; closed runs land in the [`ResidenceHistogram`]
//! (and in the run log when requested). Open runs are closed after the last
//! frame.

use log::{debug, info, warn};
use serde::Serialize;

use crate::align::FrameAligner;
use crate::config::TimeGapPolicy;
use crate::error::{ResidenceError, ResidenceResult};
use crate::geometry::{BinGeometry, BoundaryPolicy};
use crate::histogram::{HistogramReport, ResidenceHistogram, Thresholds};
use crate::selection::Selection;
use crate::snapshot::extract;
use crate::tracker::{OccupancyTracker, ResidencyRun};
use crate::trajectory::TrajectoryReader;

#[cfg(feature = "dcd")]
use crate::{
    align::{NoAlignment, ReferenceAligner},
    config::AnalysisConfig,
    topology::Topology,
    trajectory::TrajectoryChain,
};

/// Cylinder description as written to reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeometrySummary {
    pub z_min: f64,
    pub z_max: f64,
    pub n_bins: usize,
    pub radius: f64,
    pub bin_size: f64,
    pub axis: [f64; 2],
    pub boundary: BoundaryPolicy,
    pub edges: Vec<f64>,
}

impl From<&BinGeometry> for GeometrySummary {
    fn from(g: &BinGeometry) -> Self {
        Self {
            z_min: g.z_min(),
            z_max: g.z_max(),
            n_bins: g.n_bins(),
            radius: g.radius(),
            bin_size: g.bin_size(),
            axis: g.axis(),
            boundary: g.boundary(),
            edges: g.edges(),
        }
    }
}

/// Everything a finished pass produces
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub geometry: GeometrySummary,
    pub selection: String,
    /// Particles matched by the selection
    pub n_particles: usize,
    pub frames: usize,
    /// Time gaps at which open runs were split
    pub time_gaps: usize,
    pub histogram: HistogramReport,
    /// Particle-frames observed per bin
    pub occupancy: Vec<u64>,
    /// Every closed run, when the run log was requested
    #[serde(skip)]
    pub runs: Vec<ResidencyRun>,
}

/// Residence-time analysis of one selection in one cylinder
#[derive(Debug, Clone)]
pub struct ResidenceAnalysis {
    geometry: BinGeometry,
    selection: Selection,
    thresholds: Thresholds,
    time_gap: TimeGapPolicy,
    record_runs: bool,
}

impl ResidenceAnalysis {
    pub fn new(geometry: BinGeometry, selection: Selection, thresholds: Thresholds) -> Self {
        Self {
            geometry,
            selection,
            thresholds,
            time_gap: TimeGapPolicy::default(),
            record_runs: false,
        }
    }

    pub fn with_time_gap(mut self, policy: TimeGapPolicy) -> Self {
        self.time_gap = policy;
        self
    }

    /// Keeps every closed run in [`AnalysisReport::runs`]
    pub fn record_runs(mut self, enabled: bool) -> Self {
        self.record_runs = enabled;
        self
    }

    pub fn geometry(&self) -> &BinGeometry {
        &self.geometry
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Runs the pass over every frame `reader` yields
    ///
    /// # Arguments
    ///
    /// * `reader` - Trajectory, consumed from its current position
    /// * `aligner` - Applied to each frame before binning
    ///
    /// # Returns
    ///
    /// The report, or the first error. A reader failure is reported with
    /// the index of the frame being read.
    pub fn run<R, A>(&self, reader: &mut R, aligner: &mut A) -> ResidenceResult<AnalysisReport>
    where
        R: TrajectoryReader + ?Sized,
        A: FrameAligner + ?Sized,
    {
        // Indices are sorted, so the last one bounds the whole selection
        if let Some(&last) = self.selection.indices().last() {
            if last >= reader.n_atoms() {
                return Err(ResidenceError::Selection(format!(
                    "selection refers to atom {} but the trajectory has {} atoms",
                    last,
                    reader.n_atoms()
                )));
            }
        } else {
            warn!(
                "selection '{}' matches no atoms, the histogram will be empty",
                self.selection.expression()
            );
        }

        let n_bins = self.geometry.n_bins();
        info!(
            "tracking {} particles in {} bins over {} frames",
            self.selection.len(),
            n_bins,
            reader.n_frames()
        );

        let mut tracker = OccupancyTracker::new(n_bins);
        let mut histogram = ResidenceHistogram::new(n_bins, self.thresholds.clone());
        // Closed runs go to the histogram and, if asked for, to the run log
        let mut runs = self.record_runs.then(Vec::new);
        let mut sink = (&mut histogram, runs.as_mut());

        let mut previous: Option<(i64, i64)> = None;
        let mut time_gaps = 0;
        let mut index = 0;
        loop {
            let mut frame = match reader.read_next() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(source) => return Err(ResidenceError::Read { frame: index, source }),
            };

            // A jump past the previous timestep plus its stride is a time gap
            if let Some((timestep, stride)) = previous {
                let jumped = stride > 0 && frame.timestep > timestep + stride;
                if jumped && self.time_gap == TimeGapPolicy::Split {
                    let closed = tracker.interrupt(&mut sink);
                    time_gaps += 1;
                    info!(
                        "time gap before frame {} (timestep {} -> {}), closed {} runs",
                        index, timestep, frame.timestep, closed
                    );
                }
            }
            previous = Some((frame.timestep, frame.timestep_stride));

            // Align, bin, then feed the tracker
            aligner.prepare(&mut frame)?;
            let snapshot = extract(index, &frame, &self.selection, &self.geometry)?;
            debug!("frame {}: {} particles inside the cylinder", index, snapshot.len());
            tracker.observe(&snapshot, &mut sink)?;
            index += 1;
        }

        // Stays still in progress end with the trajectory
        let closed = tracker.finish(&mut sink);
        debug!("closed {} runs still open at the last frame", closed);
        info!(
            "processed {} frames, {} runs closed",
            tracker.frames_observed(),
            tracker.closed_runs()
        );

        Ok(AnalysisReport {
            geometry: GeometrySummary::from(&self.geometry),
            selection: self.selection.expression().to_string(),
            n_particles: self.selection.len(),
            frames: tracker.frames_observed(),
            time_gaps,
            histogram: histogram.report(),
            occupancy: tracker.occupancy().to_vec(),
            runs: runs.unwrap_or_default(),
        })
    }
}

/// Loads the structure and trajectory files a configuration names and runs
/// the analysis on them
#[cfg(feature = "dcd")]
pub fn run_from_config(config: &AnalysisConfig, record_runs: bool) -> ResidenceResult<AnalysisReport> {
    let topology = Topology::from_pdb(&config.pdb)?;
    info!(
        "read {} atoms from {}",
        topology.n_atoms(),
        config.pdb.display()
    );
    let selection = Selection::parse(&config.selection, &topology)?;
    let reference = Selection::parse(&config.reference, &topology)?;
    info!(
        "selection '{}': {} atoms, reference '{}': {} atoms",
        selection.expression(),
        selection.len(),
        reference.expression(),
        reference.len()
    );

    // Atom order in the structure defines particle identity
    let mut chain = TrajectoryChain::open_dcd(&config.trajectories)?;
    if chain.n_atoms() != topology.n_atoms() {
        return Err(ResidenceError::Config(format!(
            "structure has {} atoms but the trajectory has {}",
            topology.n_atoms(),
            chain.n_atoms()
        )));
    }

    let analysis = ResidenceAnalysis::new(config.geometry.clone(), selection, config.thresholds.clone())
        .with_time_gap(config.time_gap)
        .record_runs(record_runs);

    if config.align {
        let mut aligner = ReferenceAligner::new(&topology, reference)?;
        analysis.run(&mut chain, &mut aligner)
    } else {
        analysis.run(&mut chain, &mut NoAlignment)
    }
}
