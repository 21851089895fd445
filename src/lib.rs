//! # restime - residence times in cylindrical bins
//!
//! `restime` measures how long particles of a molecular dynamics trajectory
//! stay in the slabs of a cylinder (for example water in a channel pore).
//! Each frame is wrapped and superposed onto a reference structure, the
//! selected particles are assigned to axial bins, and every uninterrupted
//! stay in one bin becomes a run whose length lands in a histogram of
//! duration buckets.
//!
//! ## Features
//!
//! - Memory-mapped DCD trajectory reader (CHARMM, NAMD, LAMMPS), little and
//!   big endian, several files played back as one trajectory
//! - PDB structure reader and a small atom selection language
//! - Identity-keyed run tracking, deterministic for a given input
//! - Text, JSON and per-run outputs
//!
//! ## Example
//!
//! ```no_run
//! use restime::{
//!     BinGeometry, MemoryTrajectory, NoAlignment, ResidenceAnalysis, Selection, Thresholds,
//! };
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let frames = Vec::new();
//! let geometry = BinGeometry::new(-10.0, 10.0, 4, 6.0)?;
//! let thresholds = Thresholds::new(&[5, 100, 500], Default::default())?;
//! let analysis = ResidenceAnalysis::new(geometry, Selection::from_indices(vec![0, 1]), thresholds);
//!
//! let mut trajectory = MemoryTrajectory::new(2, frames)?;
//! let report = analysis.run(&mut trajectory, &mut NoAlignment)?;
//! for (bin, bucket, count) in report.histogram.entries() {
//!     println!("bin {} {}: {}", bin, bucket, count);
//! }
//! # Ok(())
//! # }
//! ```

pub mod align;
pub mod analysis;
pub mod config;
pub mod error;
pub mod geometry;
pub mod histogram;
pub mod report;
pub mod selection;
pub mod snapshot;
pub mod topology;
pub mod tracker;
pub mod trajectory;

// DCD support is optional; everything else works on any TrajectoryReader
#[cfg(feature = "dcd")]
pub mod dcd;

pub use align::{FrameAligner, NoAlignment, ReferenceAligner};
pub use analysis::{AnalysisReport, ResidenceAnalysis};
pub use config::{AnalysisConfig, TimeGapPolicy};
pub use error::{ResidenceError, ResidenceResult};
pub use geometry::{BinGeometry, BoundaryPolicy};
pub use histogram::{HistogramReport, ResidenceHistogram, SubMinimumPolicy, Thresholds};
pub use selection::Selection;
pub use snapshot::{ParticleId, Snapshot};
pub use topology::Topology;
pub use tracker::{OccupancyTracker, ResidencyRun, RunSink};
pub use trajectory::{Frame, MemoryTrajectory, TrajError, TrajectoryChain, TrajectoryReader};

#[cfg(feature = "dcd")]
pub use analysis::run_from_config;
#[cfg(feature = "dcd")]
pub use dcd::{DcdReader, DcdReaderBuilder, Endianness};
