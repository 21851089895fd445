//! # Occupancy tracking
//!
//! Follows every particle from one snapshot to the next and turns
//! uninterrupted stays in a single bin into [`ResidencyRun`]s.
//!
//! Each particle is either absent or resident in one bin since some start
//! frame. For snapshot `f`:
//!
//! - resident in `b` and still seen in `b`: nothing happens
//! - resident in `b` and not seen in `b`: the run closes with length
//!   `f - start`, and a new run opens at `f` if the particle is in another bin
//! - absent and seen in `b`: a run opens at `f`
//!
//! Snapshots are correlated by particle id only; the order of entries in a
//! snapshot carries no meaning.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{ResidenceError, ResidenceResult};
use crate::snapshot::{ParticleId, Snapshot};

/// A maximal stay of one particle in one bin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResidencyRun {
    pub particle: ParticleId,
    pub bin: usize,
    pub start_frame: usize,
    /// Number of frames, always at least 1
    pub length: usize,
}

impl ResidencyRun {
    /// Last frame the particle was seen in the bin
    pub fn last_frame(&self) -> usize {
        self.start_frame + self.length - 1
    }
}

/// Receiver of closed runs
pub trait RunSink {
    fn record_run(&mut self, run: &ResidencyRun);
}

impl RunSink for Vec<ResidencyRun> {
    fn record_run(&mut self, run: &ResidencyRun) {
        self.push(*run);
    }
}

impl<S: RunSink + ?Sized> RunSink for &mut S {
    fn record_run(&mut self, run: &ResidencyRun) {
        (**self).record_run(run);
    }
}

impl<S: RunSink> RunSink for Option<S> {
    fn record_run(&mut self, run: &ResidencyRun) {
        if let Some(sink) = self {
            sink.record_run(run);
        }
    }
}

/// Delivers every run to both sinks
impl<A: RunSink, B: RunSink> RunSink for (A, B) {
    fn record_run(&mut self, run: &ResidencyRun) {
        self.0.record_run(run);
        self.1.record_run(run);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenRun {
    bin: usize,
    start: usize,
}

/// Per-particle run state across a trajectory
#[derive(Debug, Clone)]
pub struct OccupancyTracker {
    n_bins: usize,
    open: BTreeMap<ParticleId, OpenRun>,
    next_frame: usize,
    /// Particle-frames observed per bin
    occupancy: Vec<u64>,
    closed: u64,
}

impl OccupancyTracker {
    pub fn new(n_bins: usize) -> Self {
        Self {
            n_bins,
            open: BTreeMap::new(),
            next_frame: 0,
            occupancy: vec![0; n_bins],
            closed: 0,
        }
    }

    /// Applies the snapshot of the next frame
    ///
    /// Fails without touching any state if the snapshot is out of order,
    /// lists a particle twice or names a bin that does not exist.
    pub fn observe<S: RunSink>(
        &mut self,
        snapshot: &Snapshot,
        sink: &mut S,
    ) -> ResidenceResult<()> {
        let frame = snapshot.frame;
        if frame != self.next_frame {
            return Err(ResidenceError::FrameOrder {
                expected: self.next_frame,
                found: frame,
            });
        }

        // Validate the whole snapshot before any run is touched
        let mut current: BTreeMap<ParticleId, usize> = BTreeMap::new();
        for &(particle, bin) in &snapshot.entries {
            if bin >= self.n_bins {
                return Err(ResidenceError::Selection(format!(
                    "particle {} assigned to bin {} of {} in frame {}",
                    particle, bin, self.n_bins, frame
                )));
            }
            if current.insert(particle, bin).is_some() {
                return Err(ResidenceError::DuplicateParticle { frame, particle });
            }
        }

        // Runs survive only if the particle is still in the same bin;
        // closing in id order keeps the emitted sequence deterministic
        let previous = std::mem::take(&mut self.open);
        for (particle, run) in previous {
            if current.get(&particle) == Some(&run.bin) {
                self.open.insert(particle, run);
            } else {
                self.close(particle, run, frame, sink);
            }
        }

        // Newcomers and bin changes open a run starting at this frame
        for (particle, bin) in current {
            self.open
                .entry(particle)
                .or_insert(OpenRun { bin, start: frame });
            self.occupancy[bin] += 1;
        }

        self.next_frame += 1;
        Ok(())
    }

    /// Closes every open run before the next frame, as if all particles had
    /// left. Used when the trajectory has a time gap.
    pub fn interrupt<S: RunSink>(&mut self, sink: &mut S) -> usize {
        self.close_all(sink)
    }

    /// Closes the runs still open after the last observed frame
    ///
    /// # Returns
    ///
    /// The number of runs closed
    pub fn finish<S: RunSink>(&mut self, sink: &mut S) -> usize {
        self.close_all(sink)
    }

    fn close_all<S: RunSink>(&mut self, sink: &mut S) -> usize {
        // Every run ends after the last observed frame
        let open = std::mem::take(&mut self.open);
        let n = open.len();
        let end = self.next_frame;
        for (particle, run) in open {
            self.close(particle, run, end, sink);
        }
        n
    }

    /// Ends `run` just before frame `end`
    fn close<S: RunSink>(&mut self, particle: ParticleId, run: OpenRun, end: usize, sink: &mut S) {
        let residency = ResidencyRun {
            particle,
            bin: run.bin,
            start_frame: run.start,
            length: end - run.start,
        };
        self.closed += 1;
        sink.record_run(&residency);
    }

    /// Frames observed so far
    pub fn frames_observed(&self) -> usize {
        self.next_frame
    }

    /// Runs currently open
    pub fn open_runs(&self) -> usize {
        self.open.len()
    }

    /// Runs closed so far
    pub fn closed_runs(&self) -> u64 {
        self.closed
    }

    /// Bin the particle currently resides in
    pub fn resident_bin(&self, particle: ParticleId) -> Option<usize> {
        self.open.get(&particle).map(|r| r.bin)
    }

    /// Particle-frames observed per bin
    pub fn occupancy(&self) -> &[u64] {
        &self.occupancy
    }
}
