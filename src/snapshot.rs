//! # Frame snapshots
//!
//! A snapshot is the set of (particle, bin) pairs observed in one frame.
//! Particles outside the cylinder are simply absent.

use crate::error::{ResidenceError, ResidenceResult};
use crate::geometry::BinGeometry;
use crate::selection::Selection;
use crate::trajectory::Frame;

/// Index of an atom in the structure, stable for the whole trajectory
pub type ParticleId = usize;

/// Particles inside the cylinder in one frame, with their bins
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    /// Frame this snapshot belongs to
    pub frame: usize,

    /// (particle, bin) pairs in selection order
    pub entries: Vec<(ParticleId, usize)>,
}

impl Snapshot {
    pub fn new(frame: usize, entries: Vec<(ParticleId, usize)>) -> Self {
        Self { frame, entries }
    }

    /// Snapshot with no particle inside the cylinder
    pub fn empty(frame: usize) -> Self {
        Self::new(frame, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Classifies every selected particle of `frame` into its bin
///
/// `frame` must already be wrapped and superposed. Fails with
/// [`ResidenceError::Selection`] if the selection names atoms the frame
/// does not have.
pub fn extract(
    frame_index: usize,
    frame: &Frame,
    selection: &Selection,
    geometry: &BinGeometry,
) -> ResidenceResult<Snapshot> {
    let mut entries = Vec::new();
    for &particle in selection.indices() {
        let position = frame.positions.get(particle).ok_or_else(|| {
            ResidenceError::Selection(format!(
                "particle {} selected but frame {} has only {} atoms",
                particle,
                frame_index,
                frame.n_atoms()
            ))
        })?;
        if let Some(bin) = geometry.bin_index_of(*position) {
            entries.push((particle, bin));
        }
    }
    Ok(Snapshot::new(frame_index, entries))
}
