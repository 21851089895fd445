//! # Trajectory access
//!
//! The analysis only ever walks a trajectory forward, one frame at a time.
//! [`TrajectoryReader`] is that contract; the DCD reader, an in-memory
//! trajectory and a concatenation of several readers implement it.

use glam::Vec3;
use log::info;
use thiserror::Error;

#[cfg(feature = "dcd")]
use std::path::Path;

/// Errors raised while reading trajectory data
#[derive(Error, Debug)]
pub enum TrajError {
    /// I/O errors from the underlying file system
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Format errors from invalid file structure
    #[error("format error: {0}")]
    Format(String),

    /// Endianness errors when byte order cannot be determined
    #[error("endianness error: {0}")]
    Endianness(String),

    /// Validation errors when a file doesn't meet expected criteria
    #[error("validation error: {0}")]
    Validation(String),

    /// Frames or files that disagree with each other (atom counts)
    #[error("mismatch: {0}")]
    Mismatch(String),
}

pub type TrajResult<T> = Result<T, TrajError>;

/// A single snapshot of the simulated system
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Atom positions (x, y, z), indexed by particle id
    pub positions: Vec<Vec3>,

    /// Box dimensions [A, B, C, alpha, beta, gamma]
    pub box_dimensions: [f64; 6],

    /// Absolute simulation timestep of this frame
    pub timestep: i64,

    /// Timesteps between this frame and the next one written by the same run.
    /// Zero when unknown.
    pub timestep_stride: i64,
}

impl Frame {
    /// Frame without unit cell or timing information
    pub fn new(positions: Vec<Vec3>) -> Self {
        Self {
            positions,
            box_dimensions: [0.0; 6],
            timestep: 0,
            timestep_stride: 0,
        }
    }

    /// Sets an orthorhombic cell with the given edge lengths
    pub fn with_box(mut self, lengths: [f64; 3]) -> Self {
        self.box_dimensions = [lengths[0], lengths[1], lengths[2], 90.0, 90.0, 90.0];
        self
    }

    /// Sets the timestep metadata
    pub fn with_timestep(mut self, timestep: i64, stride: i64) -> Self {
        self.timestep = timestep;
        self.timestep_stride = stride;
        self
    }

    pub fn n_atoms(&self) -> usize {
        self.positions.len()
    }

    /// Cell edge lengths, or `None` when the frame carries no usable box
    pub fn unit_cell_lengths(&self) -> Option<Vec3> {
        let [a, b, c, ..] = self.box_dimensions;
        if a > 0.0 && b > 0.0 && c > 0.0 {
            Some(Vec3::new(a as f32, b as f32, c as f32))
        } else {
            None
        }
    }

    /// Positions of the given atoms, in the order of `indices`
    pub fn coordinates_of(&self, indices: &[usize]) -> TrajResult<Vec<Vec3>> {
        indices
            .iter()
            .map(|&idx| {
                self.positions.get(idx).copied().ok_or_else(|| {
                    TrajError::Mismatch(format!(
                        "atom index {} out of range for frame with {} atoms",
                        idx,
                        self.positions.len()
                    ))
                })
            })
            .collect()
    }
}

/// Sequential source of frames
pub trait TrajectoryReader {
    /// Number of atoms in every frame
    fn n_atoms(&self) -> usize;

    /// Total number of frames this reader will yield
    fn n_frames(&self) -> usize;

    /// Reads the next frame, `Ok(None)` at the end of the trajectory
    fn read_next(&mut self) -> TrajResult<Option<Frame>>;
}

impl<R: TrajectoryReader + ?Sized> TrajectoryReader for Box<R> {
    fn n_atoms(&self) -> usize {
        (**self).n_atoms()
    }

    fn n_frames(&self) -> usize {
        (**self).n_frames()
    }

    fn read_next(&mut self) -> TrajResult<Option<Frame>> {
        (**self).read_next()
    }
}

/// Frames held in memory
pub struct MemoryTrajectory {
    n_atoms: usize,
    frames: Vec<Frame>,
    cursor: usize,
}

impl MemoryTrajectory {
    /// Every frame must hold `n_atoms` positions
    pub fn new(n_atoms: usize, frames: Vec<Frame>) -> TrajResult<Self> {
        if let Some((i, frame)) = frames
            .iter()
            .enumerate()
            .find(|(_, f)| f.positions.len() != n_atoms)
        {
            return Err(TrajError::Mismatch(format!(
                "frame {} has {} atoms, expected {}",
                i,
                frame.positions.len(),
                n_atoms
            )));
        }
        Ok(Self {
            n_atoms,
            frames,
            cursor: 0,
        })
    }

    /// Rewinds to the first frame
    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}

impl TrajectoryReader for MemoryTrajectory {
    fn n_atoms(&self) -> usize {
        self.n_atoms
    }

    fn n_frames(&self) -> usize {
        self.frames.len()
    }

    fn read_next(&mut self) -> TrajResult<Option<Frame>> {
        let frame = self.frames.get(self.cursor).cloned();
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }
}

/// Several readers played back to back, as one trajectory
///
/// File boundaries are ordinary frame boundaries; whether a boundary is a
/// time gap is decided from the frames' timestep metadata by the caller.
pub struct TrajectoryChain {
    readers: Vec<Box<dyn TrajectoryReader>>,
    current: usize,
    n_atoms: usize,
}

impl TrajectoryChain {
    /// All readers must agree on the atom count
    pub fn new(readers: Vec<Box<dyn TrajectoryReader>>) -> TrajResult<Self> {
        let n_atoms = match readers.first() {
            Some(r) => r.n_atoms(),
            None => {
                return Err(TrajError::Validation(
                    "a trajectory needs at least one file".to_string(),
                ))
            }
        };
        if let Some((i, r)) = readers
            .iter()
            .enumerate()
            .find(|(_, r)| r.n_atoms() != n_atoms)
        {
            return Err(TrajError::Mismatch(format!(
                "trajectory segment {} has {} atoms, the first segment has {}",
                i,
                r.n_atoms(),
                n_atoms
            )));
        }
        Ok(Self {
            readers,
            current: 0,
            n_atoms,
        })
    }

    /// Opens each DCD file in order and chains them
    #[cfg(feature = "dcd")]
    pub fn open_dcd<P: AsRef<Path>>(paths: &[P]) -> TrajResult<Self> {
        let mut readers: Vec<Box<dyn TrajectoryReader>> = Vec::with_capacity(paths.len());
        for path in paths {
            let reader = crate::dcd::DcdReader::open(path)?;
            info!(
                "opened {}: {} frames, {} atoms",
                path.as_ref().display(),
                reader.num_frames(),
                reader.num_atoms()
            );
            readers.push(Box::new(reader));
        }
        Self::new(readers)
    }

    /// Number of chained segments
    pub fn n_segments(&self) -> usize {
        self.readers.len()
    }

    /// Global index of the first frame of each segment
    pub fn segment_starts(&self) -> Vec<usize> {
        let mut start = 0;
        self.readers
            .iter()
            .map(|r| {
                let s = start;
                start += r.n_frames();
                s
            })
            .collect()
    }
}

impl TrajectoryReader for TrajectoryChain {
    fn n_atoms(&self) -> usize {
        self.n_atoms
    }

    fn n_frames(&self) -> usize {
        self.readers.iter().map(|r| r.n_frames()).sum()
    }

    fn read_next(&mut self) -> TrajResult<Option<Frame>> {
        while let Some(reader) = self.readers.get_mut(self.current) {
            if let Some(frame) = reader.read_next()? {
                return Ok(Some(frame));
            }
            self.current += 1;
            if self.current < self.readers.len() {
                info!("continuing with trajectory segment {}", self.current);
            }
        }
        Ok(None)
    }
}
