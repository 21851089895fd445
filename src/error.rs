//! # Error types
//!
//! Every fallible operation of the analysis returns [`ResidenceResult`].
//! Errors are fatal for the current pass: nothing partial is reported once
//! one of them has been raised.

use thiserror::Error;

use crate::trajectory::TrajError;

/// Errors raised while configuring or running a residence-time analysis
#[derive(Error, Debug)]
pub enum ResidenceError {
    /// I/O errors from the underlying file system
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed input (structure file, selection expression, config file)
    #[error("parse error: {0}")]
    Parse(String),

    /// Missing or inconsistent configuration, detected before the run
    #[error("configuration error: {0}")]
    Config(String),

    /// Degenerate cylinder (no bins, empty axial range, non-positive radius)
    #[error("degenerate geometry: {0}")]
    Geometry(String),

    /// The selection refers to particles the frame does not contain
    #[error("selection error: {0}")]
    Selection(String),

    /// The same particle was reported twice within one snapshot
    #[error("particle {particle} appears more than once in the snapshot of frame {frame}")]
    DuplicateParticle { frame: usize, particle: usize },

    /// Snapshots must be fed to the tracker in strict frame order
    #[error("snapshot for frame {found} received while frame {expected} was expected")]
    FrameOrder { expected: usize, found: usize },

    /// A trajectory file could not be opened
    #[error("trajectory error: {0}")]
    Trajectory(#[from] TrajError),

    /// The trajectory reader failed at the given frame
    #[error("failed to read frame {frame}: {source}")]
    Read {
        frame: usize,
        #[source]
        source: TrajError,
    },

    /// Superposition could not be computed
    #[error("alignment error: {0}")]
    Alignment(String),
}

/// Result alias used across the crate
pub type ResidenceResult<T> = Result<T, ResidenceError>;
