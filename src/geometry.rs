//! # Cylinder and axial bins
//!
//! The analysed volume is a cylinder parallel to the z axis, split into
//! `n_bins` slabs of equal height between `z_min` and `z_max`.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{ResidenceError, ResidenceResult};

/// Whether the lower face of the cylinder belongs to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryPolicy {
    /// Open cylinder: `z_min < z < z_max`, `r < radius`
    #[default]
    Strict,
    /// Half-open axial range: `z_min <= z < z_max`, `r < radius`
    HalfOpen,
}

/// Cylinder dimensions and bin layout, fixed for a whole run
#[derive(Debug, Clone, PartialEq)]
pub struct BinGeometry {
    z_min: f64,
    z_max: f64,
    n_bins: usize,
    radius: f64,
    axis: [f64; 2],
    bin_size: f64,
    boundary: BoundaryPolicy,
}

impl BinGeometry {
    /// Cylinder centred on the z axis
    ///
    /// Fails with [`ResidenceError::Geometry`] when there are no bins, the
    /// axial range is empty or the radius is not positive.
    pub fn new(z_min: f64, z_max: f64, n_bins: usize, radius: f64) -> ResidenceResult<Self> {
        if n_bins == 0 {
            return Err(ResidenceError::Geometry(
                "bin count must be positive".to_string(),
            ));
        }
        if !z_min.is_finite() || !z_max.is_finite() || z_max <= z_min {
            return Err(ResidenceError::Geometry(format!(
                "z_max ({}) must be greater than z_min ({})",
                z_max, z_min
            )));
        }
        if !radius.is_finite() || radius <= 0.0 {
            return Err(ResidenceError::Geometry(format!(
                "radius must be positive, got {}",
                radius
            )));
        }
        Ok(Self {
            z_min,
            z_max,
            n_bins,
            radius,
            axis: [0.0, 0.0],
            bin_size: (z_max - z_min) / n_bins as f64,
            boundary: BoundaryPolicy::Strict,
        })
    }

    /// Moves the cylinder axis to pass through (x, y)
    pub fn with_axis(mut self, x: f64, y: f64) -> Self {
        self.axis = [x, y];
        self
    }

    pub fn with_boundary(mut self, boundary: BoundaryPolicy) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    pub fn z_min(&self) -> f64 {
        self.z_min
    }

    pub fn z_max(&self) -> f64 {
        self.z_max
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn axis(&self) -> [f64; 2] {
        self.axis
    }

    pub fn bin_size(&self) -> f64 {
        self.bin_size
    }

    pub fn boundary(&self) -> BoundaryPolicy {
        self.boundary
    }

    /// Lower edge of bin `i`; `edge(n_bins)` is `z_max`
    pub fn edge(&self, i: usize) -> f64 {
        if i >= self.n_bins {
            self.z_max
        } else {
            self.z_min + i as f64 * self.bin_size
        }
    }

    /// All `n_bins + 1` edges
    pub fn edges(&self) -> Vec<f64> {
        (0..=self.n_bins).map(|i| self.edge(i)).collect()
    }

    /// Bin holding `position`, or `None` outside the cylinder
    pub fn bin_index_of(&self, position: Vec3) -> Option<usize> {
        let dx = position.x as f64 - self.axis[0];
        let dy = position.y as f64 - self.axis[1];
        let r2 = dx * dx + dy * dy;
        if r2.is_nan() || r2 >= self.radius * self.radius {
            return None;
        }
        self.bin_index_of_z(position.z as f64)
    }

    /// Bin for an axial coordinate, ignoring the radial bound
    pub fn bin_index_of_z(&self, z: f64) -> Option<usize> {
        let below = match self.boundary {
            BoundaryPolicy::Strict => z <= self.z_min,
            BoundaryPolicy::HalfOpen => z < self.z_min,
        };
        if below || z >= self.z_max || z.is_nan() {
            return None;
        }

        let mut i = (((z - self.z_min) / self.bin_size).floor() as usize).min(self.n_bins - 1);
        // The division can land one bin off right at an edge
        if i > 0 && z < self.edge(i) {
            i -= 1;
        } else if i + 1 < self.n_bins && z >= self.edge(i + 1) {
            i += 1;
        }
        Some(i)
    }
}
