//! # Frame alignment
//!
//! Before particles are binned, every frame is brought into the reference
//! orientation:
//!
//! 1. each atom is wrapped into the periodic cell centred on the reference
//!    selection,
//! 2. the whole frame is superposed onto the reference coordinates of the
//!    structure file (least-squares rotation and translation).

use glam::Vec3;
use log::{debug, warn};
use nalgebra::{Matrix3, Vector3};

use crate::error::{ResidenceError, ResidenceResult};
use crate::selection::Selection;
use crate::topology::Topology;
use crate::trajectory::Frame;

/// Prepares raw frames for binning
pub trait FrameAligner {
    /// Transforms the frame in place
    fn prepare(&mut self, frame: &mut Frame) -> ResidenceResult<()>;
}

/// Leaves frames untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAlignment;

impl FrameAligner for NoAlignment {
    fn prepare(&mut self, _frame: &mut Frame) -> ResidenceResult<()> {
        Ok(())
    }
}

/// Wraps a frame around the reference selection, then superposes it onto
/// the reference coordinates
#[derive(Debug, Clone)]
pub struct ReferenceAligner {
    selection: Selection,
    reference: Vec<Vec3>,
    warned_no_box: bool,
}

impl ReferenceAligner {
    /// # Arguments
    ///
    /// * `topology` - Structure whose coordinates are the target orientation
    /// * `selection` - Atoms used to center and superpose each frame
    ///
    /// # Returns
    ///
    /// A `Config` error if the selection is empty or refers to atoms the
    /// structure does not have
    pub fn new(topology: &Topology, selection: Selection) -> ResidenceResult<Self> {
        if selection.is_empty() {
            return Err(ResidenceError::Config(format!(
                "reference selection '{}' matches no atoms",
                selection.expression()
            )));
        }
        let reference = selection
            .indices()
            .iter()
            .map(|&i| {
                topology.positions.get(i).copied().ok_or_else(|| {
                    ResidenceError::Config(format!(
                        "reference atom {} not in structure of {} atoms",
                        i,
                        topology.n_atoms()
                    ))
                })
            })
            .collect::<ResidenceResult<Vec<_>>>()?;
        Ok(Self {
            selection,
            reference,
            warned_no_box: false,
        })
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }
}

impl FrameAligner for ReferenceAligner {
    fn prepare(&mut self, frame: &mut Frame) -> ResidenceResult<()> {
        match frame.unit_cell_lengths() {
            Some(cell) => {
                let center = self.selection.center_in(frame)?;
                wrap(frame, cell, center);
            }
            None if !self.warned_no_box => {
                warn!("frame has no unit cell, skipping periodic wrapping");
                self.warned_no_box = true;
            }
            None => debug!("frame has no unit cell"),
        }

        let mobile = frame
            .coordinates_of(self.selection.indices())
            .map_err(|e| ResidenceError::Alignment(e.to_string()))?;
        let (rotation, from, to) = kabsch(&mobile, &self.reference)?;
        superpose(frame, &rotation, &from, &to);
        Ok(())
    }
}

/// Moves every atom by whole cell lengths into
/// `[center - L/2, center + L/2)` on each axis
pub fn wrap(frame: &mut Frame, cell: Vec3, center: Vec3) {
    let low = center - cell * 0.5;
    for p in frame.positions.iter_mut() {
        let shift = ((*p - low) / cell).floor();
        *p -= shift * cell;
    }
}

/// Applies `x -> R (x - from) + to` to every atom
pub fn superpose(frame: &mut Frame, rotation: &Matrix3<f64>, from: &Vector3<f64>, to: &Vector3<f64>) {
    for p in frame.positions.iter_mut() {
        let x = Vector3::new(p.x as f64, p.y as f64, p.z as f64) - from;
        let y = rotation * x + to;
        *p = Vec3::new(y[0] as f32, y[1] as f32, y[2] as f32);
    }
}

fn centroid(points: &[Vec3]) -> Vector3<f64> {
    let sum = points.iter().fold(Vector3::zeros(), |acc, p| {
        acc + Vector3::new(p.x as f64, p.y as f64, p.z as f64)
    });
    sum / points.len() as f64
}

/// Least-squares rotation taking `mobile` onto `target`
///
/// # Returns
///
/// `(R, mobile centroid, target centroid)`
pub fn kabsch(
    mobile: &[Vec3],
    target: &[Vec3],
) -> ResidenceResult<(Matrix3<f64>, Vector3<f64>, Vector3<f64>)> {
    if mobile.len() != target.len() {
        return Err(ResidenceError::Alignment(format!(
            "{} mobile atoms for {} reference atoms",
            mobile.len(),
            target.len()
        )));
    }
    if mobile.is_empty() {
        return Err(ResidenceError::Alignment("no atoms to superpose".to_string()));
    }

    let cx = centroid(mobile);
    let cy = centroid(target);
    let mut h = Matrix3::zeros();
    for (m, t) in mobile.iter().zip(target) {
        let xr = Vector3::new(m.x as f64, m.y as f64, m.z as f64) - cx;
        let yr = Vector3::new(t.x as f64, t.y as f64, t.z as f64) - cy;
        h += xr * yr.transpose();
    }

    let svd = h.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(ResidenceError::Alignment("SVD did not converge".to_string())),
    };
    let mut r = v_t.transpose() * u.transpose();
    if r.determinant() < 0.0 {
        let mut v_t_adj = v_t;
        v_t_adj.row_mut(2).neg_mut();
        r = v_t_adj.transpose() * u.transpose();
    }
    Ok((r, cx, cy))
}
