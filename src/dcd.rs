//! # DCD Trajectory File Reader
//!
//! Reads the binary DCD trajectories written by CHARMM, NAMD and LAMMPS.
//! Each frame is decoded into a [`Frame`] with its unit cell and absolute
//! timestep, which is what the residence analysis consumes.
//!
//! ## Layout handled here
//!
//! - Fortran-record header (`CORD` magic, frame count, `istart`, `nevery`)
//! - Title block
//! - Per frame: a 48-byte unit cell record, then X, Y and Z records of
//!   `natoms` 32-bit floats each
//!
//! Little endian coordinate records are cast straight out of the memory map;
//! big endian ones are byte-swapped value by value.
//!
//! ## Example
//!
//! ```no_run
//! use restime::DcdReader;
//!
//! let reader = DcdReader::open("trajectory.dcd").unwrap();
//! for frame_result in reader {
//!     let frame = frame_result.unwrap();
//!     println!("timestep {} with {} atoms", frame.timestep, frame.positions.len());
//! }
//! ```

use glam::Vec3;
use log::warn;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::trajectory::{Frame, TrajError, TrajResult, TrajectoryReader};

/// Value of the leading record marker of a DCD header
const HEADER_MARKER: i32 = 84;

/// Size in bytes of the unit cell record (six doubles)
const CELL_RECORD: i32 = 48;

/// Bytes of record markers around the cell record and the three coordinate records
const FRAME_OVERHEAD: u64 = 80;

/// Endianness of the DCD file
///
/// DCD files can be either little endian (most common on x86 systems)
/// or big endian (historically from older UNIX workstations).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Endianness {
    /// Little endian (most common)
    Little,
    /// Big endian
    Big,
}

/// A reader for CHARMM/NAMD DCD trajectory files
pub struct DcdReader {
    /// Memory-mapped file
    mmap: Mmap,

    /// Size of each frame in bytes
    framesize: u64,

    /// Byte offset of the first frame
    header_size: usize,

    /// Titles from the DCD file header
    titles: Vec<String>,

    /// Number of atoms in each frame
    natoms: usize,

    /// Number of frames in the file
    nframes: usize,

    /// First timestep of the trajectory
    istart: i32,

    /// Timestep frequency (how often frames were saved)
    nevery: i32,

    /// Last timestep of the trajectory
    iend: i32,

    /// Timestep size in simulation units
    delta: f32,

    /// Current position in file (in bytes)
    current_pos: usize,

    /// Current frame number (0-based index)
    current_frame: usize,

    /// Endianness of the file
    endianness: Endianness,

    /// Scratch buffers for the three coordinate records
    x_buffer: Vec<f32>,
    y_buffer: Vec<f32>,
    z_buffer: Vec<f32>,
}

/// Builder for DcdReader to allow flexible construction
pub struct DcdReaderBuilder {
    /// Path to the DCD file
    path: PathBuf,

    /// Force a specific endianness (auto-detected otherwise)
    endianness: Option<Endianness>,

    /// Skip the CHARMM / unit cell / 4D header checks
    skip_validation: bool,
}

impl DcdReaderBuilder {
    /// Create a new builder
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the DCD file
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            endianness: None,
            skip_validation: false,
        }
    }

    /// Force a specific endianness
    ///
    /// By default, the endianness is auto-detected from the header marker.
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = Some(endianness);
        self
    }

    /// Skip validation checks
    ///
    /// The residence analysis wraps coordinates with the unit cell, so only
    /// skip validation for files known to carry a cell anyway.
    pub fn skip_validation(mut self, skip: bool) -> Self {
        self.skip_validation = skip;
        self
    }

    /// Build the reader
    ///
    /// # Returns
    ///
    /// A Result containing either the DcdReader or an error
    pub fn build(self) -> TrajResult<DcdReader> {
        let file = File::open(&self.path)?;

        // SAFETY: the map is read-only and the file is not expected to be
        // truncated while the analysis runs
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        let endianness = match self.endianness {
            Some(e) => e,
            None => detect_endianness(&mmap)?,
        };

        if mmap.get(4..8) != Some(b"CORD".as_slice()) {
            return Err(TrajError::Format(format!(
                "{} is not a CORD trajectory, or its header is corrupt",
                self.path.display()
            )));
        }

        if !self.skip_validation {
            // LAMMPS pretends to be CHARMM v. 24
            if read_i32_at(&mmap, 84, endianness)? == 0 {
                return Err(TrajError::Validation(
                    "DCD file is not CHARMM-style; only CHARMM-style files are supported"
                        .to_string(),
                ));
            }
            if read_i32_at(&mmap, 48, endianness)? != 1 {
                return Err(TrajError::Validation(
                    "DCD file has no unit cell information, which is needed for wrapping"
                        .to_string(),
                ));
            }
            if read_i32_at(&mmap, 52, endianness)? == 1 {
                return Err(TrajError::Validation(
                    "four-dimensional DCD files are not supported".to_string(),
                ));
            }
        }

        let mut reader = DcdReader {
            mmap,
            framesize: 0,
            header_size: 0,
            titles: Vec::new(),
            natoms: 0,
            nframes: 0,
            istart: 0,
            nevery: 0,
            iend: 0,
            delta: 0.0,
            current_pos: 0,
            current_frame: 0,
            endianness,
            x_buffer: Vec::new(),
            y_buffer: Vec::new(),
            z_buffer: Vec::new(),
        };
        reader.read_header()?;

        reader.x_buffer = Vec::with_capacity(reader.natoms);
        reader.y_buffer = Vec::with_capacity(reader.natoms);
        reader.z_buffer = Vec::with_capacity(reader.natoms);

        Ok(reader)
    }
}

impl DcdReader {
    /// Opens a DCD file with default options
    pub fn open<P: AsRef<Path>>(path: P) -> TrajResult<Self> {
        DcdReaderBuilder::new(path).build()
    }

    /// Parses the header and positions the reader on the first frame
    fn read_header(&mut self) -> TrajResult<()> {
        // Frame count and timestep bookkeeping sit at fixed offsets after CORD
        let header_frames = read_i32_at(&self.mmap, 8, self.endianness)?;
        self.istart = read_i32_at(&self.mmap, 12, self.endianness)?;
        self.nevery = read_i32_at(&self.mmap, 16, self.endianness)?;
        self.iend = read_i32_at(&self.mmap, 20, self.endianness)?;
        // Integration timestep in AKMA units
        self.delta = read_f32_at(&self.mmap, 44, self.endianness)?;

        // Title lines are 80 characters, NUL padded
        let ntitle = read_i32_at(&self.mmap, 96, self.endianness)?;
        if ntitle < 0 {
            return Err(TrajError::Format(format!(
                "negative title count {} in header",
                ntitle
            )));
        }
        let mut pos = 100;
        self.titles = Vec::with_capacity(ntitle as usize);
        for _ in 0..ntitle {
            let bytes = self.mmap.get(pos..pos + 80).ok_or_else(|| {
                TrajError::Format("unexpected end of file reading titles".to_string())
            })?;
            // Stop at the first NUL, otherwise take the whole line
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(80);
            self.titles
                .push(String::from_utf8_lossy(&bytes[..end]).trim_end().to_string());
            pos += 80;
        }

        // Skip the record markers around the atom count
        pos += 8;
        let natoms = read_i32_at(&self.mmap, pos, self.endianness)?;
        if natoms < 0 {
            return Err(TrajError::Format(format!(
                "negative atom count {} in header",
                natoms
            )));
        }
        self.natoms = natoms as usize;
        // Past the atom count and its closing marker
        pos += 8;

        // Three float records plus the 48-byte cell record, all with markers
        self.framesize = (self.natoms as u64) * 12 + FRAME_OVERHEAD;
        self.header_size = pos;

        // The header count is not always updated by the writer; trust the file size
        let payload = (self.mmap.len() as u64).saturating_sub(pos as u64);
        let nframes = (payload / self.framesize) as usize;
        if header_frames < 0 || nframes != header_frames as usize {
            warn!(
                "DCD header indicates {} frames, but file size indicates {}",
                header_frames, nframes
            );
        }
        self.nframes = nframes;

        // First frame starts right after the header
        self.current_pos = pos;
        Ok(())
    }

    /// Reads the next frame from the DCD file
    ///
    /// # Returns
    ///
    /// - `Some(Frame)` if a frame was read
    /// - `None` at the end of the file
    pub fn read_next(&mut self) -> TrajResult<Option<Frame>> {
        // End of trajectory
        if self.current_frame >= self.nframes {
            return Ok(None);
        }
        // A whole frame must be mapped before anything is decoded
        if self.current_pos + self.framesize as usize > self.mmap.len() {
            return Err(TrajError::Format(
                "unexpected end of file reading frame".to_string(),
            ));
        }

        // Unit cell record, opened and closed by a 48 marker
        let mut pos = self.current_pos;
        if read_i32_at(&self.mmap, pos, self.endianness)? != CELL_RECORD {
            return Err(TrajError::Format(format!(
                "bad unit cell record in frame {}",
                self.current_frame
            )));
        }
        pos += 4;

        // Stored order is A, gamma, B, beta, alpha, C
        let mut cell = [0.0f64; 6];
        for slot in [0usize, 5, 1, 4, 3, 2] {
            cell[slot] = read_f64_at(&self.mmap, pos, self.endianness)?;
            pos += 8;
        }
        // Lengths only; angles may be cosines in some writers
        if cell[0] < 0.0 || cell[1] < 0.0 || cell[2] < 0.0 {
            return Err(TrajError::Format(format!(
                "negative cell length in frame {}",
                self.current_frame
            )));
        }

        let closing = read_i32_at(&self.mmap, pos, self.endianness)?;
        if closing != CELL_RECORD {
            return Err(TrajError::Format(format!(
                "bad unit cell record in frame {}",
                self.current_frame
            )));
        }
        pos += 4;

        // X, Y and Z are stored as separate records of natoms floats
        let natoms = self.natoms;
        let endianness = self.endianness;
        pos = read_axis(&self.mmap, pos, natoms, endianness, &mut self.x_buffer, "X")?;
        pos = read_axis(&self.mmap, pos, natoms, endianness, &mut self.y_buffer, "Y")?;
        pos = read_axis(&self.mmap, pos, natoms, endianness, &mut self.z_buffer, "Z")?;

        // Interleave the three axes into positions
        let positions = self
            .x_buffer
            .iter()
            .zip(&self.y_buffer)
            .zip(&self.z_buffer)
            .map(|((&x, &y), &z)| Vec3::new(x, y, z))
            .collect();

        // Absolute timestep, so gaps between files can be detected downstream
        let timestep = self.istart as i64 + self.current_frame as i64 * self.nevery as i64;
        self.current_frame += 1;
        self.current_pos = pos;

        Ok(Some(Frame {
            positions,
            box_dimensions: cell,
            timestep,
            timestep_stride: self.nevery as i64,
        }))
    }

    /// Skips the next `n` frames without decoding them
    pub fn skip_next(&mut self, n: usize) -> TrajResult<()> {
        if self.current_frame + n > self.nframes {
            return Err(TrajError::Format(
                "attempted to skip beyond the end of the file".to_string(),
            ));
        }
        self.current_pos += self.framesize as usize * n;
        self.current_frame += n;
        Ok(())
    }

    /// Positions the reader on frame `frame_idx` (0-based)
    pub fn seek_frame(&mut self, frame_idx: usize) -> TrajResult<()> {
        if frame_idx >= self.nframes {
            return Err(TrajError::Format(format!(
                "frame index {} out of range (file has {} frames)",
                frame_idx, self.nframes
            )));
        }
        self.current_pos = self.header_size + frame_idx * self.framesize as usize;
        self.current_frame = frame_idx;
        Ok(())
    }

    /// Rewinds to the first frame
    pub fn reset(&mut self) {
        self.current_frame = 0;
        self.current_pos = self.header_size;
    }

    /// Returns the total number of frames in the file
    pub fn num_frames(&self) -> usize {
        self.nframes
    }

    /// Returns the number of atoms in each frame
    pub fn num_atoms(&self) -> usize {
        self.natoms
    }

    /// Returns the titles from the DCD file
    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    /// Returns the starting timestep of the trajectory
    pub fn start_timestep(&self) -> i32 {
        self.istart
    }

    /// Returns how often (in timesteps) frames were saved
    pub fn timestep_freq(&self) -> i32 {
        self.nevery
    }

    /// Returns the last timestep recorded in the header
    pub fn end_timestep(&self) -> i32 {
        self.iend
    }

    /// Returns the integration timestep in simulation units
    pub fn timestep_size(&self) -> f32 {
        self.delta
    }

    /// Returns the endianness of the file
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }
}

impl TrajectoryReader for DcdReader {
    fn n_atoms(&self) -> usize {
        self.natoms
    }

    fn n_frames(&self) -> usize {
        self.nframes
    }

    fn read_next(&mut self) -> TrajResult<Option<Frame>> {
        DcdReader::read_next(self)
    }
}

impl Iterator for DcdReader {
    type Item = TrajResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        DcdReader::read_next(self).transpose()
    }
}

/// Determines byte order from the leading record marker (always 84)
fn detect_endianness(bytes: &[u8]) -> TrajResult<Endianness> {
    if read_i32_at(bytes, 0, Endianness::Little)? == HEADER_MARKER {
        Ok(Endianness::Little)
    } else if read_i32_at(bytes, 0, Endianness::Big)? == HEADER_MARKER {
        Ok(Endianness::Big)
    } else {
        Err(TrajError::Endianness(
            "could not determine file endianness from the header marker".to_string(),
        ))
    }
}

/// Reads one coordinate record (`natoms` floats between two markers) into `out`
///
/// # Returns
///
/// The byte position following the record
fn read_axis(
    bytes: &[u8],
    mut pos: usize,
    natoms: usize,
    endianness: Endianness,
    out: &mut Vec<f32>,
    axis: &str,
) -> TrajResult<usize> {
    let nbytes = natoms * 4;
    let marker = read_i32_at(bytes, pos, endianness)?;
    if marker < 0 || marker as usize != nbytes {
        return Err(TrajError::Format(format!(
            "bad {} coordinate record header",
            axis
        )));
    }
    pos += 4;

    let end = pos + nbytes;
    let raw = bytes.get(pos..end).ok_or_else(|| {
        TrajError::Format(format!("unexpected end of file reading {} coordinates", axis))
    })?;

    // Native little-endian data is cast in place, anything else is swapped per word
    out.clear();
    match (endianness, bytemuck::try_cast_slice::<u8, f32>(raw)) {
        (Endianness::Little, Ok(values)) if cfg!(target_endian = "little") => {
            out.extend_from_slice(values)
        }
        _ => {
            for chunk in raw.chunks_exact(4) {
                let word = [chunk[0], chunk[1], chunk[2], chunk[3]];
                out.push(match endianness {
                    Endianness::Little => f32::from_le_bytes(word),
                    Endianness::Big => f32::from_be_bytes(word),
                });
            }
        }
    }
    pos = end;

    let trailer = read_i32_at(bytes, pos, endianness)?;
    if trailer < 0 || trailer as usize != nbytes {
        return Err(TrajError::Format(format!(
            "bad {} coordinate record trailer",
            axis
        )));
    }
    Ok(pos + 4)
}

/// Reads `N` bytes at `pos`
#[inline(always)]
fn read_bytes<const N: usize>(bytes: &[u8], pos: usize) -> TrajResult<[u8; N]> {
    bytes
        .get(pos..pos + N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| TrajError::Format("unexpected end of file".to_string()))
}

#[inline(always)]
fn read_i32_at(bytes: &[u8], pos: usize, endianness: Endianness) -> TrajResult<i32> {
    let b = read_bytes::<4>(bytes, pos)?;
    Ok(match endianness {
        Endianness::Little => i32::from_le_bytes(b),
        Endianness::Big => i32::from_be_bytes(b),
    })
}

#[inline(always)]
fn read_f32_at(bytes: &[u8], pos: usize, endianness: Endianness) -> TrajResult<f32> {
    let b = read_bytes::<4>(bytes, pos)?;
    Ok(match endianness {
        Endianness::Little => f32::from_le_bytes(b),
        Endianness::Big => f32::from_be_bytes(b),
    })
}

#[inline(always)]
fn read_f64_at(bytes: &[u8], pos: usize, endianness: Endianness) -> TrajResult<f64> {
    let b = read_bytes::<8>(bytes, pos)?;
    Ok(match endianness {
        Endianness::Little => f64::from_le_bytes(b),
        Endianness::Big => f64::from_be_bytes(b),
    })
}
