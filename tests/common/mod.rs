//! Fixture writers shared by the integration tests

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

/// Path of `name` inside the test's own temp directory
pub fn temp_path(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

pub fn write_text(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = temp_path(dir, name);
    fs::write(&path, contents).unwrap();
    path
}

/// One frame of a synthetic DCD: cell lengths and atom positions
pub struct DcdFrame {
    pub cell: [f64; 3],
    pub positions: Vec<[f32; 3]>,
}

impl DcdFrame {
    pub fn new(cell: [f64; 3], positions: Vec<[f32; 3]>) -> Self {
        Self { cell, positions }
    }
}

/// Header fields of a synthetic DCD
pub struct DcdHeader {
    pub istart: i32,
    pub nevery: i32,
    pub big_endian: bool,
    pub titles: Vec<String>,
}

impl Default for DcdHeader {
    fn default() -> Self {
        Self {
            istart: 0,
            nevery: 1,
            big_endian: false,
            titles: vec!["synthetic trajectory".to_string()],
        }
    }
}

struct Encoder {
    bytes: Vec<u8>,
    big_endian: bool,
}

impl Encoder {
    fn i32(&mut self, v: i32) {
        let b = if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        self.bytes.extend_from_slice(&b);
    }

    fn f32(&mut self, v: f32) {
        let b = if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        self.bytes.extend_from_slice(&b);
    }

    fn f64(&mut self, v: f64) {
        let b = if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        self.bytes.extend_from_slice(&b);
    }
}

/// Encodes a CHARMM-style DCD with a unit cell in every frame
pub fn encode_dcd(header: &DcdHeader, frames: &[DcdFrame]) -> Vec<u8> {
    let natoms = frames.first().map(|f| f.positions.len()).unwrap_or(0) as i32;
    let nframes = frames.len() as i32;
    let mut e = Encoder {
        bytes: Vec::new(),
        big_endian: header.big_endian,
    };

    // Main header record
    e.i32(84);
    e.bytes.extend_from_slice(b"CORD");
    e.i32(nframes);
    e.i32(header.istart);
    e.i32(header.nevery);
    e.i32(header.istart + (nframes - 1).max(0) * header.nevery);
    for _ in 0..5 {
        e.i32(0);
    }
    e.f32(0.002);
    e.i32(1); // unit cell present
    e.i32(0); // no fourth dimension
    for _ in 0..7 {
        e.i32(0);
    }
    e.i32(24); // CHARMM version
    e.i32(84);

    // Titles
    let ntitle = header.titles.len() as i32;
    e.i32(4 + 80 * ntitle);
    e.i32(ntitle);
    for title in &header.titles {
        let mut line = [b' '; 80];
        for (dst, src) in line.iter_mut().zip(title.bytes()) {
            *dst = src;
        }
        e.bytes.extend_from_slice(&line);
    }
    e.i32(4 + 80 * ntitle);

    // Atom count
    e.i32(4);
    e.i32(natoms);
    e.i32(4);

    for frame in frames {
        let [a, b, c] = frame.cell;
        e.i32(48);
        for v in [a, 90.0, b, 90.0, 90.0, c] {
            e.f64(v);
        }
        e.i32(48);
        for axis in 0..3 {
            e.i32(natoms * 4);
            for p in &frame.positions {
                e.f32(p[axis]);
            }
            e.i32(natoms * 4);
        }
    }
    e.bytes
}

pub fn write_dcd(dir: &TempDir, name: &str, header: &DcdHeader, frames: &[DcdFrame]) -> PathBuf {
    let path = temp_path(dir, name);
    fs::write(&path, encode_dcd(header, frames)).unwrap();
    path
}

/// PDB `ATOM` line with the columns the structure reader uses
pub fn pdb_atom(serial: usize, name: &str, resname: &str, resid: usize, pos: [f32; 3]) -> String {
    format!(
        "ATOM  {:>5} {:<4} {:<4}A{:>4}    {:>8.3}{:>8.3}{:>8.3}  1.00  0.00      SYS",
        serial, name, resname, resid, pos[0], pos[1], pos[2]
    )
}

/// Writes a PDB from (name, resname, position) triples
pub fn write_pdb(dir: &TempDir, name: &str, atoms: &[(&str, &str, [f32; 3])]) -> PathBuf {
    let mut text = String::new();
    for (i, (atom, resname, pos)) in atoms.iter().enumerate() {
        text.push_str(&pdb_atom(i + 1, atom, resname, i + 1, *pos));
        text.push('\n');
    }
    text.push_str("END\n");
    write_text(dir, name, &text)
}
