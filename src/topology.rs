//! # Structure file
//!
//! The PDB structure fixes the atom order (particle ids are positions in
//! this list), provides the attributes selections are written against, and
//! its coordinates are the reference frames are superposed onto.

use glam::Vec3;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{ResidenceError, ResidenceResult};

/// Static description of one atom
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub serial: i32,
    pub name: String,
    pub resname: String,
    pub chain: char,
    pub resid: i32,
    pub segid: String,
    pub element: String,
    pub hetero: bool,
}

/// Atoms of a structure in file order, with their coordinates
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub atoms: Vec<Atom>,
    pub positions: Vec<Vec3>,
}

impl Topology {
    /// Reads a PDB file
    pub fn from_pdb<P: AsRef<Path>>(path: P) -> ResidenceResult<Self> {
        let file = File::open(path.as_ref())?;
        Self::parse_pdb(BufReader::new(file))
    }

    /// Parses `ATOM`/`HETATM` records of the first model
    pub fn parse_pdb<R: BufRead>(reader: R) -> ResidenceResult<Self> {
        let mut topology = Topology::default();
        let mut saw_model = false;

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.starts_with("MODEL") {
                if saw_model {
                    break;
                }
                saw_model = true;
                continue;
            }
            if line.starts_with("ENDMDL") {
                break;
            }
            let hetero = line.starts_with("HETATM");
            if !(hetero || line.starts_with("ATOM")) {
                continue;
            }
            // Keep the first alternate location only
            let alt_loc = line.chars().nth(16).unwrap_or(' ');
            if alt_loc != ' ' && alt_loc != 'A' {
                continue;
            }

            let field = |start: usize, end: usize| column(&line, start, end);
            let coord = |start: usize, end: usize, what: &str| -> ResidenceResult<f32> {
                field(start, end).parse::<f32>().map_err(|_| {
                    ResidenceError::Parse(format!(
                        "line {}: invalid {} coordinate '{}'",
                        lineno + 1,
                        what,
                        field(start, end)
                    ))
                })
            };

            let name = field(12, 16).to_string();
            if name.is_empty() {
                return Err(ResidenceError::Parse(format!(
                    "line {}: atom record without a name",
                    lineno + 1
                )));
            }
            let serial = field(6, 11)
                .parse()
                .unwrap_or(topology.atoms.len() as i32 + 1);
            let resid = field(22, 26).parse().unwrap_or(1);
            let element = match field(76, 78) {
                "" => infer_element(&name),
                e => e.to_ascii_uppercase(),
            };
            let position = Vec3::new(
                coord(30, 38, "x")?,
                coord(38, 46, "y")?,
                coord(46, 54, "z")?,
            );

            topology.atoms.push(Atom {
                serial,
                resname: field(17, 21).to_string(),
                chain: line.chars().nth(21).unwrap_or(' '),
                resid,
                segid: field(72, 76).to_string(),
                element,
                hetero,
                name,
            });
            topology.positions.push(position);
        }

        if topology.atoms.is_empty() {
            return Err(ResidenceError::Parse("no atoms found in PDB".to_string()));
        }
        Ok(topology)
    }

    pub fn n_atoms(&self) -> usize {
        self.atoms.len()
    }
}

/// Trimmed text of columns `start..end`, empty when the line is shorter
fn column(line: &str, start: usize, end: usize) -> &str {
    let end = end.min(line.len());
    line.get(start..end).map(str::trim).unwrap_or("")
}

/// First letter of the atom name, skipping leading digits (`1HW` → `H`)
fn infer_element(name: &str) -> String {
    name.chars()
        .find(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase().to_string())
        .unwrap_or_default()
}
