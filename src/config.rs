//! # Analysis configuration
//!
//! A run is described either by a keyword input file, one keyword per line:
//!
//! ```text
//! dcd1   run1.dcd
//! dcd2   run2.dcd
//! pdb    system.pdb
//! ref    protein and name CA
//! sel    name OH2
//! zmin   -20
//! zmax   20
//! nbins  8
//! rad    6.5
//! thr    5 100 500   # frames
//! ```
//!
//! or by a JSON document with the same content ([`ConfigFile`] field names).
//! Files ending in `.json` are read as JSON, anything else as keywords.
//! Both are validated into an [`AnalysisConfig`] before anything is read
//! from disk.

use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ResidenceError, ResidenceResult};
use crate::geometry::{BinGeometry, BoundaryPolicy};
use crate::histogram::{SubMinimumPolicy, Thresholds};

/// Output file used when none is configured
pub const DEFAULT_OUTPUT: &str = "outFile.out";

/// Handling of jumps in the simulation timestep between consecutive frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeGapPolicy {
    /// Close every open run before the first frame after the gap
    #[default]
    Split,
    /// Treat the frames as consecutive
    Ignore,
}

/// Raw configuration as written by the user, every field optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub trajectories: Vec<PathBuf>,
    pub pdb: Option<PathBuf>,
    pub psf: Option<PathBuf>,
    pub reference: Option<String>,
    pub selection: Option<String>,
    pub output: Option<PathBuf>,
    pub z_min: Option<f64>,
    pub z_max: Option<f64>,
    pub n_bins: Option<i64>,
    pub radius: Option<f64>,
    pub thresholds: Vec<i64>,
    pub sub_minimum: Option<SubMinimumPolicy>,
    pub boundary: Option<BoundaryPolicy>,
    pub axis: Option<[f64; 2]>,
    pub time_gap: Option<TimeGapPolicy>,
    pub align: Option<bool>,
}

/// Validated, fully populated configuration
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Trajectory files, read in this order as one trajectory
    pub trajectories: Vec<PathBuf>,
    pub pdb: PathBuf,
    /// Accepted for compatibility, not read
    pub psf: Option<PathBuf>,
    /// Selection used to center and superpose frames
    pub reference: String,
    /// Particles whose residence is measured
    pub selection: String,
    pub output: PathBuf,
    pub geometry: BinGeometry,
    pub thresholds: Thresholds,
    pub time_gap: TimeGapPolicy,
    pub align: bool,
}

impl AnalysisConfig {
    /// Loads a keyword or JSON file, chosen by extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> ResidenceResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let raw = if path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
        {
            ConfigFile::from_json(&text)?
        } else {
            ConfigFile::from_keywords(&text)?
        };
        raw.validate()
    }

    pub fn from_keywords(text: &str) -> ResidenceResult<Self> {
        ConfigFile::from_keywords(text)?.validate()
    }

    pub fn from_json(text: &str) -> ResidenceResult<Self> {
        ConfigFile::from_json(text)?.validate()
    }
}

impl ConfigFile {
    pub fn from_json(text: &str) -> ResidenceResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| ResidenceError::Parse(format!("invalid JSON configuration: {}", e)))
    }

    /// Parses the keyword format
    ///
    /// Keywords are case-insensitive. Any keyword containing `dcd` adds a
    /// trajectory file and any keyword containing `sel` sets the target
    /// selection. Unknown keywords are skipped with a warning.
    pub fn from_keywords(text: &str) -> ResidenceResult<Self> {
        let mut cfg = ConfigFile::default();

        for (lineno, raw_line) in text.lines().enumerate() {
            let line = strip_comments(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let kw = tokens[0].to_lowercase();
            let args = &tokens[1..];
            let lineno = lineno + 1;

            let first = || {
                args.first().copied().ok_or_else(|| {
                    ResidenceError::Parse(format!("line {}: '{}' requires a value", lineno, kw))
                })
            };
            let rest = || -> ResidenceResult<String> {
                first()?;
                Ok(args.join(" "))
            };

            if kw.contains("dcd") {
                cfg.trajectories.push(PathBuf::from(first()?));
            } else if kw == "pdb" {
                cfg.pdb = Some(PathBuf::from(first()?));
            } else if kw == "psf" {
                cfg.psf = Some(PathBuf::from(first()?));
            } else if kw == "ref" {
                cfg.reference = Some(rest()?);
            } else if kw.contains("sel") {
                cfg.selection = Some(rest()?);
            } else if kw == "out" {
                cfg.output = Some(PathBuf::from(first()?));
            } else if kw == "zmin" {
                cfg.z_min = Some(parse_number(first()?, &kw, lineno)?);
            } else if kw == "zmax" {
                cfg.z_max = Some(parse_number(first()?, &kw, lineno)?);
            } else if kw == "nbins" {
                cfg.n_bins = Some(parse_number(first()?, &kw, lineno)?);
            } else if kw == "rad" {
                cfg.radius = Some(parse_number(first()?, &kw, lineno)?);
            } else if kw == "thr" {
                cfg.thresholds = args
                    .iter()
                    .map(|v| parse_number(v, &kw, lineno))
                    .collect::<ResidenceResult<_>>()?;
            } else if kw == "submin" {
                cfg.sub_minimum = Some(match first()?.to_lowercase().as_str() {
                    "report" => SubMinimumPolicy::Report,
                    "discard" => SubMinimumPolicy::Discard,
                    other => return Err(bad_choice(&kw, other, "report|discard", lineno)),
                });
            } else if kw == "boundary" {
                cfg.boundary = Some(match first()?.to_lowercase().as_str() {
                    "strict" => BoundaryPolicy::Strict,
                    "halfopen" => BoundaryPolicy::HalfOpen,
                    other => return Err(bad_choice(&kw, other, "strict|halfopen", lineno)),
                });
            } else if kw == "axis" {
                if args.len() != 2 {
                    return Err(ResidenceError::Parse(format!(
                        "line {}: 'axis' requires x and y",
                        lineno
                    )));
                }
                cfg.axis = Some([
                    parse_number(args[0], &kw, lineno)?,
                    parse_number(args[1], &kw, lineno)?,
                ]);
            } else if kw == "timegap" {
                cfg.time_gap = Some(match first()?.to_lowercase().as_str() {
                    "split" => TimeGapPolicy::Split,
                    "ignore" => TimeGapPolicy::Ignore,
                    other => return Err(bad_choice(&kw, other, "split|ignore", lineno)),
                });
            } else if kw == "align" {
                cfg.align = Some(match first()?.to_lowercase().as_str() {
                    "on" | "yes" | "true" => true,
                    "off" | "no" | "false" => false,
                    other => return Err(bad_choice(&kw, other, "on|off", lineno)),
                });
            } else {
                warn!("line {}: ignoring unknown keyword '{}'", lineno, tokens[0]);
            }
        }
        Ok(cfg)
    }

    /// Checks required fields and builds the geometry and thresholds
    pub fn validate(self) -> ResidenceResult<AnalysisConfig> {
        if self.trajectories.is_empty() {
            return Err(missing("trajectory file (dcd)"));
        }
        let pdb = self.pdb.ok_or_else(|| missing("structure file (pdb)"))?;
        let reference = non_blank(self.reference).ok_or_else(|| missing("reference selection (ref)"))?;
        let selection = non_blank(self.selection).ok_or_else(|| missing("target selection (sel)"))?;
        let z_min = self.z_min.ok_or_else(|| missing("zmin"))?;
        let z_max = self.z_max.ok_or_else(|| missing("zmax"))?;
        let n_bins = self.n_bins.ok_or_else(|| missing("nbins"))?;
        let radius = self.radius.ok_or_else(|| missing("rad"))?;

        if n_bins <= 0 {
            return Err(ResidenceError::Geometry(format!(
                "bin count must be positive, got {}",
                n_bins
            )));
        }
        let [ax, ay] = self.axis.unwrap_or([0.0, 0.0]);
        let geometry = BinGeometry::new(z_min, z_max, n_bins as usize, radius)?
            .with_axis(ax, ay)
            .with_boundary(self.boundary.unwrap_or_default());

        let values = self
            .thresholds
            .iter()
            .map(|&t| {
                usize::try_from(t).map_err(|_| {
                    ResidenceError::Config(format!("threshold {} is negative", t))
                })
            })
            .collect::<ResidenceResult<Vec<_>>>()?;
        let thresholds = Thresholds::new(&values, self.sub_minimum.unwrap_or_default())?;

        if self.psf.is_some() {
            warn!("psf file is accepted but not used; atom data comes from the pdb");
        }

        Ok(AnalysisConfig {
            trajectories: self.trajectories,
            pdb,
            psf: self.psf,
            reference,
            selection,
            output: self.output.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
            geometry,
            thresholds,
            time_gap: self.time_gap.unwrap_or_default(),
            align: self.align.unwrap_or(true),
        })
    }
}

fn strip_comments(line: &str) -> &str {
    match line.find('#') {
        Some(i) => &line[..i],
        None => line,
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, kw: &str, lineno: usize) -> ResidenceResult<T> {
    value.parse().map_err(|_| {
        ResidenceError::Parse(format!(
            "line {}: invalid value '{}' for '{}'",
            lineno, value, kw
        ))
    })
}

fn bad_choice(kw: &str, value: &str, choices: &str, lineno: usize) -> ResidenceError {
    ResidenceError::Parse(format!(
        "line {}: '{}' must be one of {}, got '{}'",
        lineno, kw, choices, value
    ))
}

fn missing(what: &str) -> ResidenceError {
    ResidenceError::Config(format!("missing {}", what))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
