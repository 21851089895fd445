//! Atom selection language.
//!
//! VMD/ProDy-style expressions evaluated against a [`Topology`]:
//! - `name OH2`            atom name
//! - `resname TIP3 SOL`    residue name (several values allowed)
//! - `resid 1-10`          residue numbers, also `1 to 10` and `1:10`
//! - `index 0 5-9`         0-based atom index
//! - `serial 1-3`          PDB serial number
//! - `chain A`, `segid WT1` (alias `segname`), `element O`
//! - `water`, `protein`, `backbone`, `all`, `none`
//!
//! Combinators: `and`, `or`, `not`, parentheses.
//!
//! Selections only look at static attributes. The cylinder bounds of the
//! analysis are applied per frame by the snapshot extractor.

use crate::error::{ResidenceError, ResidenceResult};
use crate::topology::{Atom, Topology};
use crate::trajectory::Frame;
use glam::Vec3;

#[derive(Debug, Clone)]
enum Selector {
    All,
    Nothing,
    Name(Vec<String>),
    ResName(Vec<String>),
    ResId(Vec<IntRange>),
    Index(Vec<IntRange>),
    Serial(Vec<IntRange>),
    Chain(Vec<char>),
    SegId(Vec<String>),
    Element(Vec<String>),
    Water,
    Protein,
    Backbone,
    Not(Box<Selector>),
    And(Box<Selector>, Box<Selector>),
    Or(Box<Selector>, Box<Selector>),
}

#[derive(Debug, Clone, Copy)]
struct IntRange {
    start: i64,
    end: i64,
}

impl IntRange {
    fn contains(&self, v: i64) -> bool {
        v >= self.start && v <= self.end
    }
}

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "(", ")", "all", "none", "name", "resname", "resid", "index", "serial",
    "chain", "segid", "segname", "element", "water", "protein", "backbone",
];
const WATER_NAMES: &[&str] = &[
    "HOH", "WAT", "SOL", "H2O", "TIP3", "TIP4", "TIP5", "TIP3P", "SPC", "T3P", "T4P",
];
const BACKBONE_NAMES: &[&str] = &["N", "CA", "C", "O", "OXT"];
const STANDARD_AA: &[&str] = &[
    "GLY", "ALA", "SER", "CYS", "VAL", "ILE", "LEU", "THR", "ARG", "LYS", "ASP", "GLU", "ASN",
    "GLN", "MET", "HIS", "HSD", "HSE", "HSP", "PRO", "PHE", "TYR", "TRP",
];

impl Selector {
    fn matches(&self, index: usize, a: &Atom) -> bool {
        let any_of = |names: &[String], v: &str| names.iter().any(|n| n.eq_ignore_ascii_case(v));
        match self {
            Self::All => true,
            Self::Nothing => false,
            Self::Name(names) => any_of(names, &a.name),
            Self::ResName(names) => any_of(names, &a.resname),
            Self::ResId(ranges) => ranges.iter().any(|r| r.contains(a.resid as i64)),
            Self::Index(ranges) => ranges.iter().any(|r| r.contains(index as i64)),
            Self::Serial(ranges) => ranges.iter().any(|r| r.contains(a.serial as i64)),
            Self::Chain(ids) => ids.contains(&a.chain),
            Self::SegId(ids) => any_of(ids, &a.segid),
            Self::Element(elems) => any_of(elems, &a.element),
            Self::Water => WATER_NAMES
                .iter()
                .any(|w| w.eq_ignore_ascii_case(&a.resname)),
            Self::Protein => STANDARD_AA
                .iter()
                .any(|s| s.eq_ignore_ascii_case(&a.resname)),
            Self::Backbone => {
                Self::Protein.matches(index, a) && BACKBONE_NAMES.contains(&a.name.as_str())
            }
            Self::Not(inner) => !inner.matches(index, a),
            Self::And(l, r) => l.matches(index, a) && r.matches(index, a),
            Self::Or(l, r) => l.matches(index, a) || r.matches(index, a),
        }
    }
}

/// Compiled selection: sorted, duplicate-free atom indices
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    expression: String,
    indices: Vec<usize>,
}

impl Selection {
    /// Parses `expr` and evaluates it against every atom of `topology`
    pub fn parse(expr: &str, topology: &Topology) -> ResidenceResult<Self> {
        let tokens = tokenize(expr);
        if tokens.is_empty() {
            return Err(ResidenceError::Parse("empty selection".to_string()));
        }
        let mut parser = Parser::new(tokens);
        let selector = parser.parse_expr()?;
        if let Some(t) = parser.peek() {
            return Err(ResidenceError::Parse(format!(
                "unexpected token '{}' in selection '{}'",
                t, expr
            )));
        }
        let indices = topology
            .atoms
            .iter()
            .enumerate()
            .filter(|(i, a)| selector.matches(*i, a))
            .map(|(i, _)| i)
            .collect();
        Ok(Self {
            expression: expr.trim().to_string(),
            indices,
        })
    }

    /// Selection of explicit atom indices (sorted and deduplicated)
    pub fn from_indices(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        let expression = format!("{} explicit atoms", indices.len());
        Self {
            expression,
            indices,
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Geometric center of the selected atoms in `frame`
    pub fn center_in(&self, frame: &Frame) -> ResidenceResult<Vec3> {
        let coords = frame
            .coordinates_of(&self.indices)
            .map_err(|e| ResidenceError::Selection(e.to_string()))?;
        if coords.is_empty() {
            return Err(ResidenceError::Selection(format!(
                "selection '{}' is empty",
                self.expression
            )));
        }
        let sum: Vec3 = coords.iter().copied().sum();
        Ok(sum / coords.len() as f32)
    }
}

// ── Parser ──────────────────────────────────────────────────────────────────

fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    for ch in input.chars() {
        if ch.is_whitespace() || ch == '(' || ch == ')' {
            if !word.is_empty() {
                tokens.push(std::mem::take(&mut word));
            }
            if !ch.is_whitespace() {
                tokens.push(ch.to_string());
            }
        } else {
            word.push(ch);
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

fn is_keyword(token: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(token))
}

struct Parser {
    tokens: Vec<String>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<String>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(|s| s.as_str())
    }

    fn peek_is(&self, keyword: &str) -> bool {
        self.peek()
            .map(|t| t.eq_ignore_ascii_case(keyword))
            .unwrap_or(false)
    }

    fn next(&mut self) -> Option<String> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_expr(&mut self) -> ResidenceResult<Selector> {
        let mut left = self.parse_and()?;
        while self.peek_is("or") {
            self.next();
            let right = self.parse_and()?;
            left = Selector::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ResidenceResult<Selector> {
        let mut left = self.parse_not()?;
        while self.peek_is("and") {
            self.next();
            let right = self.parse_not()?;
            left = Selector::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ResidenceResult<Selector> {
        if self.peek_is("not") {
            self.next();
            let inner = self.parse_not()?;
            Ok(Selector::Not(Box::new(inner)))
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> ResidenceResult<Selector> {
        let tok = self
            .next()
            .ok_or_else(|| ResidenceError::Parse("unexpected end of selection".to_string()))?
            .to_lowercase();

        match tok.as_str() {
            "(" => {
                let inner = self.parse_expr()?;
                match self.next() {
                    Some(ref t) if t == ")" => Ok(inner),
                    _ => Err(ResidenceError::Parse("expected ')'".to_string())),
                }
            }
            "all" => Ok(Selector::All),
            "none" => Ok(Selector::Nothing),
            "water" => Ok(Selector::Water),
            "protein" => Ok(Selector::Protein),
            "backbone" => Ok(Selector::Backbone),
            "name" => Ok(Selector::Name(self.parse_values()?)),
            "resname" => Ok(Selector::ResName(self.parse_values()?)),
            "segid" | "segname" => Ok(Selector::SegId(self.parse_values()?)),
            "element" => Ok(Selector::Element(self.parse_values()?)),
            "chain" => {
                let ids = self
                    .parse_values()?
                    .iter()
                    .filter_map(|v| v.chars().next())
                    .collect();
                Ok(Selector::Chain(ids))
            }
            "resid" => Ok(Selector::ResId(self.parse_ranges()?)),
            "index" => Ok(Selector::Index(self.parse_ranges()?)),
            "serial" => Ok(Selector::Serial(self.parse_ranges()?)),
            _ => Err(ResidenceError::Parse(format!(
                "unexpected token '{}' in selection",
                tok
            ))),
        }
    }

    /// Consumes one or more non-keyword values (`name OH2 OW`)
    fn parse_values(&mut self) -> ResidenceResult<Vec<String>> {
        let mut vals = Vec::new();
        while let Some(t) = self.peek() {
            if is_keyword(t) {
                break;
            }
            if let Some(v) = self.next() {
                vals.push(v);
            }
        }
        if vals.is_empty() {
            return Err(ResidenceError::Parse(
                "expected value after keyword".to_string(),
            ));
        }
        Ok(vals)
    }

    /// Numbers and ranges: `3`, `1-10`, `1:10`, `1 to 10`
    fn parse_ranges(&mut self) -> ResidenceResult<Vec<IntRange>> {
        let values = {
            let mut vals = Vec::new();
            while let Some(t) = self.peek() {
                if is_keyword(t) {
                    break;
                }
                if let Some(v) = self.next() {
                    vals.push(v);
                }
            }
            vals
        };
        if values.is_empty() {
            return Err(ResidenceError::Parse(
                "expected number after keyword".to_string(),
            ));
        }

        let mut ranges = Vec::new();
        let mut i = 0;
        while i < values.len() {
            let v = &values[i];
            if values.get(i + 1).map(|t| t.eq_ignore_ascii_case("to")) == Some(true) {
                let end = values.get(i + 2).ok_or_else(|| {
                    ResidenceError::Parse(format!("range '{} to' has no end", v))
                })?;
                ranges.push(IntRange {
                    start: parse_int(v)?,
                    end: parse_int(end)?,
                });
                i += 3;
                continue;
            }
            let split = v
                .char_indices()
                .skip(1)
                .find(|&(_, c)| c == '-' || c == ':')
                .map(|(pos, _)| pos);
            let range = match split {
                Some(pos) => IntRange {
                    start: parse_int(&v[..pos])?,
                    end: parse_int(&v[pos + 1..])?,
                },
                None => {
                    let n = parse_int(v)?;
                    IntRange { start: n, end: n }
                }
            };
            ranges.push(range);
            i += 1;
        }
        Ok(ranges)
    }
}

fn parse_int(s: &str) -> ResidenceResult<i64> {
    s.parse()
        .map_err(|_| ResidenceError::Parse(format!("invalid number '{}' in selection", s)))
}
