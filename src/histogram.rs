//! # Residence-time histogram
//!
//! Closed runs are counted per bin in duration buckets delimited by the
//! configured thresholds `t1 < t2 < ... < tk` (in frames):
//! `(0, t1)`, `[t1, t2)`, ..., `[tk, inf)`.
//!
//! Runs shorter than `t1` either get their own sub-minimum bucket or are
//! left out of the buckets and only tallied, depending on
//! [`SubMinimumPolicy`].

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{ResidenceError, ResidenceResult};
use crate::tracker::{ResidencyRun, RunSink};

/// What to do with runs shorter than the first threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubMinimumPolicy {
    /// Count them in a leading `(0, t1)` bucket
    #[default]
    Report,
    /// Leave them out of the buckets, only tally them per bin
    Discard,
}

/// One duration interval, lower bound inclusive, upper exclusive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub label: String,
    pub lower: usize,
    /// `None` for the last, unbounded bucket
    pub upper: Option<usize>,
}

/// Validated threshold list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thresholds {
    bounds: Vec<usize>,
    policy: SubMinimumPolicy,
}

impl Thresholds {
    /// Builds the buckets from a threshold list
    ///
    /// An empty list, or a list made of a single `0`, gives one unbounded
    /// bucket. Otherwise values must be positive and strictly ascending.
    pub fn new(values: &[usize], policy: SubMinimumPolicy) -> ResidenceResult<Self> {
        if values.is_empty() || values == [0] {
            return Ok(Self::unbounded());
        }
        if values.contains(&0) {
            return Err(ResidenceError::Config(
                "thresholds must be positive frame counts (a single 0 disables bucketing)"
                    .to_string(),
            ));
        }
        if values.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ResidenceError::Config(format!(
                "thresholds must be strictly ascending, got {:?}",
                values
            )));
        }
        Ok(Self {
            bounds: values.to_vec(),
            policy,
        })
    }

    /// A single bucket holding every run
    pub fn unbounded() -> Self {
        Self {
            bounds: Vec::new(),
            policy: SubMinimumPolicy::Report,
        }
    }

    pub fn bounds(&self) -> &[usize] {
        &self.bounds
    }

    pub fn policy(&self) -> SubMinimumPolicy {
        self.policy
    }

    fn has_sub_minimum_bucket(&self) -> bool {
        !self.bounds.is_empty() && self.policy == SubMinimumPolicy::Report
    }

    pub fn n_buckets(&self) -> usize {
        if self.bounds.is_empty() {
            1
        } else if self.has_sub_minimum_bucket() {
            self.bounds.len() + 1
        } else {
            self.bounds.len()
        }
    }

    /// Bucket of a run of `length` frames, `None` if it is discarded
    pub fn bucket_of(&self, length: usize) -> Option<usize> {
        if self.bounds.is_empty() {
            return Some(0);
        }
        // Number of thresholds at or below the length
        let reached = self.bounds.partition_point(|&t| t <= length);
        match (reached, self.has_sub_minimum_bucket()) {
            (0, true) => Some(0),
            (0, false) => None,
            (k, true) => Some(k),
            (k, false) => Some(k - 1),
        }
    }

    pub fn buckets(&self) -> Vec<Bucket> {
        if self.bounds.is_empty() {
            return vec![Bucket {
                label: "[1,inf)".to_string(),
                lower: 1,
                upper: None,
            }];
        }
        let mut buckets = Vec::with_capacity(self.n_buckets());
        if self.has_sub_minimum_bucket() {
            buckets.push(Bucket {
                label: format!("(0,{})", self.bounds[0]),
                lower: 1,
                upper: Some(self.bounds[0]),
            });
        }
        for (i, &lower) in self.bounds.iter().enumerate() {
            let upper = self.bounds.get(i + 1).copied();
            let label = match upper {
                Some(u) => format!("[{},{})", lower, u),
                None => format!("[{},inf)", lower),
            };
            buckets.push(Bucket {
                label,
                lower,
                upper,
            });
        }
        buckets
    }
}

/// Run counts per bin and bucket, accumulated over a whole trajectory
#[derive(Debug, Clone)]
pub struct ResidenceHistogram {
    thresholds: Thresholds,
    counts: Vec<Vec<u64>>,
    discarded: Vec<u64>,
}

impl ResidenceHistogram {
    pub fn new(n_bins: usize, thresholds: Thresholds) -> Self {
        let n_buckets = thresholds.n_buckets();
        Self {
            thresholds,
            counts: vec![vec![0; n_buckets]; n_bins],
            discarded: vec![0; n_bins],
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Counts one run of `length` frames spent in `bin`
    pub fn record(&mut self, bin: usize, length: usize) {
        if length == 0 {
            warn!("ignoring zero-length run in bin {}", bin);
            return;
        }
        let bucket = self.thresholds.bucket_of(length);
        match (self.counts.get_mut(bin), bucket) {
            (Some(row), Some(b)) => row[b] += 1,
            (Some(_), None) => self.discarded[bin] += 1,
            (None, _) => warn!(
                "ignoring run in bin {} (histogram has {} bins)",
                bin,
                self.counts.len()
            ),
        }
    }

    /// Count of runs in `bin` that fell into `bucket`
    pub fn count(&self, bin: usize, bucket: usize) -> u64 {
        self.counts
            .get(bin)
            .and_then(|row| row.get(bucket))
            .copied()
            .unwrap_or(0)
    }

    pub fn report(&self) -> HistogramReport {
        HistogramReport {
            buckets: self.thresholds.buckets(),
            sub_minimum: self.thresholds.policy(),
            counts: self.counts.clone(),
            discarded: self.discarded.clone(),
        }
    }
}

impl RunSink for ResidenceHistogram {
    fn record_run(&mut self, run: &ResidencyRun) {
        self.record(run.bin, run.length);
    }
}

/// Final histogram: `counts[bin][bucket]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistogramReport {
    pub buckets: Vec<Bucket>,
    pub sub_minimum: SubMinimumPolicy,
    pub counts: Vec<Vec<u64>>,
    /// Sub-minimum runs left out of the buckets, per bin
    pub discarded: Vec<u64>,
}

impl HistogramReport {
    /// Count for a bin and a bucket label such as `"[5,100)"`
    pub fn count(&self, bin: usize, label: &str) -> Option<u64> {
        let bucket = self.buckets.iter().position(|b| b.label == label)?;
        self.counts.get(bin).map(|row| row[bucket])
    }

    /// Every (bin, bucket label, count) triple, bins first
    pub fn entries(&self) -> impl Iterator<Item = (usize, &str, u64)> + '_ {
        self.counts.iter().enumerate().flat_map(move |(bin, row)| {
            row.iter()
                .zip(&self.buckets)
                .map(move |(&count, bucket)| (bin, bucket.label.as_str(), count))
        })
    }

    /// Runs counted in the buckets
    pub fn total_runs(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    /// Whether sub-minimum runs were tallied apart from the buckets
    pub fn discards_sub_minimum(&self) -> bool {
        self.sub_minimum == SubMinimumPolicy::Discard
    }

    pub fn total_discarded(&self) -> u64 {
        self.discarded.iter().sum()
    }

    /// Runs counted per bucket over all bins
    pub fn bucket_totals(&self) -> Vec<u64> {
        let mut totals = vec![0; self.buckets.len()];
        for row in &self.counts {
            for (t, c) in totals.iter_mut().zip(row) {
                *t += c;
            }
        }
        totals
    }
}
