//! Statistical accumulators filled during the batched pass.
//!
//! One accumulator per action per partition; partial accumulators combine
//! through the associative, commutative [`Accumulator::merge`], so totals
//! are independent of partition count and completion order.

use jc_core::{AxisSpec, HistResult, Result};

use crate::action::{ActionKind, ActionSpec};

/// N-dimensional weighted histogram or profile accumulator.
#[derive(Debug, Clone)]
pub struct Accumulator {
    kind: ActionKind,
    edges: Vec<Vec<f64>>,
    dims: Vec<usize>,
    sumw: Vec<f64>,
    sumw2: Vec<f64>,
    /// Profile-only: per-bin weighted sum of the sampled quantity.
    sumwy: Vec<f64>,
    /// Profile-only: per-bin weighted sum of its square.
    sumwy2: Vec<f64>,
    entries: u64,
    underflow: f64,
    overflow: f64,
}

impl Accumulator {
    /// Allocate an empty accumulator for a validated spec.
    pub fn new(spec: &ActionSpec) -> Result<Self> {
        spec.validate()?;
        let edges: Vec<Vec<f64>> = spec.axes.iter().map(|a| a.binning.edges()).collect();
        let dims: Vec<usize> = edges.iter().map(|e| e.len() - 1).collect();
        let n_bins: usize = dims.iter().product();
        let profile = spec.kind.is_profile();
        Ok(Self {
            kind: spec.kind,
            edges,
            dims,
            sumw: vec![0.0; n_bins],
            sumw2: vec![0.0; n_bins],
            sumwy: if profile { vec![0.0; n_bins] } else { Vec::new() },
            sumwy2: if profile { vec![0.0; n_bins] } else { Vec::new() },
            entries: 0,
            underflow: 0.0,
            overflow: 0.0,
        })
    }

    /// Record one fill.
    ///
    /// `coords` holds the binned-axis values; `sample` the profiled quantity
    /// (profiles only). Any coordinate outside its axis range routes the
    /// weight to the under/overflow sums (first out-of-range axis decides,
    /// low side checked first) and leaves all in-range bins untouched.
    pub fn fill(&mut self, coords: &[f64], sample: Option<f64>, weight: f64) {
        debug_assert_eq!(coords.len(), self.dims.len());
        let mut flat = 0usize;
        for (axis, &v) in self.edges.iter().zip(coords) {
            match find_bin(axis, v) {
                Bin::In(b) => flat = flat * (axis.len() - 1) + b,
                Bin::Under => {
                    self.underflow += weight;
                    return;
                }
                Bin::Over => {
                    self.overflow += weight;
                    return;
                }
            }
        }
        self.sumw[flat] += weight;
        self.sumw2[flat] += weight * weight;
        if self.kind.is_profile() {
            let y = sample.expect("profile fill without sampled value");
            self.sumwy[flat] += weight * y;
            self.sumwy2[flat] += weight * y * y;
        }
        self.entries += 1;
    }

    /// Bin-wise merge of a partial accumulator for the same action.
    pub fn merge(&mut self, other: &Accumulator) {
        debug_assert_eq!(self.dims, other.dims);
        for (a, b) in self.sumw.iter_mut().zip(&other.sumw) {
            *a += b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += b;
        }
        for (a, b) in self.sumwy.iter_mut().zip(&other.sumwy) {
            *a += b;
        }
        for (a, b) in self.sumwy2.iter_mut().zip(&other.sumwy2) {
            *a += b;
        }
        self.entries += other.entries;
        self.underflow += other.underflow;
        self.overflow += other.overflow;
    }

    /// Total weight currently in range.
    pub fn in_range_weight(&self) -> f64 {
        self.sumw.iter().sum()
    }

    /// Materialize into the persisted result payload.
    ///
    /// Histograms report the summed weight per bin with `sqrt(sum w^2)`
    /// errors. Profiles report the weighted mean of the sampled quantity
    /// with the error on that mean (spread over the effective entry count);
    /// empty bins report 0 for both.
    pub fn finalize(&self, spec: &ActionSpec) -> HistResult {
        let axes: Vec<AxisSpec> = spec
            .axes
            .iter()
            .zip(&self.edges)
            .map(|(a, e)| AxisSpec { label: a.label.clone(), edges: e.clone() })
            .collect();

        let (contents, errors) = if self.kind.is_profile() {
            let mut mean = vec![0.0; self.sumw.len()];
            let mut err = vec![0.0; self.sumw.len()];
            for i in 0..self.sumw.len() {
                let w = self.sumw[i];
                if w <= 0.0 {
                    continue;
                }
                let m = self.sumwy[i] / w;
                mean[i] = m;
                let var = (self.sumwy2[i] / w - m * m).max(0.0);
                let n_eff = if self.sumw2[i] > 0.0 { w * w / self.sumw2[i] } else { 0.0 };
                if n_eff > 0.0 {
                    err[i] = (var / n_eff).sqrt();
                }
            }
            (mean, err)
        } else {
            let errors = self.sumw2.iter().map(|w2| w2.sqrt()).collect();
            (self.sumw.clone(), errors)
        };

        HistResult {
            name: spec.name.clone(),
            kind: self.kind.result_kind(),
            axes,
            contents,
            errors,
            entries: self.entries,
            underflow: self.underflow,
            overflow: self.overflow,
            bin_labels: None,
        }
    }
}

enum Bin {
    In(usize),
    Under,
    Over,
}

/// Locate `v` within sorted `edges` by binary search.
fn find_bin(edges: &[f64], v: f64) -> Bin {
    if v < edges[0] {
        return Bin::Under;
    }
    if v >= edges[edges.len() - 1] {
        return Bin::Over;
    }
    match edges.binary_search_by(|e| e.partial_cmp(&v).expect("NaN bin edge or value")) {
        Ok(i) => Bin::In(i.min(edges.len() - 2)),
        Err(i) => Bin::In(i - 1),
    }
}

/// Per-branch cutflow counters: events surviving each filter stage.
#[derive(Debug, Clone)]
pub struct CutflowCounts {
    /// Branch name this cutflow belongs to.
    pub branch: String,
    /// Stage labels, starting with the total-input stage.
    pub labels: Vec<String>,
    /// Surviving event counts per stage.
    pub counts: Vec<u64>,
}

impl CutflowCounts {
    /// Empty counters for the given stages.
    pub fn new(branch: &str, labels: Vec<String>) -> Self {
        let counts = vec![0; labels.len()];
        Self { branch: branch.to_string(), labels, counts }
    }

    /// Add another partition's counters.
    pub fn merge(&mut self, other: &CutflowCounts) {
        debug_assert_eq!(self.labels.len(), other.labels.len());
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
    }

    /// Materialize as an auxiliary result (`Cutflow_<branch>`).
    pub fn finalize(&self) -> HistResult {
        let n = self.counts.len();
        HistResult {
            name: format!("Cutflow_{}", self.branch),
            kind: jc_core::ResultKind::Cutflow,
            axes: vec![AxisSpec {
                label: "selection stage".to_string(),
                edges: (0..=n).map(|i| i as f64).collect(),
            }],
            contents: self.counts.iter().map(|&c| c as f64).collect(),
            errors: self.counts.iter().map(|&c| (c as f64).sqrt()).collect(),
            entries: self.counts.first().copied().unwrap_or(0),
            underflow: 0.0,
            overflow: 0.0,
            bin_labels: Some(self.labels.clone()),
        }
    }
}
