//! Finalized histogram payload handed from the scheduler to the aggregator.

use serde::{Deserialize, Serialize};

/// The reduction kind a result was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultKind {
    /// 1D weighted histogram.
    Hist1D,
    /// 2D weighted histogram.
    Hist2D,
    /// 3D weighted histogram.
    Hist3D,
    /// 1D profile (binned mean of a sampled quantity).
    Profile1D,
    /// 2D profile.
    Profile2D,
    /// 3D profile.
    Profile3D,
    /// Per-branch filter cutflow diagnostic.
    Cutflow,
}

impl ResultKind {
    /// Number of binned axes for this kind.
    pub fn n_axes(self) -> usize {
        match self {
            ResultKind::Hist1D | ResultKind::Profile1D | ResultKind::Cutflow => 1,
            ResultKind::Hist2D | ResultKind::Profile2D => 2,
            ResultKind::Hist3D | ResultKind::Profile3D => 3,
        }
    }

    /// Whether this kind samples an extra (unbinned) input as the profiled
    /// quantity.
    pub fn is_profile(self) -> bool {
        matches!(self, ResultKind::Profile1D | ResultKind::Profile2D | ResultKind::Profile3D)
    }
}

/// One binned axis: label plus explicit sorted bin edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec {
    /// Axis label (e.g. `"|eta|"`, `"p_T (GeV)"`).
    pub label: String,
    /// Bin edges, length `n_bins + 1`.
    pub edges: Vec<f64>,
}

impl AxisSpec {
    /// Number of bins on this axis.
    pub fn n_bins(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }
}

/// A materialized accumulator: bin contents and errors over an N-dim grid.
///
/// Bins are stored flattened in row-major order (first axis slowest). For
/// profiles, `contents` holds the per-bin weighted mean and `errors` the
/// error on that mean; for histograms, `contents` is the sum of weights and
/// `errors` the square root of the summed squared weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistResult {
    /// Result name (method-prefixed, e.g. `"DB_dijet_Response"`).
    pub name: String,
    /// Reduction kind.
    pub kind: ResultKind,
    /// Binned axes.
    pub axes: Vec<AxisSpec>,
    /// Flattened bin values.
    pub contents: Vec<f64>,
    /// Flattened per-bin errors.
    pub errors: Vec<f64>,
    /// Entries that landed in range.
    pub entries: u64,
    /// Summed weight of fills below range on any axis.
    pub underflow: f64,
    /// Summed weight of fills above range.
    pub overflow: f64,
    /// Optional per-bin labels (cutflow stages).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin_labels: Option<Vec<String>>,
}

impl HistResult {
    /// Total number of (in-range) bins.
    pub fn n_bins(&self) -> usize {
        self.axes.iter().map(AxisSpec::n_bins).product()
    }

    /// Flattened index for per-axis bin indices, or `None` out of range.
    pub fn flat_index(&self, indices: &[usize]) -> Option<usize> {
        if indices.len() != self.axes.len() {
            return None;
        }
        let mut flat = 0usize;
        for (axis, &i) in self.axes.iter().zip(indices) {
            if i >= axis.n_bins() {
                return None;
            }
            flat = flat * axis.n_bins() + i;
        }
        Some(flat)
    }

    /// Bin content at per-axis indices, or `None` out of range.
    pub fn value_at(&self, indices: &[usize]) -> Option<f64> {
        self.flat_index(indices).map(|i| self.contents[i])
    }
}
