//! Lazy histogram/profile actions and their binning.

use jc_core::{Error, Result, ResultKind};

/// Reduction kind of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// 1D weighted histogram.
    Hist1D,
    /// 2D weighted histogram.
    Hist2D,
    /// 3D weighted histogram.
    Hist3D,
    /// 1D profile: first input binned, second sampled.
    Profile1D,
    /// 2D profile.
    Profile2D,
    /// 3D profile.
    Profile3D,
}

impl ActionKind {
    /// Number of binned axes.
    pub fn n_axes(self) -> usize {
        match self {
            ActionKind::Hist1D | ActionKind::Profile1D => 1,
            ActionKind::Hist2D | ActionKind::Profile2D => 2,
            ActionKind::Hist3D | ActionKind::Profile3D => 3,
        }
    }

    /// Whether the last input is the profiled (sampled) quantity.
    pub fn is_profile(self) -> bool {
        matches!(self, ActionKind::Profile1D | ActionKind::Profile2D | ActionKind::Profile3D)
    }

    /// Number of input columns (binned axes plus the sampled quantity for
    /// profiles).
    pub fn n_inputs(self) -> usize {
        self.n_axes() + usize::from(self.is_profile())
    }

    /// The result kind this action materializes into.
    pub fn result_kind(self) -> ResultKind {
        match self {
            ActionKind::Hist1D => ResultKind::Hist1D,
            ActionKind::Hist2D => ResultKind::Hist2D,
            ActionKind::Hist3D => ResultKind::Hist3D,
            ActionKind::Profile1D => ResultKind::Profile1D,
            ActionKind::Profile2D => ResultKind::Profile2D,
            ActionKind::Profile3D => ResultKind::Profile3D,
        }
    }
}

/// Per-axis binning: explicit edges or a uniform grid.
#[derive(Debug, Clone, PartialEq)]
pub enum Binning {
    /// Explicit sorted edges, length `n_bins + 1`.
    Edges(Vec<f64>),
    /// `n` equal-width bins over `[min, max)`.
    Uniform {
        /// Number of bins.
        n: usize,
        /// Lower edge.
        min: f64,
        /// Upper edge.
        max: f64,
    },
}

impl Binning {
    /// Materialize the edge array.
    pub fn edges(&self) -> Vec<f64> {
        match self {
            Binning::Edges(e) => e.clone(),
            Binning::Uniform { n, min, max } => {
                let width = (max - min) / *n as f64;
                (0..=*n).map(|i| min + width * i as f64).collect()
            }
        }
    }

    /// Validate edge count and ordering.
    pub fn validate(&self) -> Result<()> {
        match self {
            Binning::Edges(e) => {
                if e.len() < 2 {
                    return Err(Error::TypeMismatch(
                        "binning needs at least two edges".to_string(),
                    ));
                }
                if e.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(Error::TypeMismatch(
                        "bin edges must be strictly increasing".to_string(),
                    ));
                }
            }
            Binning::Uniform { n, min, max } => {
                if *n == 0 || min >= max {
                    return Err(Error::TypeMismatch(format!(
                        "invalid uniform binning (n={n}, min={min}, max={max})"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One binned axis of an action.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisDef {
    /// Axis label.
    pub label: String,
    /// Binning.
    pub binning: Binning,
}

impl AxisDef {
    /// Build an axis.
    pub fn new(label: &str, binning: Binning) -> Self {
        Self { label: label.to_string(), binning }
    }
}

/// Specification of one lazy action, bound to a branch at registration.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpec {
    /// Result name; the method prefix (first `_` token) drives namespace
    /// placement.
    pub name: String,
    /// Reduction kind.
    pub kind: ActionKind,
    /// Input column names, ordered; for profiles the last is the sampled
    /// quantity.
    pub inputs: Vec<String>,
    /// Per-event weight column.
    pub weight: String,
    /// Binned axes, one per `kind.n_axes()`.
    pub axes: Vec<AxisDef>,
}

impl ActionSpec {
    /// Build a spec with the default `weight` column.
    pub fn new(name: &str, kind: ActionKind, inputs: &[&str], axes: Vec<AxisDef>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            weight: "weight".to_string(),
            axes,
        }
    }

    /// Override the weight column.
    pub fn with_weight(mut self, weight: &str) -> Self {
        self.weight = weight.to_string();
        self
    }

    /// Check input/axis arity and binning validity.
    pub fn validate(&self) -> Result<()> {
        if self.inputs.len() != self.kind.n_inputs() {
            return Err(Error::TypeMismatch(format!(
                "action '{}' needs {} inputs, got {}",
                self.name,
                self.kind.n_inputs(),
                self.inputs.len()
            )));
        }
        if self.axes.len() != self.kind.n_axes() {
            return Err(Error::TypeMismatch(format!(
                "action '{}' needs {} axes, got {}",
                self.name,
                self.kind.n_axes(),
                self.axes.len()
            )));
        }
        for axis in &self.axes {
            axis.binning.validate()?;
        }
        Ok(())
    }
}

/// Handle returned at registration; dereferencable only after `run()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionHandle(pub(crate) usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_edges() {
        let b = Binning::Uniform { n: 4, min: 0.0, max: 2.0 };
        assert_eq!(b.edges(), vec![0.0, 0.5, 1.0, 1.5, 2.0]);
        b.validate().unwrap();
    }

    #[test]
    fn invalid_binnings_rejected() {
        assert!(Binning::Edges(vec![1.0]).validate().is_err());
        assert!(Binning::Edges(vec![0.0, 0.0, 1.0]).validate().is_err());
        assert!(Binning::Uniform { n: 0, min: 0.0, max: 1.0 }.validate().is_err());
        assert!(Binning::Uniform { n: 10, min: 1.0, max: 1.0 }.validate().is_err());
    }

    #[test]
    fn arity_checks() {
        let axes = vec![AxisDef::new("x", Binning::Uniform { n: 10, min: 0.0, max: 1.0 })];
        let ok = ActionSpec::new("h", ActionKind::Hist1D, &["x"], axes.clone());
        ok.validate().unwrap();
        let wrong_inputs = ActionSpec::new("h", ActionKind::Hist1D, &["x", "y"], axes.clone());
        assert!(wrong_inputs.validate().is_err());
        // Profile1D takes a binned input plus a sampled one.
        let prof = ActionSpec::new("p", ActionKind::Profile1D, &["x", "y"], axes);
        prof.validate().unwrap();
    }
}
