//! Traits for the opaque external collaborators.
//!
//! Correction evaluation, golden-lumi filtering, and veto maps are services
//! with their own file formats and lookup machinery; the engine only sees
//! these interfaces. Implementations must be `Send + Sync` since the
//! scheduler evaluates them from worker threads.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Recognized jet-energy correction levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorrectionKind {
    /// Pileup offset correction.
    L1,
    /// Relative (eta-dependent) correction.
    L2Relative,
    /// Absolute residual correction.
    L2L3,
    /// Jet energy resolution smearing.
    Jer,
    /// Resolution scale factor.
    JerSf,
}

/// One correction level: kind plus the opaque payload locator the external
/// evaluator understands (file path or tag).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionLevel {
    /// Which correction this payload provides.
    pub kind: CorrectionKind,
    /// Opaque payload locator.
    pub payload: String,
}

/// A validated set of correction levels.
///
/// Replaces free-form correction dictionaries: the recognized kinds are
/// enumerated, duplicates are rejected, and `JerSf` without `Jer` is
/// rejected at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionSet {
    levels: Vec<CorrectionLevel>,
}

impl CorrectionSet {
    /// Validate and build a correction set.
    pub fn new(levels: Vec<CorrectionLevel>) -> Result<Self> {
        for (i, level) in levels.iter().enumerate() {
            if level.payload.is_empty() {
                return Err(Error::Correction(format!(
                    "empty payload for {:?}",
                    level.kind
                )));
            }
            if levels[..i].iter().any(|l| l.kind == level.kind) {
                return Err(Error::Correction(format!("duplicate level {:?}", level.kind)));
            }
        }
        let has = |k: CorrectionKind| levels.iter().any(|l| l.kind == k);
        if has(CorrectionKind::JerSf) && !has(CorrectionKind::Jer) {
            return Err(Error::Correction("JerSf requires Jer".into()));
        }
        Ok(Self { levels })
    }

    /// The validated levels, in application order.
    pub fn levels(&self) -> &[CorrectionLevel] {
        &self.levels
    }

    /// Whether no levels are configured.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Per-jet inputs to a correction evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionInput {
    /// Uncorrected jet transverse momentum.
    pub pt: f64,
    /// Jet pseudorapidity.
    pub eta: f64,
    /// Jet catchment area.
    pub area: f64,
    /// Median pileup density of the event.
    pub rho: f64,
}

/// External correction service: maps per-jet inputs to a multiplicative
/// factor for the given level.
pub trait CorrectionEvaluator: Send + Sync {
    /// Evaluate one correction level for one jet.
    fn evaluate(&self, kind: CorrectionKind, input: &CorrectionInput) -> Result<f64>;
}

/// External per-(eta, phi) map of detector regions excluded from jet
/// selection.
pub trait VetoMap: Send + Sync {
    /// Whether the given direction falls in a vetoed region.
    fn is_vetoed(&self, eta: f64, phi: f64) -> bool;
}

/// External allow-list of good-quality data-taking periods.
pub trait LumiMask: Send + Sync {
    /// Whether `(run, lumi_block)` is marked good.
    fn is_selected(&self, run: u32, lumi_block: u32) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(kind: CorrectionKind) -> CorrectionLevel {
        CorrectionLevel { kind, payload: "tag".into() }
    }

    #[test]
    fn correction_set_rejects_duplicates() {
        let err = CorrectionSet::new(vec![level(CorrectionKind::L1), level(CorrectionKind::L1)])
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn correction_set_rejects_orphan_jersf() {
        let err = CorrectionSet::new(vec![level(CorrectionKind::JerSf)]).unwrap_err();
        assert!(err.to_string().contains("JerSf requires Jer"));
    }

    #[test]
    fn correction_set_accepts_standard_chain() {
        let set = CorrectionSet::new(vec![
            level(CorrectionKind::L1),
            level(CorrectionKind::L2Relative),
            level(CorrectionKind::L2L3),
        ])
        .unwrap();
        assert_eq!(set.levels().len(), 3);
        assert!(!set.is_empty());
    }

    #[test]
    fn correction_set_rejects_empty_payload() {
        let err = CorrectionSet::new(vec![CorrectionLevel {
            kind: CorrectionKind::L1,
            payload: String::new(),
        }])
        .unwrap_err();
        assert!(err.to_string().contains("empty payload"));
    }
}
