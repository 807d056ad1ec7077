//! # jc-core
//!
//! Foundation crate for jetcal: the error taxonomy shared by every stage of
//! the calibration pipeline, the small kinematic vector types the response
//! estimators are built from, the finalized histogram payload, and the
//! traits behind which external correction services hide.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use result::{AxisSpec, HistResult, ResultKind};
pub use traits::{
    CorrectionEvaluator, CorrectionInput, CorrectionKind, CorrectionLevel, CorrectionSet,
    LumiMask, VetoMap,
};
pub use types::{FourVec, PolarVec2, delta_phi, delta_r};
