//! # jc-select
//!
//! Channel selection strategies and derived physics quantities for jetcal.
//!
//! Each physics channel (dijet, multijet, photon-jet, Z→ee, Z→μμ) plugs
//! into the engine through [`SelectionStrategy`], extending a branch's node
//! chain with its kinematic cascade and emitting the canonical
//! Tag/Probe/Activity contract. [`response::define_responses`] then derives
//! the balance and projection estimators, and [`actions`] generates the
//! per-channel histogram sets from declarative tables.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod actions;
pub mod dijet;
pub mod empty;
pub mod multijet;
pub mod photonjet;
pub mod prepare;
pub mod response;
pub mod strategy;
pub mod zboson;

pub use actions::{BinTable, ResponseMethod, register_inclusive, register_pf_composition, register_responses};
pub use dijet::{DijetConfig, DijetSelection};
pub use empty::EmptySelection;
pub use multijet::{MultijetConfig, MultijetSelection};
pub use photonjet::{PhotonJetConfig, PhotonJetSelection};
pub use prepare::{PrepareConfig, prepare};
pub use response::define_responses;
pub use strategy::{Channel, JET_COLUMNS, SelectionStrategy, apply};
pub use zboson::{ZBosonConfig, ZeeSelection, ZmmSelection};
