//! # jc-columnar
//!
//! Lazy, shared-subgraph columnar computation engine.
//!
//! An [`EventDataset`] is loaded once; a [`graph::ColumnGraph`] of Define
//! and Filter nodes is built over it; branches fork per trigger while
//! sharing every upstream ancestor; lazy actions accumulate in a registry;
//! one batched multi-threaded pass materializes all of them.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use jc_columnar::{
//!     ActionKind, ActionSpec, Analyzer, AxisDef, Binning, EventDataset, Expr, Pred, RunConfig,
//! };
//!
//! let dataset = Arc::new(
//!     EventDataset::builder()
//!         .jagged_f64("Jet_pt", vec![vec![120.0, 80.0], vec![40.0]])
//!         .bool("HLT_PFJet80", vec![true, true])
//!         .f64("weight", vec![1.0, 1.0])
//!         .build()
//!         .unwrap(),
//! );
//! let mut analyzer = Analyzer::new(dataset);
//! let root = analyzer.root();
//! let prepared = analyzer.define(root, "nJet", Expr::length("Jet_pt")).unwrap();
//! analyzer
//!     .init_branches(prepared, vec![("HLT_PFJet80".into(), Pred::formula("HLT_PFJet80"))])
//!     .unwrap();
//! let h = analyzer
//!     .register(
//!         "HLT_PFJet80",
//!         ActionSpec::new(
//!             "Inclusive_JetPt",
//!             ActionKind::Hist1D,
//!             &["Jet_pt"],
//!             vec![AxisDef::new("p_T (GeV)", Binning::Uniform { n: 20, min: 0.0, max: 200.0 })],
//!         ),
//!     )
//!     .unwrap();
//! analyzer.run(&RunConfig::default()).unwrap();
//! assert_eq!(analyzer.result(h).unwrap().entries, 3);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accum;
pub mod action;
pub mod analyzer;
pub mod branch;
pub mod column;
pub mod dataset;
pub mod formula;
pub mod graph;
pub mod registry;
pub mod scheduler;

pub use accum::{Accumulator, CutflowCounts};
pub use action::{ActionHandle, ActionKind, ActionSpec, AxisDef, Binning};
pub use analyzer::{Analyzer, RegisteredAction, run_graphs};
pub use branch::{ALL_BRANCH, BranchManager};
pub use column::{ColumnData, ColumnType, ColumnValue, Jagged};
pub use dataset::{DatasetBuilder, DatasetReader, EventDataset, InMemoryReader};
pub use formula::{BulkInput, Formula};
pub use graph::{ColumnGraph, DepRef, ElementIndex, EventCursor, Expr, NodeId, Pred, ROOT};
pub use registry::{EventCtx, FnRegistry, NativeFn};
pub use scheduler::{RunConfig, RunOutput};
