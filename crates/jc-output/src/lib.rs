//! # jc-output
//!
//! Result aggregation and persistence: the four-level
//! Trigger → Channel → Method → Name namespace and its JSON container.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod tree;
pub mod writer;

pub use tree::ResultTree;
pub use writer::{JsonWriter, ResultWriter, output_file_name, read_result_tree};
