//! Pass-through selection: no cascade, sentinel contract columns.
//!
//! Used when only control distributions are wanted; every event survives
//! and the contract carries sentinels so downstream code can still resolve
//! the canonical names.

use jc_columnar::{Analyzer, ColumnValue, Expr, NodeId};
use jc_core::Result;

use crate::strategy::{Channel, JET_COLUMNS, SelectionStrategy};

/// The null selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptySelection;

impl SelectionStrategy for EmptySelection {
    fn channel(&self) -> Channel {
        Channel::Empty
    }

    fn attach(&self, analyzer: &mut Analyzer, node: NodeId) -> Result<NodeId> {
        let mut node = node;
        let defs: [(&str, ColumnValue); 12] = [
            ("Tag_pt", ColumnValue::F64(-1.0)),
            ("Tag_eta", ColumnValue::F64(0.0)),
            ("Tag_phi", ColumnValue::F64(0.0)),
            ("Tag_mass", ColumnValue::F64(0.0)),
            ("Tag_rawPt", ColumnValue::F64(-1.0)),
            ("Tag_label", ColumnValue::I64(Channel::Empty.tag_label())),
            ("Probe_pt", ColumnValue::F64(-1.0)),
            ("Probe_eta", ColumnValue::F64(0.0)),
            ("Probe_phi", ColumnValue::F64(0.0)),
            ("Probe_mass", ColumnValue::F64(0.0)),
            ("Probe_rawPt", ColumnValue::F64(-1.0)),
            ("Activity_idx", ColumnValue::I64(-1)),
        ];
        for (name, value) in defs {
            node = analyzer.define(node, name, Expr::constant(value))?;
        }
        for column in JET_COLUMNS {
            let probe_name = format!("Probe_{}", &column[4..]);
            if !analyzer.is_defined(node, &probe_name) {
                node = analyzer
                    .define(node, &probe_name, Expr::constant(ColumnValue::F64(0.0)))?;
            }
        }
        Ok(node)
    }
}
