//! Branch manager: named terminal nodes over the shared graph.
//!
//! The `all` branch is the unfiltered (post-preparation) view; every named
//! branch is a trigger filter appended to it. All branches share upstream
//! ancestors, so a Define evaluated for one branch is reused by every other.

use std::collections::HashMap;

use jc_core::{Error, Result};

use crate::graph::{ColumnGraph, NodeId, Pred};

/// Reserved name of the unfiltered branch.
pub const ALL_BRANCH: &str = "all";

/// Name → terminal-node mapping.
#[derive(Debug, Default)]
pub struct BranchManager {
    branches: Vec<(String, NodeId)>,
    index: HashMap<String, usize>,
}

impl BranchManager {
    /// Create a manager with the `all` branch pointing at `all_node`.
    pub fn new(all_node: NodeId) -> Self {
        let mut mgr = Self::default();
        mgr.branches.push((ALL_BRANCH.to_string(), all_node));
        mgr.index.insert(ALL_BRANCH.to_string(), 0);
        mgr
    }

    /// Add a named branch as `Filter(all, trigger_predicate)`.
    ///
    /// Fails with `GraphFrozen` after the scheduler's first run and with
    /// `NameCollision` on duplicate branch names.
    pub fn add(&mut self, graph: &mut ColumnGraph, name: &str, trigger: Pred) -> Result<NodeId> {
        if self.index.contains_key(name) {
            return Err(Error::NameCollision(format!("branch '{name}'")));
        }
        let all = self.all();
        let node = graph.filter(all, name, trigger)?;
        self.index.insert(name.to_string(), self.branches.len());
        self.branches.push((name.to_string(), node));
        Ok(node)
    }

    /// Terminal node of the `all` branch.
    pub fn all(&self) -> NodeId {
        self.branches[0].1
    }

    /// Terminal node of a named branch.
    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).map(|&i| self.branches[i].1)
    }

    /// Iterate `(name, node)` in insertion order (`all` first).
    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.branches.iter().map(|(n, id)| (n.as_str(), *id))
    }

    /// Number of branches including `all`.
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    /// Always false: the `all` branch exists from construction.
    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::EventDataset;
    use crate::graph::ROOT;

    fn graph() -> (EventDataset, ColumnGraph) {
        let ds = EventDataset::builder()
            .bool("HLT_PFJet500", vec![true, false])
            .bool("HLT_ZeroBias", vec![false, true])
            .build()
            .unwrap();
        let g = ColumnGraph::new(&ds);
        (ds, g)
    }

    #[test]
    fn all_branch_exists_and_triggers_fork() {
        let (_ds, mut g) = graph();
        let mut mgr = BranchManager::new(ROOT);
        assert_eq!(mgr.get(ALL_BRANCH), Some(ROOT));
        let jet = mgr.add(&mut g, "HLT_PFJet500", Pred::formula("HLT_PFJet500")).unwrap();
        assert_eq!(mgr.get("HLT_PFJet500"), Some(jet));
        assert_eq!(mgr.len(), 2);
        let names: Vec<_> = mgr.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["all", "HLT_PFJet500"]);
    }

    #[test]
    fn duplicate_branch_rejected() {
        let (_ds, mut g) = graph();
        let mut mgr = BranchManager::new(ROOT);
        mgr.add(&mut g, "HLT_ZeroBias", Pred::formula("HLT_ZeroBias")).unwrap();
        let err = mgr.add(&mut g, "HLT_ZeroBias", Pred::formula("HLT_ZeroBias")).unwrap_err();
        assert!(matches!(err, Error::NameCollision(_)));
    }

    #[test]
    fn add_after_freeze_rejected() {
        let (_ds, mut g) = graph();
        let mut mgr = BranchManager::new(ROOT);
        g.freeze();
        let err = mgr.add(&mut g, "late", Pred::formula("HLT_ZeroBias")).unwrap_err();
        assert!(matches!(err, Error::GraphFrozen(_)));
    }
}
