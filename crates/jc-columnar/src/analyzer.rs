//! The programmatic construction API: dataset + graph + branches + actions
//! + run state in one place.
//!
//! Construction order mirrors the batch job: build the dataset, chain
//! preparation Defines/Filters from the root, initialize branches from the
//! prepared node, attach per-channel selections, register actions, then
//! `run()` exactly once.

use std::sync::Arc;

use jc_core::{Error, HistResult, Result};

use crate::action::{ActionHandle, ActionSpec};
use crate::branch::BranchManager;
use crate::dataset::EventDataset;
use crate::graph::{ColumnGraph, DepRef, Expr, NodeId, Pred, ROOT};
use crate::scheduler::{self, RunConfig, RunOutput};

/// An action bound to its branch with inputs resolved at registration.
pub struct RegisteredAction {
    /// The validated spec.
    pub spec: ActionSpec,
    /// Owning branch name (namespace placement).
    pub branch: String,
    /// Node whose surviving events feed the action.
    pub node: NodeId,
    pub(crate) inputs: Vec<DepRef>,
    pub(crate) weight: DepRef,
}

/// One analysis over one event table.
pub struct Analyzer {
    dataset: Arc<EventDataset>,
    graph: ColumnGraph,
    branches: Option<BranchManager>,
    actions: Vec<RegisteredAction>,
    output: Option<RunOutput>,
}

impl Analyzer {
    /// Create an analyzer over a loaded dataset.
    pub fn new(dataset: Arc<EventDataset>) -> Self {
        let graph = ColumnGraph::new(&dataset);
        Self { dataset, graph, branches: None, actions: Vec::new(), output: None }
    }

    /// The underlying event table.
    pub fn dataset(&self) -> &EventDataset {
        &self.dataset
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        ROOT
    }

    /// Append a Define node.
    pub fn define(&mut self, parent: NodeId, name: &str, expr: Expr) -> Result<NodeId> {
        self.graph.define(parent, name, expr)
    }

    /// Append a Define node shadowing an existing name.
    pub fn redefine(&mut self, parent: NodeId, name: &str, expr: Expr) -> Result<NodeId> {
        self.graph.redefine(parent, name, expr)
    }

    /// Append a Filter node.
    pub fn filter(&mut self, parent: NodeId, label: &str, pred: Pred) -> Result<NodeId> {
        self.graph.filter(parent, label, pred)
    }

    /// Whether `name` resolves at `node`.
    pub fn is_defined(&self, node: NodeId, name: &str) -> bool {
        self.graph.is_defined(node, name)
    }

    /// Read-only view of the graph.
    pub fn graph(&self) -> &ColumnGraph {
        &self.graph
    }

    /// Initialize the branch set: `all` at the prepared node plus one
    /// trigger branch per `(name, predicate)` pair.
    pub fn init_branches(
        &mut self,
        all_node: NodeId,
        triggers: Vec<(String, Pred)>,
    ) -> Result<()> {
        if self.branches.is_some() {
            return Err(Error::NameCollision("branch 'all'".to_string()));
        }
        let mut mgr = BranchManager::new(all_node);
        for (name, pred) in triggers {
            mgr.add(&mut self.graph, &name, pred)?;
        }
        self.branches = Some(mgr);
        Ok(())
    }

    /// Add one trigger branch after `init_branches`.
    pub fn add_branch(&mut self, name: &str, trigger: Pred) -> Result<NodeId> {
        let mgr = self
            .branches
            .as_mut()
            .ok_or_else(|| Error::MissingColumn("branch 'all' (call init_branches)".into()))?;
        mgr.add(&mut self.graph, name, trigger)
    }

    /// Terminal node of a branch.
    pub fn branch(&self, name: &str) -> Option<NodeId> {
        self.branches.as_ref()?.get(name)
    }

    /// Iterate `(name, node)` over branches, `all` first.
    pub fn branch_names(&self) -> Vec<String> {
        match &self.branches {
            Some(mgr) => mgr.iter().map(|(n, _)| n.to_string()).collect(),
            None => Vec::new(),
        }
    }

    /// Register an action at the branch's terminal node.
    pub fn register(&mut self, branch: &str, spec: ActionSpec) -> Result<ActionHandle> {
        let node = self
            .branch(branch)
            .ok_or_else(|| Error::MissingColumn(format!("branch '{branch}'")))?;
        self.register_at(branch, node, spec)
    }

    /// Register an action at a node downstream of the named branch (e.g. the
    /// terminal node of a channel selection chain).
    pub fn register_at(
        &mut self,
        branch: &str,
        node: NodeId,
        spec: ActionSpec,
    ) -> Result<ActionHandle> {
        if self.graph.is_frozen() {
            return Err(Error::GraphFrozen(format!("register '{}'", spec.name)));
        }
        if self.branch(branch).is_none() {
            return Err(Error::MissingColumn(format!("branch '{branch}'")));
        }
        spec.validate()?;
        let mut inputs = Vec::with_capacity(spec.inputs.len());
        for input in &spec.inputs {
            let (dep, _) = self.graph.resolve(node, input)?;
            inputs.push(dep);
        }
        let (weight, wty) = self.graph.resolve(node, &spec.weight)?;
        if wty.is_vector() {
            return Err(Error::TypeMismatch(format!(
                "weight column '{}' must be scalar",
                spec.weight
            )));
        }
        self.actions.push(RegisteredAction {
            spec,
            branch: branch.to_string(),
            node,
            inputs,
            weight,
        });
        Ok(ActionHandle(self.actions.len() - 1))
    }

    /// Registered actions in registration order.
    pub fn actions(&self) -> &[RegisteredAction] {
        &self.actions
    }

    /// Execute the single batched pass.
    ///
    /// The first call freezes the graph and materializes every registered
    /// action; repeat calls are diagnostics-only no-ops.
    pub fn run(&mut self, config: &RunConfig) -> Result<()> {
        if self.output.is_some() {
            tracing::warn!("run() called again; results already materialized");
            return Ok(());
        }
        let branches = self
            .branches
            .as_ref()
            .ok_or_else(|| Error::MissingColumn("branch 'all' (call init_branches)".into()))?;
        self.graph.freeze();
        let output =
            scheduler::execute(&self.dataset, &self.graph, branches, &self.actions, config)?;
        self.output = Some(output);
        Ok(())
    }

    fn output(&self) -> Result<&RunOutput> {
        self.output
            .as_ref()
            .ok_or_else(|| Error::NotYetComputed("run() has not completed".to_string()))
    }

    /// Materialized result of an action.
    pub fn result(&self, handle: ActionHandle) -> Result<&HistResult> {
        let out = self.output()?;
        out.results
            .get(handle.0)
            .ok_or_else(|| Error::NotYetComputed(format!("action #{}", handle.0)))
    }

    /// All materialized results with their owning branch names, in
    /// registration order.
    pub fn results(&self) -> Result<impl Iterator<Item = (&str, &HistResult)>> {
        let out = self.output()?;
        Ok(self.actions.iter().zip(&out.results).map(|(a, r)| (a.branch.as_str(), r)))
    }

    /// Per-branch cutflow diagnostics.
    pub fn cutflows(&self) -> Result<&[HistResult]> {
        Ok(&self.output()?.cutflows)
    }

    /// Global (min, max) run number over all processed events, when the
    /// dataset carries run identifiers.
    pub fn run_range(&self) -> Result<Option<(u32, u32)>> {
        Ok(self.output()?.run_range)
    }

    /// Total events streamed through the graph.
    pub fn events_processed(&self) -> Result<u64> {
        Ok(self.output()?.events)
    }
}

/// Run several independent analyzers (possibly sharing one dataset Arc).
///
/// Each analyzer executes its own all-or-nothing batched pass; the first
/// failure aborts the remainder.
pub fn run_graphs(analyzers: &mut [&mut Analyzer], config: &RunConfig) -> Result<()> {
    for analyzer in analyzers {
        analyzer.run(config)?;
    }
    Ok(())
}
