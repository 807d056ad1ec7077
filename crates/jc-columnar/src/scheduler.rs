//! Single batched, partitioned, multi-threaded execution pass.
//!
//! The dataset is split into contiguous event ranges processed by a rayon
//! worker pool. Each partition streams its events through the shared
//! (frozen, read-only) column graph once, filling partition-local
//! accumulators; partials combine through an associative, commutative
//! bin-wise merge, so totals are independent of partition count and
//! completion order. Any evaluation error aborts the whole pass: partial
//! channel output would silently bias a calibration, so none is ever
//! surfaced.

use rayon::prelude::*;

use jc_core::{Error, HistResult, Result};

use crate::accum::{Accumulator, CutflowCounts};
use crate::analyzer::RegisteredAction;
use crate::branch::BranchManager;
use crate::column::ColumnValue;
use crate::dataset::EventDataset;
use crate::graph::{ColumnGraph, EventCursor, NodeId};

/// Scheduler configuration.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Number of dataset partitions; defaults to four per worker thread so
    /// stragglers hide behind the pool.
    pub n_partitions: Option<usize>,
}

/// Everything one pass materializes.
pub struct RunOutput {
    /// Per-action results, in registration order.
    pub results: Vec<HistResult>,
    /// Per-branch cutflow diagnostics.
    pub cutflows: Vec<HistResult>,
    /// Global (min, max) run number, when run identifiers exist.
    pub run_range: Option<(u32, u32)>,
    /// Events processed.
    pub events: u64,
}

/// Per-branch cutflow plan: the filter chain to count, in order.
struct CutflowPlan {
    branch: String,
    labels: Vec<String>,
    nodes: Vec<NodeId>,
}

#[derive(Clone)]
struct Partial {
    accums: Vec<Accumulator>,
    cutflows: Vec<CutflowCounts>,
    run_min: Option<u32>,
    run_max: Option<u32>,
    events: u64,
}

impl Partial {
    fn empty(actions: &[RegisteredAction], plans: &[CutflowPlan]) -> Result<Self> {
        let accums = actions
            .iter()
            .map(|a| Accumulator::new(&a.spec))
            .collect::<Result<Vec<_>>>()?;
        let cutflows = plans
            .iter()
            .map(|p| {
                let mut labels = vec!["events".to_string()];
                labels.extend(p.labels.iter().cloned());
                CutflowCounts::new(&p.branch, labels)
            })
            .collect();
        Ok(Self { accums, cutflows, run_min: None, run_max: None, events: 0 })
    }

    fn merged(mut self, other: Partial) -> Partial {
        for (a, b) in self.accums.iter_mut().zip(&other.accums) {
            a.merge(b);
        }
        for (a, b) in self.cutflows.iter_mut().zip(&other.cutflows) {
            a.merge(b);
        }
        self.run_min = merge_extreme(self.run_min, other.run_min, u32::min);
        self.run_max = merge_extreme(self.run_max, other.run_max, u32::max);
        self.events += other.events;
        self
    }
}

fn merge_extreme(a: Option<u32>, b: Option<u32>, pick: fn(u32, u32) -> u32) -> Option<u32> {
    match (a, b) {
        (Some(x), Some(y)) => Some(pick(x, y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// Execute one batched pass over all registered actions.
pub(crate) fn execute(
    dataset: &EventDataset,
    graph: &ColumnGraph,
    branches: &BranchManager,
    actions: &[RegisteredAction],
    config: &RunConfig,
) -> Result<RunOutput> {
    let n_events = dataset.n_events();
    let n_partitions = config
        .n_partitions
        .unwrap_or_else(|| 4 * rayon::current_num_threads())
        .max(1)
        .min(n_events.max(1));
    let plans = cutflow_plans(graph, branches, actions);

    tracing::info!(
        events = n_events,
        partitions = n_partitions,
        actions = actions.len(),
        branches = branches.len(),
        "starting batched pass"
    );

    let template = Partial::empty(actions, &plans)?;
    let ranges = partition_ranges(n_events, n_partitions);
    let partial = ranges
        .into_par_iter()
        .map(|range| {
            process_partition(dataset, graph, actions, &plans, range).map_err(Error::fatal)
        })
        .try_reduce(|| template.clone(), |a, b| Ok(a.merged(b)))?;

    let results = actions
        .iter()
        .zip(&partial.accums)
        .map(|(a, acc)| acc.finalize(&a.spec))
        .collect();
    let cutflows = partial.cutflows.iter().map(CutflowCounts::finalize).collect();
    let run_range = match (partial.run_min, partial.run_max) {
        (Some(lo), Some(hi)) => Some((lo, hi)),
        _ => None,
    };

    tracing::info!(events = partial.events, "batched pass complete");
    Ok(RunOutput { results, cutflows, run_range, events: partial.events })
}

/// Contiguous event ranges, sizes differing by at most one.
fn partition_ranges(n_events: usize, n_partitions: usize) -> Vec<std::ops::Range<usize>> {
    let base = n_events / n_partitions;
    let extra = n_events % n_partitions;
    let mut ranges = Vec::with_capacity(n_partitions);
    let mut start = 0;
    for i in 0..n_partitions {
        let len = base + usize::from(i < extra);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// For each branch, count the longest filter chain among its actions (they
/// all pass through the branch terminal), falling back to the branch's own
/// chain when no action extends it.
fn cutflow_plans(
    graph: &ColumnGraph,
    branches: &BranchManager,
    actions: &[RegisteredAction],
) -> Vec<CutflowPlan> {
    branches
        .iter()
        .map(|(name, node)| {
            let mut chain = graph.filter_chain(node);
            for action in actions.iter().filter(|a| a.branch == name) {
                let candidate = graph.filter_chain(action.node);
                if candidate.len() > chain.len() {
                    chain = candidate;
                }
            }
            CutflowPlan {
                branch: name.to_string(),
                labels: chain.iter().map(|(_, l)| l.clone()).collect(),
                nodes: chain.into_iter().map(|(id, _)| id).collect(),
            }
        })
        .collect()
}

fn process_partition(
    dataset: &EventDataset,
    graph: &ColumnGraph,
    actions: &[RegisteredAction],
    plans: &[CutflowPlan],
    range: std::ops::Range<usize>,
) -> Result<Partial> {
    let mut partial = Partial::empty(actions, plans)?;
    let mut cursor = graph.cursor();

    for row in range {
        graph.begin_event(&mut cursor, dataset, row);
        partial.events += 1;

        if let Some(run) = dataset.run_number(row) {
            partial.run_min = merge_extreme(partial.run_min, Some(run), u32::min);
            partial.run_max = merge_extreme(partial.run_max, Some(run), u32::max);
        }

        for (plan, counts) in plans.iter().zip(&mut partial.cutflows) {
            counts.counts[0] += 1;
            for (stage, &node) in plan.nodes.iter().enumerate() {
                if graph.passes(dataset, &mut cursor, node)? {
                    counts.counts[stage + 1] += 1;
                } else {
                    break;
                }
            }
        }

        for (action, accum) in actions.iter().zip(&mut partial.accums) {
            if !graph.passes(dataset, &mut cursor, action.node)? {
                continue;
            }
            fill_action(dataset, graph, &mut cursor, action, accum)?;
        }
    }

    Ok(partial)
}

/// Feed one surviving event into an action's accumulator.
///
/// Scalar inputs produce one fill; a jagged input produces one fill per
/// element, all with the event's single weight, with scalars broadcast.
/// Jagged inputs of one action must agree in length.
fn fill_action(
    dataset: &EventDataset,
    graph: &ColumnGraph,
    cursor: &mut EventCursor,
    action: &RegisteredAction,
    accum: &mut Accumulator,
) -> Result<()> {
    let weight = graph.dep_value(dataset, cursor, action.weight)?.as_f64()?;
    for dep in &action.inputs {
        graph.ensure_dep(dataset, cursor, *dep)?;
    }
    let values: Vec<&ColumnValue> =
        action.inputs.iter().map(|d| graph.peek(cursor, *d)).collect();

    let mut n: Option<usize> = None;
    for v in &values {
        if let Some(len) = v.seq_len() {
            match n {
                None => n = Some(len),
                Some(expected) if expected != len => {
                    return Err(Error::TypeMismatch(format!(
                        "action '{}' mixes sequence inputs of length {expected} and {len}",
                        action.spec.name
                    )));
                }
                _ => {}
            }
        }
    }

    let fills = n.unwrap_or(1);
    let n_axes = action.spec.kind.n_axes();
    let mut coords = vec![0.0f64; n_axes];
    for k in 0..fills {
        for (slot, v) in coords.iter_mut().zip(&values) {
            *slot = element_or_scalar(v, k)?;
        }
        let sample = if action.spec.kind.is_profile() {
            Some(element_or_scalar(values[n_axes], k)?)
        } else {
            None
        };
        accum.fill(&coords, sample, weight);
    }
    Ok(())
}

fn element_or_scalar(v: &ColumnValue, k: usize) -> Result<f64> {
    match v.seq_len() {
        Some(_) => Ok(v.element_f64(k).expect("element index checked against length")),
        None => v.as_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_ranges_cover_all_events() {
        let ranges = partition_ranges(10, 3);
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);
        let ranges = partition_ranges(2, 5);
        assert_eq!(ranges.iter().map(|r| r.len()).sum::<usize>(), 2);
        let ranges = partition_ranges(0, 1);
        assert_eq!(ranges, vec![0..0]);
    }

    #[test]
    fn extreme_merge() {
        assert_eq!(merge_extreme(Some(3), Some(5), u32::min), Some(3));
        assert_eq!(merge_extreme(None, Some(5), u32::max), Some(5));
        assert_eq!(merge_extreme(None, None, u32::max), None);
    }
}
