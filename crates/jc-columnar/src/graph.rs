//! The column graph: a DAG of derived-column and filter nodes over one
//! event table.
//!
//! Nodes form chains from a single root; branches fork by appending nodes to
//! a shared parent. Every node's value (or filter verdict) is computed at
//! most once per event per node through the [`EventCursor`] memo, which is
//! what lets many trigger branches reuse one upstream computation.
//!
//! The graph is mutable only until [`ColumnGraph::freeze`]; afterwards every
//! mutation fails with `GraphFrozen`, and partitions evaluate it read-only
//! in parallel.

use std::collections::HashMap;

use jc_core::{Error, Result};

use crate::column::{ColumnType, ColumnValue};
use crate::dataset::EventDataset;
use crate::formula::{BulkInput, Formula};
use crate::registry::{EventCtx, FnRegistry, NativeFn};

/// Node identifier; the root is node 0.
pub type NodeId = usize;

/// Root node id.
pub const ROOT: NodeId = 0;

// ── User-facing expressions ────────────────────────────────────

/// Index source for an element extraction.
#[derive(Debug, Clone)]
pub enum ElementIndex {
    /// Fixed element position.
    Literal(usize),
    /// Per-event scalar integer column holding the position; negative values
    /// yield the sentinel.
    Column(String),
}

/// Expression of a Define node.
pub enum Expr {
    /// Scalar formula over scalar dependencies.
    Formula(String),
    /// Elementwise formula over jagged dependencies (scalars broadcast);
    /// produces a float sequence.
    Map(String),
    /// Single element of a sequence column. Out-of-range or negative
    /// indices produce sentinels (0.0 for floats, −1 for integers, false
    /// for booleans) rather than raising.
    Element {
        /// Sequence column to index into.
        column: String,
        /// Element position.
        index: ElementIndex,
    },
    /// Boolean-mask sub-selection of a sequence column, preserving element
    /// order. Numeric masks count elements > 0 as kept.
    Mask {
        /// Sequence column to filter.
        column: String,
        /// Mask column of the same length.
        mask: String,
    },
    /// Number of elements of a sequence column.
    Length(String),
    /// Registered native function over explicitly named dependencies.
    Func {
        /// Stable registration name.
        name: String,
        /// Dependency columns, passed positionally.
        deps: Vec<String>,
        /// Produced column type.
        out: ColumnType,
        /// The function.
        func: NativeFn,
    },
    /// Per-event constant.
    Const(ColumnValue),
}

impl Expr {
    /// Scalar formula expression.
    pub fn formula(src: &str) -> Expr {
        Expr::Formula(src.to_string())
    }

    /// Elementwise formula expression.
    pub fn map(src: &str) -> Expr {
        Expr::Map(src.to_string())
    }

    /// `column[index]` with a fixed position.
    pub fn element(column: &str, index: usize) -> Expr {
        Expr::Element { column: column.to_string(), index: ElementIndex::Literal(index) }
    }

    /// `column[index_column]` with a per-event position.
    pub fn element_at(column: &str, index_column: &str) -> Expr {
        Expr::Element {
            column: column.to_string(),
            index: ElementIndex::Column(index_column.to_string()),
        }
    }

    /// `column[mask]` sub-selection.
    pub fn mask(column: &str, mask: &str) -> Expr {
        Expr::Mask { column: column.to_string(), mask: mask.to_string() }
    }

    /// Sequence length.
    pub fn length(column: &str) -> Expr {
        Expr::Length(column.to_string())
    }

    /// Native function expression.
    pub fn func(name: &str, deps: &[&str], out: ColumnType, func: NativeFn) -> Expr {
        Expr::Func {
            name: name.to_string(),
            deps: deps.iter().map(|s| s.to_string()).collect(),
            out,
            func,
        }
    }

    /// Constant expression.
    pub fn constant(value: ColumnValue) -> Expr {
        Expr::Const(value)
    }
}

/// Predicate of a Filter node; evaluates truthily (value > 0 passes).
pub enum Pred {
    /// Scalar formula predicate.
    Formula(String),
    /// Registered native predicate.
    Func {
        /// Stable registration name.
        name: String,
        /// Dependency columns.
        deps: Vec<String>,
        /// The predicate; must produce a scalar.
        func: NativeFn,
    },
}

impl Pred {
    /// Formula predicate.
    pub fn formula(src: &str) -> Pred {
        Pred::Formula(src.to_string())
    }

    /// Native predicate.
    pub fn func(name: &str, deps: &[&str], func: NativeFn) -> Pred {
        Pred::Func {
            name: name.to_string(),
            deps: deps.iter().map(|s| s.to_string()).collect(),
            func,
        }
    }
}

// ── Compiled nodes ─────────────────────────────────────────────

/// Resolved reference to a dependency: a source-table column or an upstream
/// Define node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepRef {
    /// Source-table column index.
    Source(usize),
    /// Define node.
    Node(NodeId),
}

#[derive(Debug, Clone)]
enum CompiledIndex {
    Literal(usize),
    Dep(DepRef),
}

enum CompiledExpr {
    Formula { formula: Formula, deps: Vec<DepRef> },
    Map { formula: Formula, deps: Vec<DepRef> },
    Element { col: DepRef, elem: ColumnType, index: CompiledIndex },
    Mask { col: DepRef, mask: DepRef },
    Length(DepRef),
    Native { key: u64, deps: Vec<DepRef> },
    Const(ColumnValue),
}

enum NodeKind {
    Root,
    Define { name: String, expr: CompiledExpr, out: ColumnType },
    Filter { label: String, pred: CompiledExpr },
}

struct GraphNode {
    parent: Option<NodeId>,
    kind: NodeKind,
}

// ── The graph ──────────────────────────────────────────────────

/// DAG of Define/Filter nodes over a fixed source schema.
pub struct ColumnGraph {
    nodes: Vec<GraphNode>,
    registry: FnRegistry,
    source_schema: Vec<(String, ColumnType)>,
    source_index: HashMap<String, usize>,
    frozen: bool,
}

impl ColumnGraph {
    /// Build an empty graph over the dataset's schema.
    pub fn new(dataset: &EventDataset) -> Self {
        let source_schema: Vec<(String, ColumnType)> =
            dataset.schema().map(|(n, t)| (n.to_string(), t)).collect();
        let source_index = source_schema
            .iter()
            .enumerate()
            .map(|(i, (n, _))| (n.clone(), i))
            .collect();
        Self {
            nodes: vec![GraphNode { parent: None, kind: NodeKind::Root }],
            registry: FnRegistry::default(),
            source_schema,
            source_index,
            frozen: false,
        }
    }

    /// Number of nodes including the root.
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has been frozen by the scheduler.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Freeze the graph; all further mutation fails.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    fn check_mutable(&self, what: &str) -> Result<()> {
        if self.frozen {
            Err(Error::GraphFrozen(what.to_string()))
        } else {
            Ok(())
        }
    }

    /// Resolve a column name visible at `from`: the nearest Define up the
    /// ancestry (including `from` itself), falling back to the source table.
    pub fn resolve(&self, from: NodeId, name: &str) -> Result<(DepRef, ColumnType)> {
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            if let NodeKind::Define { name: n, out, .. } = &self.nodes[id].kind {
                if n == name {
                    return Ok((DepRef::Node(id), *out));
                }
            }
            cursor = self.nodes[id].parent;
        }
        match self.source_index.get(name) {
            Some(&i) => Ok((DepRef::Source(i), self.source_schema[i].1)),
            None => Err(Error::MissingColumn(name.to_string())),
        }
    }

    /// Whether `name` is visible at `from`.
    pub fn is_defined(&self, from: NodeId, name: &str) -> bool {
        self.resolve(from, name).is_ok()
    }

    /// Append a Define node; fails on name collision within the ancestry.
    pub fn define(&mut self, parent: NodeId, name: &str, expr: Expr) -> Result<NodeId> {
        self.check_mutable(&format!("define '{name}'"))?;
        if self.resolve(parent, name).is_ok() {
            return Err(Error::NameCollision(name.to_string()));
        }
        self.push_define(parent, name, expr)
    }

    /// Append a Define node shadowing an existing name.
    pub fn redefine(&mut self, parent: NodeId, name: &str, expr: Expr) -> Result<NodeId> {
        self.check_mutable(&format!("redefine '{name}'"))?;
        if self.resolve(parent, name).is_err() {
            return Err(Error::MissingColumn(format!("redefine of undefined '{name}'")));
        }
        self.push_define(parent, name, expr)
    }

    fn push_define(&mut self, parent: NodeId, name: &str, expr: Expr) -> Result<NodeId> {
        let (compiled, out) = self.compile_expr(parent, expr)?;
        self.nodes.push(GraphNode {
            parent: Some(parent),
            kind: NodeKind::Define { name: name.to_string(), expr: compiled, out },
        });
        Ok(self.nodes.len() - 1)
    }

    /// Append a Filter node narrowing the parent's row set.
    pub fn filter(&mut self, parent: NodeId, label: &str, pred: Pred) -> Result<NodeId> {
        self.check_mutable(&format!("filter '{label}'"))?;
        let compiled = match pred {
            Pred::Formula(src) => self.compile_scalar_formula(parent, &src)?,
            Pred::Func { name, deps, func } => {
                self.compile_native(parent, &name, &deps, ColumnType::Bool, func)?
            }
        };
        self.nodes.push(GraphNode {
            parent: Some(parent),
            kind: NodeKind::Filter { label: label.to_string(), pred: compiled },
        });
        Ok(self.nodes.len() - 1)
    }

    /// Filter labels along the chain from the root to `node`, in order.
    pub fn filter_chain(&self, node: NodeId) -> Vec<(NodeId, String)> {
        let mut chain = Vec::new();
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            if let NodeKind::Filter { label, .. } = &self.nodes[id].kind {
                chain.push((id, label.clone()));
            }
            cursor = self.nodes[id].parent;
        }
        chain.reverse();
        chain
    }

    // ── Compilation ────────────────────────────────────────────

    fn compile_scalar_formula(&mut self, parent: NodeId, src: &str) -> Result<CompiledExpr> {
        let formula = Formula::compile(src)?;
        let mut deps = Vec::with_capacity(formula.deps().len());
        for dep in formula.deps() {
            let (r, ty) = self.resolve(parent, dep)?;
            if ty.is_vector() {
                return Err(Error::TypeMismatch(format!(
                    "formula '{src}' uses sequence column '{dep}' as a scalar"
                )));
            }
            deps.push(r);
        }
        Ok(CompiledExpr::Formula { formula, deps })
    }

    fn compile_native(
        &mut self,
        parent: NodeId,
        name: &str,
        dep_names: &[String],
        out: ColumnType,
        func: NativeFn,
    ) -> Result<CompiledExpr> {
        let mut deps = Vec::with_capacity(dep_names.len());
        for dep in dep_names {
            let (r, _) = self.resolve(parent, dep)?;
            deps.push(r);
        }
        let key = self.registry.insert_if_absent(name, out, func);
        Ok(CompiledExpr::Native { key, deps })
    }

    fn compile_expr(&mut self, parent: NodeId, expr: Expr) -> Result<(CompiledExpr, ColumnType)> {
        match expr {
            Expr::Formula(src) => {
                Ok((self.compile_scalar_formula(parent, &src)?, ColumnType::F64))
            }
            Expr::Map(src) => {
                let formula = Formula::compile(&src)?;
                let mut deps = Vec::with_capacity(formula.deps().len());
                let mut any_vector = false;
                for dep in formula.deps() {
                    let (r, ty) = self.resolve(parent, dep)?;
                    any_vector |= ty.is_vector();
                    deps.push(r);
                }
                if !any_vector {
                    return Err(Error::TypeMismatch(format!(
                        "elementwise formula '{src}' has no sequence dependency"
                    )));
                }
                Ok((CompiledExpr::Map { formula, deps }, ColumnType::VecF64))
            }
            Expr::Element { column, index } => {
                let (col, ty) = self.resolve(parent, &column)?;
                if !ty.is_vector() {
                    return Err(Error::TypeMismatch(format!(
                        "element access into scalar column '{column}'"
                    )));
                }
                let index = match index {
                    ElementIndex::Literal(i) => CompiledIndex::Literal(i),
                    ElementIndex::Column(name) => {
                        let (r, ity) = self.resolve(parent, &name)?;
                        if ity.is_vector() {
                            return Err(Error::TypeMismatch(format!(
                                "index column '{name}' must be scalar"
                            )));
                        }
                        CompiledIndex::Dep(r)
                    }
                };
                Ok((CompiledExpr::Element { col, elem: ty.element(), index }, ty.element()))
            }
            Expr::Mask { column, mask } => {
                let (col, ty) = self.resolve(parent, &column)?;
                let (m, mty) = self.resolve(parent, &mask)?;
                if !ty.is_vector() || !mty.is_vector() {
                    return Err(Error::TypeMismatch(format!(
                        "mask selection '{column}[{mask}]' requires sequence columns"
                    )));
                }
                Ok((CompiledExpr::Mask { col, mask: m }, ty))
            }
            Expr::Length(column) => {
                let (col, ty) = self.resolve(parent, &column)?;
                if !ty.is_vector() {
                    return Err(Error::TypeMismatch(format!(
                        "length of scalar column '{column}'"
                    )));
                }
                Ok((CompiledExpr::Length(col), ColumnType::I64))
            }
            Expr::Func { name, deps, out, func } => {
                Ok((self.compile_native(parent, &name, &deps, out, func)?, out))
            }
            Expr::Const(value) => {
                let ty = value.column_type();
                Ok((CompiledExpr::Const(value), ty))
            }
        }
    }

    // ── Evaluation ─────────────────────────────────────────────

    /// New evaluation cursor sized for this graph and its source schema.
    pub fn cursor(&self) -> EventCursor {
        EventCursor {
            node_values: vec![None; self.nodes.len()],
            node_passed: vec![None; self.nodes.len()],
            source_values: vec![None; self.source_schema.len()],
            ctx: EventCtx { seed: 0, row: 0 },
        }
    }

    /// Reset the cursor onto one event.
    pub fn begin_event(&self, cur: &mut EventCursor, dataset: &EventDataset, row: usize) {
        cur.node_values.iter_mut().for_each(|v| *v = None);
        cur.node_passed.iter_mut().for_each(|v| *v = None);
        cur.source_values.iter_mut().for_each(|v| *v = None);
        cur.ctx = EventCtx { seed: dataset.event_seed(row), row };
    }

    /// Compute a dependency into the cursor memo (at most once per event).
    pub fn ensure_dep(
        &self,
        dataset: &EventDataset,
        cur: &mut EventCursor,
        dep: DepRef,
    ) -> Result<()> {
        match dep {
            DepRef::Source(i) => {
                if cur.source_values[i].is_none() {
                    cur.source_values[i] = Some(dataset.value_at(cur.ctx.row, i));
                }
                Ok(())
            }
            DepRef::Node(id) => self.ensure_node_value(dataset, cur, id),
        }
    }

    /// Read a previously-ensured dependency value.
    pub fn peek<'c>(&self, cur: &'c EventCursor, dep: DepRef) -> &'c ColumnValue {
        match dep {
            DepRef::Source(i) => cur.source_values[i].as_ref().expect("dep not ensured"),
            DepRef::Node(id) => cur.node_values[id].as_ref().expect("dep not ensured"),
        }
    }

    /// Ensure then read a dependency value.
    pub fn dep_value<'c>(
        &self,
        dataset: &EventDataset,
        cur: &'c mut EventCursor,
        dep: DepRef,
    ) -> Result<&'c ColumnValue> {
        self.ensure_dep(dataset, cur, dep)?;
        Ok(self.peek(cur, dep))
    }

    fn ensure_node_value(
        &self,
        dataset: &EventDataset,
        cur: &mut EventCursor,
        node: NodeId,
    ) -> Result<()> {
        if cur.node_values[node].is_some() {
            return Ok(());
        }
        let value = match &self.nodes[node].kind {
            NodeKind::Define { expr, out, name } => {
                let v = self.eval_expr(dataset, cur, expr)?;
                if v.column_type() != *out {
                    return Err(Error::TypeMismatch(format!(
                        "'{name}' produced {:?}, declared {:?}",
                        v.column_type(),
                        out
                    )));
                }
                v
            }
            _ => unreachable!("value requested from non-Define node"),
        };
        cur.node_values[node] = Some(value);
        Ok(())
    }

    /// Whether the event survives every filter from the root to `node`.
    ///
    /// Memoized per node, so branches sharing ancestors evaluate shared
    /// filters once.
    pub fn passes(
        &self,
        dataset: &EventDataset,
        cur: &mut EventCursor,
        node: NodeId,
    ) -> Result<bool> {
        if let Some(p) = cur.node_passed[node] {
            return Ok(p);
        }
        let parent_ok = match self.nodes[node].parent {
            Some(parent) => self.passes(dataset, cur, parent)?,
            None => true,
        };
        let pass = if !parent_ok {
            false
        } else {
            match &self.nodes[node].kind {
                NodeKind::Filter { pred, .. } => {
                    self.eval_expr(dataset, cur, pred)?.truthy()?
                }
                _ => true,
            }
        };
        cur.node_passed[node] = Some(pass);
        Ok(pass)
    }

    fn eval_expr(
        &self,
        dataset: &EventDataset,
        cur: &mut EventCursor,
        expr: &CompiledExpr,
    ) -> Result<ColumnValue> {
        match expr {
            CompiledExpr::Formula { formula, deps } => {
                for d in deps {
                    self.ensure_dep(dataset, cur, *d)?;
                }
                let mut vals = Vec::with_capacity(deps.len());
                for d in deps {
                    vals.push(self.peek(cur, *d).as_f64()?);
                }
                Ok(ColumnValue::F64(formula.eval(&vals)))
            }
            CompiledExpr::Map { formula, deps } => {
                for d in deps {
                    self.ensure_dep(dataset, cur, *d)?;
                }
                // Coerced sequence views (owned only for non-f64 elements).
                let mut seqs: Vec<Option<std::borrow::Cow<'_, [f64]>>> =
                    Vec::with_capacity(deps.len());
                let mut scalars: Vec<Option<f64>> = Vec::with_capacity(deps.len());
                let mut n: Option<usize> = None;
                for d in deps {
                    let v = self.peek(cur, *d);
                    match v.seq_len() {
                        Some(len) => {
                            match n {
                                None => n = Some(len),
                                Some(expected) if expected != len => {
                                    return Err(Error::TypeMismatch(format!(
                                        "elementwise formula '{}' over sequences of length {expected} and {len}",
                                        formula.source()
                                    )));
                                }
                                _ => {}
                            }
                            seqs.push(Some(v.f64_seq()?));
                            scalars.push(None);
                        }
                        None => {
                            seqs.push(None);
                            scalars.push(Some(v.as_f64()?));
                        }
                    }
                }
                let n = n.expect("map compiled without sequence dependency");
                let inputs: Vec<BulkInput<'_>> = seqs
                    .iter()
                    .zip(&scalars)
                    .map(|(seq, scalar)| match seq {
                        Some(cow) => BulkInput::Seq(cow),
                        None => BulkInput::Scalar(scalar.unwrap()),
                    })
                    .collect();
                Ok(ColumnValue::VecF64(formula.eval_elementwise(&inputs, n)))
            }
            CompiledExpr::Element { col, elem, index } => {
                let idx = match index {
                    CompiledIndex::Literal(i) => *i as i64,
                    CompiledIndex::Dep(d) => self.dep_value(dataset, cur, *d)?.as_i64()?,
                };
                let v = self.dep_value(dataset, cur, *col)?;
                Ok(extract_element(v, idx, *elem))
            }
            CompiledExpr::Mask { col, mask } => {
                self.ensure_dep(dataset, cur, *col)?;
                self.ensure_dep(dataset, cur, *mask)?;
                let keep = mask_bits(self.peek(cur, *mask))?;
                let v = self.peek(cur, *col);
                apply_mask(v, &keep)
            }
            CompiledExpr::Length(col) => {
                let v = self.dep_value(dataset, cur, *col)?;
                let len = v.seq_len().ok_or_else(|| {
                    Error::TypeMismatch("length of scalar value".to_string())
                })?;
                Ok(ColumnValue::I64(len as i64))
            }
            CompiledExpr::Native { key, deps } => {
                for d in deps {
                    self.ensure_dep(dataset, cur, *d)?;
                }
                let registered = self.registry.get(*key).expect("unregistered function key");
                let refs: Vec<&ColumnValue> =
                    deps.iter().map(|d| self.peek(cur, *d)).collect();
                let out = (registered.func)(&refs, &cur.ctx)?;
                if out.column_type() != registered.out_type {
                    return Err(Error::TypeMismatch(format!(
                        "'{}' produced {:?}, registered as {:?}",
                        registered.name,
                        out.column_type(),
                        registered.out_type
                    )));
                }
                Ok(out)
            }
            CompiledExpr::Const(v) => Ok(v.clone()),
        }
    }
}

/// Per-event memo: one value slot per node and source column, one verdict
/// slot per node.
pub struct EventCursor {
    node_values: Vec<Option<ColumnValue>>,
    node_passed: Vec<Option<bool>>,
    source_values: Vec<Option<ColumnValue>>,
    ctx: EventCtx,
}

impl EventCursor {
    /// Evaluation context of the current event.
    pub fn ctx(&self) -> &EventCtx {
        &self.ctx
    }
}

fn extract_element(v: &ColumnValue, idx: i64, elem: ColumnType) -> ColumnValue {
    let in_range = idx >= 0 && v.seq_len().is_some_and(|n| (idx as usize) < n);
    match (v, in_range) {
        (ColumnValue::VecF64(x), true) => ColumnValue::F64(x[idx as usize]),
        (ColumnValue::VecI64(x), true) => ColumnValue::I64(x[idx as usize]),
        (ColumnValue::VecBool(x), true) => ColumnValue::Bool(x[idx as usize]),
        // Sentinels for missing objects.
        _ => match elem {
            ColumnType::I64 => ColumnValue::I64(-1),
            ColumnType::Bool => ColumnValue::Bool(false),
            _ => ColumnValue::F64(0.0),
        },
    }
}

fn mask_bits(mask: &ColumnValue) -> Result<Vec<bool>> {
    match mask {
        ColumnValue::VecBool(m) => Ok(m.clone()),
        ColumnValue::VecF64(m) => Ok(m.iter().map(|&x| x > 0.0).collect()),
        ColumnValue::VecI64(m) => Ok(m.iter().map(|&x| x > 0).collect()),
        other => Err(Error::TypeMismatch(format!(
            "mask must be a sequence, got {:?}",
            other.column_type()
        ))),
    }
}

fn apply_mask(v: &ColumnValue, keep: &[bool]) -> Result<ColumnValue> {
    let len = v.seq_len().ok_or_else(|| {
        Error::TypeMismatch("mask applied to scalar value".to_string())
    })?;
    if len != keep.len() {
        return Err(Error::TypeMismatch(format!(
            "mask length {} does not match sequence length {len}",
            keep.len()
        )));
    }
    let kept = |i: &usize| keep[*i];
    Ok(match v {
        ColumnValue::VecF64(x) => ColumnValue::VecF64(
            x.iter().enumerate().filter(|(i, _)| kept(i)).map(|(_, &v)| v).collect(),
        ),
        ColumnValue::VecI64(x) => ColumnValue::VecI64(
            x.iter().enumerate().filter(|(i, _)| kept(i)).map(|(_, &v)| v).collect(),
        ),
        ColumnValue::VecBool(x) => ColumnValue::VecBool(
            x.iter().enumerate().filter(|(i, _)| kept(i)).map(|(_, &v)| v).collect(),
        ),
        _ => unreachable!("seq_len returned Some for scalar"),
    })
}
