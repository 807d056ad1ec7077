//! Registry of native column functions.
//!
//! Selection cascades and response estimators that cannot be written as
//! scalar formulas are registered here as closures, keyed by a stable 64-bit
//! hash of their registered name. Registration is idempotent
//! insert-if-absent: defining the same function along several branches keeps
//! the first registration, so shared ancestors compare equal and memoize
//! correctly.

use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::Arc;

use jc_core::Result;
use twox_hash::XxHash64;

use crate::column::{ColumnType, ColumnValue};

/// Per-event evaluation context passed to native functions.
///
/// The seed is the only non-column input an expression may consume; it is a
/// pure function of the event identifier, so draws made from it are
/// reproducible across runs and partitionings.
#[derive(Debug, Clone, Copy)]
pub struct EventCtx {
    /// Deterministic per-event seed.
    pub seed: u64,
    /// Row index within the dataset (diagnostics only).
    pub row: usize,
}

/// A native column function: resolved dependency values in, one value out.
pub type NativeFn =
    Arc<dyn Fn(&[&ColumnValue], &EventCtx) -> Result<ColumnValue> + Send + Sync>;

/// A registered native function.
pub struct Registered {
    /// Registered name (stable across runs).
    pub name: String,
    /// Type of the produced column.
    pub out_type: ColumnType,
    /// The function itself.
    pub func: NativeFn,
}

impl std::fmt::Debug for Registered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registered")
            .field("name", &self.name)
            .field("out_type", &self.out_type)
            .finish_non_exhaustive()
    }
}

/// Hash-keyed function registry with idempotent registration.
#[derive(Debug, Default)]
pub struct FnRegistry {
    map: HashMap<u64, Registered>,
}

impl FnRegistry {
    /// Stable 64-bit key for a function name.
    pub fn stable_key(name: &str) -> u64 {
        let mut h = XxHash64::with_seed(0);
        h.write(name.as_bytes());
        h.finish()
    }

    /// Register `func` under `name` unless a function with that name already
    /// exists; returns the key either way.
    pub fn insert_if_absent(
        &mut self,
        name: &str,
        out_type: ColumnType,
        func: NativeFn,
    ) -> u64 {
        let key = Self::stable_key(name);
        self.map
            .entry(key)
            .or_insert_with(|| Registered { name: name.to_string(), out_type, func });
        key
    }

    /// Look up a registered function by key.
    pub fn get(&self, key: u64) -> Option<&Registered> {
        self.map.get(&key)
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(v: f64) -> NativeFn {
        Arc::new(move |_deps, _ctx| Ok(ColumnValue::F64(v)))
    }

    #[test]
    fn stable_key_is_stable() {
        assert_eq!(FnRegistry::stable_key("dijet_tag_probe"), FnRegistry::stable_key("dijet_tag_probe"));
        assert_ne!(FnRegistry::stable_key("a"), FnRegistry::stable_key("b"));
    }

    #[test]
    fn insert_if_absent_is_idempotent() {
        let mut reg = FnRegistry::default();
        let k1 = reg.insert_if_absent("f", ColumnType::F64, constant(1.0));
        let k2 = reg.insert_if_absent("f", ColumnType::F64, constant(2.0));
        assert_eq!(k1, k2);
        assert_eq!(reg.len(), 1);
        // First registration wins.
        let ctx = EventCtx { seed: 0, row: 0 };
        let out = (reg.get(k1).unwrap().func)(&[], &ctx).unwrap();
        assert_eq!(out, ColumnValue::F64(1.0));
    }
}
