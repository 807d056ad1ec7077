//! Four-level result namespace: Trigger → Channel → Method → Name.
//!
//! The method is derived from each result's declared name (first
//! `_`-delimited token), matching the naming convention of the action
//! tables. Intermediate namespace nodes are created on demand,
//! idempotently. In compact-naming mode the redundant `<Method>_<channel>_`
//! prefix is stripped from leaf names before placement; colliding compact
//! names overwrite with explicit last-write-wins.

use std::collections::BTreeMap;

use jc_core::HistResult;
use serde::{Deserialize, Serialize};

type Namespace = BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeMap<String, HistResult>>>>;

/// Hierarchical container of finalized results.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResultTree {
    triggers: Namespace,
    compact_naming: bool,
}

impl ResultTree {
    /// Empty tree with full leaf names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty tree in compact-naming mode.
    pub fn with_compact_naming() -> Self {
        Self { triggers: Namespace::default(), compact_naming: true }
    }

    /// Whether compact naming is active.
    pub fn compact_naming(&self) -> bool {
        self.compact_naming
    }

    /// Method token of a result name (everything before the first `_`).
    pub fn method_of(name: &str) -> &str {
        name.split('_').next().unwrap_or(name)
    }

    /// Place a result under `trigger/channel`, deriving the method from its
    /// name. Returns the replaced result if the leaf path was already
    /// occupied (last-write-wins).
    pub fn insert(
        &mut self,
        trigger: &str,
        channel: &str,
        result: HistResult,
    ) -> Option<HistResult> {
        let method = Self::method_of(&result.name).to_string();
        let leaf = if self.compact_naming {
            let prefix = format!("{method}_{channel}_");
            result
                .name
                .strip_prefix(&prefix)
                .unwrap_or(&result.name)
                .to_string()
        } else {
            result.name.clone()
        };
        let replaced = self
            .triggers
            .entry(trigger.to_string())
            .or_default()
            .entry(channel.to_string())
            .or_default()
            .entry(method)
            .or_default()
            .insert(leaf, result);
        if let Some(old) = &replaced {
            tracing::debug!(name = %old.name, trigger, channel, "overwrote existing result");
        }
        replaced
    }

    /// Result at an exact path.
    pub fn get(
        &self,
        trigger: &str,
        channel: &str,
        method: &str,
        name: &str,
    ) -> Option<&HistResult> {
        self.triggers.get(trigger)?.get(channel)?.get(method)?.get(name)
    }

    /// Trigger names in sorted order.
    pub fn trigger_names(&self) -> impl Iterator<Item = &str> {
        self.triggers.keys().map(String::as_str)
    }

    /// Iterate every leaf as `(trigger/channel/method/name, result)` in
    /// deterministic (sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (String, &HistResult)> {
        self.triggers.iter().flat_map(|(trigger, channels)| {
            channels.iter().flat_map(move |(channel, methods)| {
                methods.iter().flat_map(move |(method, leaves)| {
                    leaves.iter().map(move |(name, result)| {
                        (format!("{trigger}/{channel}/{method}/{name}"), result)
                    })
                })
            })
        })
    }

    /// Total number of stored results.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether the tree holds no results.
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}
