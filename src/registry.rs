//! Conversion rule registry.
//!
//! Rules are pluggable algorithms behind the [`ConversionRule`] trait: the
//! registry only knows each rule's direction, cost and declared parameters.
//! It is constructed once at process start, populated by each domain module
//! that contributes an algorithm (rasterizer, surface extractor, decimator,
//! contour stacker), shared via `Arc`, and never mutated concurrently with
//! lookups after startup.
//!
//! ## Determinism Guarantees
//!
//! - Registration order is preserved and used by the planner as tie-break
//!   order among equal-cost edges.
//! - Registering a second rule for the same (source, target) pair is rejected;
//!   the old rule must be removed first.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::params::{ConversionParameterSet, ParameterSpec};
use crate::types::representation::{Representation, RepresentationKind};

/// Error returned by a conversion rule implementation at runtime.
///
/// Carries the failing rule's identity; the kernel does not retry, since
/// conversions are assumed deterministic and a retry would reproduce the
/// same failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("conversion rule '{rule}' failed: {message}")]
pub struct ConversionFailure {
    /// Name of the rule that failed.
    pub rule: String,
    /// Human-readable failure description.
    pub message: String,
}

impl ConversionFailure {
    /// Create a failure for a named rule.
    pub fn new(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            message: message.into(),
        }
    }
}

/// Error type for registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A rule for this (source, target) pair is already registered.
    #[error("duplicate conversion rule for {from} -> {to}")]
    DuplicateRule {
        /// Source kind of the rejected rule.
        from: RepresentationKind,
        /// Target kind of the rejected rule.
        to: RepresentationKind,
    },
}

/// A directed conversion edge: one algorithm turning a source-kind
/// representation into a target-kind representation.
///
/// Implementations must be deterministic for identical inputs and parameter
/// values; caching correctness depends on it. A->B and B->A are independent
/// rules with independent costs; either may be absent.
pub trait ConversionRule: Send + Sync {
    /// Stable rule name, used in errors and provenance records.
    fn name(&self) -> &str;

    /// Kind this rule consumes.
    fn source_kind(&self) -> RepresentationKind;

    /// Kind this rule produces.
    fn target_kind(&self) -> RepresentationKind;

    /// Non-negative cost used for path comparison.
    fn cost(&self) -> u64;

    /// Parameters this rule consumes. A spec without a default must be
    /// explicitly set before the planner will use this edge.
    fn parameters(&self) -> Vec<ParameterSpec> {
        Vec::new()
    }

    /// Run the conversion. The parameter set view carries every declared
    /// parameter's effective value by the time this is called.
    fn convert(
        &self,
        source: &Representation,
        params: &ConversionParameterSet,
    ) -> Result<Representation, ConversionFailure>;
}

/// Process-wide registry of conversion rules.
///
/// Interior locking exists only so startup code can register rules through a
/// shared `Arc`; after population the registry is read-only.
#[derive(Default)]
pub struct ConversionRuleRegistry {
    rules: RwLock<Vec<Arc<dyn ConversionRule>>>,
}

impl ConversionRuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule. Rejects a second rule for the same (source, target) pair.
    pub fn register(&self, rule: Arc<dyn ConversionRule>) -> Result<(), RegistryError> {
        let mut rules = self.rules.write();
        let source = rule.source_kind();
        let target = rule.target_kind();
        if rules
            .iter()
            .any(|r| r.source_kind() == source && r.target_kind() == target)
        {
            return Err(RegistryError::DuplicateRule {
                from: source,
                to: target,
            });
        }
        rules.push(rule);
        Ok(())
    }

    /// Remove the rule for a (source, target) pair, if present.
    ///
    /// Returns true when a rule was removed. This is the only way to replace
    /// a rule: remove, then register the new one.
    pub fn unregister(&self, source: RepresentationKind, target: RepresentationKind) -> bool {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| !(r.source_kind() == source && r.target_kind() == target));
        rules.len() != before
    }

    /// All outgoing edges from a kind, in registration order.
    pub fn rules_from(&self, kind: RepresentationKind) -> Vec<Arc<dyn ConversionRule>> {
        self.rules
            .read()
            .iter()
            .filter(|r| r.source_kind() == kind)
            .cloned()
            .collect()
    }

    /// The rule for a (source, target) pair, if registered.
    pub fn lookup(
        &self,
        source: RepresentationKind,
        target: RepresentationKind,
    ) -> Option<Arc<dyn ConversionRule>> {
        self.rules
            .read()
            .iter()
            .find(|r| r.source_kind() == source && r.target_kind() == target)
            .cloned()
    }

    /// Kinds that have at least one outgoing rule, in registration order,
    /// deduplicated.
    pub fn kinds_with_rules(&self) -> Vec<RepresentationKind> {
        let rules = self.rules.read();
        let mut kinds = Vec::new();
        for rule in rules.iter() {
            if !kinds.contains(&rule.source_kind()) {
                kinds.push(rule.source_kind());
            }
        }
        kinds
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    /// True when no rules are registered.
    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

impl std::fmt::Debug for ConversionRuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rules = self.rules.read();
        let edges: Vec<String> = rules
            .iter()
            .map(|r| format!("{} -> {} ({})", r.source_kind(), r.target_kind(), r.name()))
            .collect();
        f.debug_struct("ConversionRuleRegistry")
            .field("rules", &edges)
            .finish()
    }
}
