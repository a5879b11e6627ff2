//! Per-region representation store.
//!
//! Maps representation kind to cached value and tracks which kind is master.
//! Every derived entry carries a [`Provenance`] record with the exact
//! parameter values in effect when it was computed; invalidation compares
//! values, never "was it ever set" flags.
//!
//! ## Determinism Guarantees
//!
//! - Entries live in a `BTreeMap`, so iteration order is stable.
//! - Planning order is master first, then remaining kinds in canonical order.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::invalidation;
use crate::types::params::ParamName;
use crate::types::representation::{Representation, RepresentationKind};

/// How a cached representation was derived.
///
/// Seeded and master representations have no provenance; everything the
/// executor produces records the rule, the source kind it consumed, and the
/// parameter values it ran with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Kind the producing rule consumed.
    pub source_kind: RepresentationKind,
    /// Name of the producing rule.
    pub rule: String,
    /// Exact parameter values in effect at compute time.
    pub params_used: BTreeMap<ParamName, f64>,
    /// Master content revision the derivation was computed against.
    pub master_revision: u64,
}

/// One cached representation plus its derivation record.
#[derive(Debug, Clone)]
pub struct CachedRepresentation {
    /// The stored value. Shared out as a handle; cache hits return the same
    /// `Arc`.
    pub value: Arc<Representation>,
    /// Derivation record; `None` for seeded or master data.
    pub provenance: Option<Provenance>,
}

/// Per-region map from representation kind to cached value.
#[derive(Debug, Default)]
pub struct RepresentationStore {
    master_kind: Option<RepresentationKind>,
    master_revision: u64,
    entries: BTreeMap<RepresentationKind, CachedRepresentation>,
}

impl RepresentationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Which kind is authoritative, if declared.
    pub fn master_kind(&self) -> Option<RepresentationKind> {
        self.master_kind
    }

    /// Monotone counter bumped every time master content is replaced.
    pub fn master_revision(&self) -> u64 {
        self.master_revision
    }

    /// Cache-membership check; never triggers computation.
    pub fn has(&self, kind: RepresentationKind) -> bool {
        self.entries.contains_key(&kind)
    }

    /// Cached entry for a kind, if present.
    pub fn get(&self, kind: RepresentationKind) -> Option<&CachedRepresentation> {
        self.entries.get(&kind)
    }

    /// Handle to the cached value for a kind, if present.
    pub fn value(&self, kind: RepresentationKind) -> Option<Arc<Representation>> {
        self.entries.get(&kind).map(|e| Arc::clone(&e.value))
    }

    /// Cached kinds in canonical order.
    pub fn kinds(&self) -> Vec<RepresentationKind> {
        self.entries.keys().copied().collect()
    }

    /// Cached kinds in planning order: master first, then the rest in
    /// canonical order. The planner uses this as its tie-break order.
    pub fn planning_order(&self) -> Vec<RepresentationKind> {
        let mut kinds = Vec::with_capacity(self.entries.len());
        if let Some(master) = self.master_kind {
            if self.entries.contains_key(&master) {
                kinds.push(master);
            }
        }
        for kind in self.entries.keys() {
            if Some(*kind) != self.master_kind {
                kinds.push(*kind);
            }
        }
        kinds
    }

    /// Replace (or create) the stored representation of the payload's kind.
    ///
    /// When the kind is the master kind, or no master is declared, the master
    /// content changed: the revision is bumped and every other cached kind is
    /// dropped. Setting a non-master kind directly (e.g. loading it from
    /// disk) does not invalidate siblings.
    pub fn set(&mut self, rep: Representation) -> Arc<Representation> {
        let kind = rep.kind();
        let value = Arc::new(rep);
        let is_master_write = self.master_kind.map_or(true, |m| m == kind);
        self.entries.insert(
            kind,
            CachedRepresentation {
                value: Arc::clone(&value),
                provenance: None,
            },
        );
        if is_master_write {
            self.master_revision += 1;
            invalidation::on_master_replaced(self, kind);
        }
        value
    }

    /// Store a representation the executor derived, without cascading
    /// invalidation, so multi-hop conversions leave useful intermediates.
    pub fn set_derived(&mut self, rep: Representation, provenance: Provenance) -> Arc<Representation> {
        let kind = rep.kind();
        let value = Arc::new(rep);
        self.entries.insert(
            kind,
            CachedRepresentation {
                value: Arc::clone(&value),
                provenance: Some(provenance),
            },
        );
        value
    }

    /// Insert a recovered representation during a bulk load, with no
    /// invalidation side effects.
    pub fn insert_restored(&mut self, rep: Representation) -> Arc<Representation> {
        let kind = rep.kind();
        let value = Arc::new(rep);
        self.entries.insert(
            kind,
            CachedRepresentation {
                value: Arc::clone(&value),
                provenance: None,
            },
        );
        value
    }

    /// Delete a cached kind.
    ///
    /// Removing the master kind clears the master declaration and drops every
    /// other cached kind; nothing can be trusted as ground truth afterward.
    /// Returns true when the kind was present.
    pub fn remove(&mut self, kind: RepresentationKind) -> bool {
        let existed = self.entries.contains_key(&kind);
        if Some(kind) == self.master_kind {
            invalidation::on_master_removed(self);
        } else {
            self.entries.remove(&kind);
        }
        existed
    }

    /// Declare which cached kind is authoritative.
    ///
    /// Returns false (and changes nothing) when no representation of that
    /// kind is stored; the master must always exist.
    pub fn declare_master(&mut self, kind: RepresentationKind) -> bool {
        if !self.entries.contains_key(&kind) {
            return false;
        }
        self.master_kind = Some(kind);
        true
    }

    /// Number of cached kinds.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over cached entries in canonical kind order.
    pub fn iter(&self) -> impl Iterator<Item = (&RepresentationKind, &CachedRepresentation)> {
        self.entries.iter()
    }

    pub(crate) fn drop_kind(&mut self, kind: RepresentationKind) {
        self.entries.remove(&kind);
    }

    pub(crate) fn clear_all(&mut self) {
        self.entries.clear();
        self.master_kind = None;
        self.master_revision += 1;
    }

    pub(crate) fn set_master_unchecked(&mut self, kind: Option<RepresentationKind>) {
        self.master_kind = kind;
    }
}
