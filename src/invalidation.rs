//! Invalidation policy: drops cached representations exactly when they can no
//! longer be trusted.
//!
//! Mutators call these functions directly and synchronously; there is no
//! event bus. Three triggers exist:
//!
//! - master content replaced: every non-master kind was derived from the old
//!   ground truth and is dropped;
//! - a parameter value changed: entries whose provenance recorded a different
//!   value for that parameter are dropped, then anything derived from a
//!   dropped kind, to a fixpoint;
//! - master removed: nothing can be trusted, everything is dropped and the
//!   master declaration cleared.
//!
//! The master representation itself is never evicted by parameter changes;
//! it has no provenance to go stale.

use std::collections::BTreeSet;

use crate::store::RepresentationStore;
use crate::types::params::{values_equal, ParamName};
use crate::types::representation::RepresentationKind;

/// Drop every cached kind except the (new) master content.
///
/// `kept` is the kind whose content was just replaced; when a master is
/// declared it is always that kind.
pub fn on_master_replaced(store: &mut RepresentationStore, kept: RepresentationKind) {
    let stale: Vec<RepresentationKind> = store
        .kinds()
        .into_iter()
        .filter(|k| *k != kept)
        .collect();
    for kind in &stale {
        store.drop_kind(*kind);
    }
    if !stale.is_empty() {
        tracing::debug!(
            kept = %kept,
            dropped = stale.len(),
            "master content replaced, dropped derived representations"
        );
    }
}

/// Drop every cached kind whose most recent computation consumed `name` with
/// a different value, and transitively everything derived from a dropped
/// kind.
pub fn on_parameter_changed(store: &mut RepresentationStore, name: &ParamName, new_value: f64) {
    let mut stale: BTreeSet<RepresentationKind> = store
        .iter()
        .filter_map(|(kind, entry)| {
            let prov = entry.provenance.as_ref()?;
            let recorded = prov.params_used.get(name)?;
            if values_equal(*recorded, new_value) {
                None
            } else {
                Some(*kind)
            }
        })
        .collect();

    // Transitive closure over derivation sources.
    loop {
        let cascade: Vec<RepresentationKind> = store
            .iter()
            .filter_map(|(kind, entry)| {
                let prov = entry.provenance.as_ref()?;
                if !stale.contains(kind) && stale.contains(&prov.source_kind) {
                    Some(*kind)
                } else {
                    None
                }
            })
            .collect();
        if cascade.is_empty() {
            break;
        }
        stale.extend(cascade);
    }

    for kind in &stale {
        store.drop_kind(*kind);
    }
    if !stale.is_empty() {
        tracing::debug!(
            parameter = %name,
            dropped = stale.len(),
            "parameter value changed, dropped stale representations"
        );
    }
}

/// Drop everything and clear the master declaration.
pub fn on_master_removed(store: &mut RepresentationStore) {
    let dropped = store.len();
    store.clear_all();
    tracing::debug!(dropped, "master removed, cleared region cache");
}
