//! Conversion executor.
//!
//! Runs a planned chain strictly in order. Each edge consumes the
//! representation produced by the previous one (or the chosen available
//! representation for the first edge). Every successful intermediate is
//! stored with non-master semantics and full provenance, so multi-hop
//! conversions leave useful caches behind even when a later edge fails.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::parameters;
use crate::planner::ConversionPath;
use crate::registry::ConversionFailure;
use crate::store::Provenance;
use crate::types::params::ParamName;
use crate::types::region::RegionState;
use crate::types::representation::{Representation, RepresentationKind};

/// Error type for chain execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// The chain's starting representation is not cached. Internal
    /// consistency violation: the planner only starts from available kinds.
    #[error("no cached representation of kind {0} to start the conversion chain")]
    MissingStart(RepresentationKind),
    /// A rule implementation failed at runtime. Intermediates already
    /// computed stay cached; only the requested final kind is unavailable.
    #[error(transparent)]
    Rule(#[from] ConversionFailure),
}

/// Execute a planned chain against a region's state.
///
/// Returns a handle to the final representation, which is cached by the time
/// this returns. Rule defaults are materialized lazily right before each
/// edge runs.
pub fn execute(
    region: &mut RegionState,
    path: &ConversionPath,
) -> Result<Arc<Representation>, ExecutionError> {
    let mut current = region
        .store
        .value(path.start())
        .ok_or_else(|| ExecutionError::MissingStart(path.start()))?;

    for rule in path.steps() {
        let specs = rule.parameters();
        parameters::ensure_defaults(&mut region.parameters, &specs);

        let params_used: BTreeMap<ParamName, f64> = specs
            .iter()
            .filter_map(|spec| {
                region
                    .parameters
                    .value_of(&spec.name)
                    .map(|v| (spec.name.clone(), v))
            })
            .collect();

        tracing::debug!(
            region = %region.id(),
            rule = rule.name(),
            source = %rule.source_kind(),
            target = %rule.target_kind(),
            "running conversion"
        );

        let produced = rule.convert(&current, &region.parameters).map_err(|e| {
            tracing::warn!(
                region = %region.id(),
                rule = rule.name(),
                error = %e,
                "conversion rule failed"
            );
            e
        })?;

        if produced.kind() != rule.target_kind() {
            return Err(ExecutionError::Rule(ConversionFailure::new(
                rule.name(),
                format!(
                    "produced {} but rule targets {}",
                    produced.kind(),
                    rule.target_kind()
                ),
            )));
        }

        let provenance = Provenance {
            source_kind: current.kind(),
            rule: rule.name().to_string(),
            params_used,
            master_revision: region.store.master_revision(),
        };
        current = region.store.set_derived(produced, provenance);
    }

    Ok(current)
}
