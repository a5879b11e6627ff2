//! Parameter store: named conversion parameters scoped to a region.
//!
//! Writes flow through here so that locked parameters are rejected, epsilon
//! no-ops never invalidate anything, and real value changes synchronously
//! notify the invalidation policy.

use crate::invalidation;
use crate::types::params::{values_equal, ConversionParameterSet, ParamName, ParameterSpec};
use crate::types::region::RegionState;

/// Error type for parameter mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParameterError {
    /// The parameter may never change on a region created from a volume; the
    /// labelmap is original source data there and cannot be re-derived.
    #[error("parameter '{name}' is locked on a region created from a volume")]
    Locked {
        /// Name of the rejected parameter.
        name: ParamName,
    },
}

/// Read a parameter: `(value, explicitly_set)`.
pub fn get(region: &RegionState, name: &ParamName) -> Option<(f64, bool)> {
    region.parameters.get(name).map(|v| (v.value, v.explicit))
}

/// Set a parameter explicitly.
///
/// Rejected outright on locked parameters of volume-derived regions, leaving
/// region state untouched. A value equal (within epsilon) to the current one
/// is a no-op apart from upgrading the explicit flag; an actual change writes
/// the value and drops every cached representation computed with a different
/// one.
pub fn set(region: &mut RegionState, name: ParamName, value: f64) -> Result<(), ParameterError> {
    if region.created_from_volume() && name.locked_for_volume_regions() {
        return Err(ParameterError::Locked { name });
    }

    if let Some(existing) = region.parameters.get(&name) {
        if values_equal(existing.value, value) {
            // Same value; keep the recorded one so cached provenance still
            // compares equal, but remember the caller pinned it.
            if !existing.explicit {
                region.parameters.set_explicit(name, existing.value);
            }
            return Ok(());
        }
    }

    region.parameters.set_explicit(name.clone(), value);
    invalidation::on_parameter_changed(&mut region.store, &name, value);
    Ok(())
}

/// Materialize rule defaults for any declared parameter that has no value
/// yet. Called lazily by the executor right before a rule runs; never
/// invalidates, since nothing can have been computed with a different value
/// for a previously-unset parameter.
pub fn ensure_defaults(params: &mut ConversionParameterSet, specs: &[ParameterSpec]) {
    for spec in specs {
        if let Some(default) = spec.default {
            params.set_default(spec.name.clone(), default);
        }
    }
}

/// Restore an explicit parameter value during a bulk load, with invalidation
/// suppressed.
pub(crate) fn restore(region: &mut RegionState, name: ParamName, value: f64) {
    region.parameters.set_explicit(name, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Provenance;
    use crate::types::geometry::{Mesh, Volume};
    use crate::types::params::{
        DEFAULT_OVERSAMPLING_FACTOR, RASTERIZATION_OVERSAMPLING_FACTOR, REFERENCE_VOLUME,
    };
    use crate::types::region::RegionId;
    use crate::types::representation::{Representation, RepresentationKind};
    use std::collections::BTreeMap;

    fn oversampling() -> ParamName {
        ParamName::new(RASTERIZATION_OVERSAMPLING_FACTOR)
    }

    #[test]
    fn test_set_and_get() {
        let mut region = RegionState::new(RegionId::random());
        set(&mut region, oversampling(), 3.0).unwrap();
        assert_eq!(get(&region, &oversampling()), Some((3.0, true)));
        assert_eq!(get(&region, &ParamName::new("absent")), None);
    }

    #[test]
    fn test_locked_on_volume_region() {
        let mut region = RegionState::new_from_volume(RegionId::random());
        region.store.set(Representation::IndexedLabelmap(Volume::filled([2, 2, 2], 1)));
        region
            .store
            .declare_master(RepresentationKind::IndexedLabelmap);

        let err = set(&mut region, oversampling(), 2.0).unwrap_err();
        assert_eq!(
            err,
            ParameterError::Locked {
                name: oversampling()
            }
        );
        let err = set(&mut region, ParamName::new(REFERENCE_VOLUME), 7.0).unwrap_err();
        assert!(matches!(err, ParameterError::Locked { .. }));

        // Region state untouched.
        assert!(region.store.has(RepresentationKind::IndexedLabelmap));
        assert_eq!(get(&region, &oversampling()), None);
    }

    #[test]
    fn test_unlocked_parameter_on_volume_region() {
        let mut region = RegionState::new_from_volume(RegionId::random());
        set(
            &mut region,
            ParamName::new("decimation_target_reduction_factor"),
            0.5,
        )
        .unwrap();
    }

    #[test]
    fn test_epsilon_no_op_preserves_cache() {
        let mut region = RegionState::new(RegionId::random());
        region.store.set(Representation::RibbonModel(Mesh::new(vec![[0.0; 3]], vec![])));
        region.store.declare_master(RepresentationKind::RibbonModel);

        let mut params_used = BTreeMap::new();
        params_used.insert(oversampling(), DEFAULT_OVERSAMPLING_FACTOR);
        region.store.set_derived(
            Representation::IndexedLabelmap(Volume::filled([2, 2, 2], 1)),
            Provenance {
                source_kind: RepresentationKind::RibbonModel,
                rule: "rasterize".to_string(),
                params_used,
                master_revision: 1,
            },
        );

        // Default was materialized earlier; caller now pins the same value.
        region
            .parameters
            .set_default(oversampling(), DEFAULT_OVERSAMPLING_FACTOR);
        set(&mut region, oversampling(), DEFAULT_OVERSAMPLING_FACTOR).unwrap();

        assert!(region.store.has(RepresentationKind::IndexedLabelmap));
        assert_eq!(
            get(&region, &oversampling()),
            Some((DEFAULT_OVERSAMPLING_FACTOR, true))
        );
    }

    #[test]
    fn test_value_change_invalidates() {
        let mut region = RegionState::new(RegionId::random());
        region.store.set(Representation::RibbonModel(Mesh::new(vec![[0.0; 3]], vec![])));
        region.store.declare_master(RepresentationKind::RibbonModel);

        let mut params_used = BTreeMap::new();
        params_used.insert(oversampling(), 2.0);
        region.store.set_derived(
            Representation::IndexedLabelmap(Volume::filled([2, 2, 2], 1)),
            Provenance {
                source_kind: RepresentationKind::RibbonModel,
                rule: "rasterize".to_string(),
                params_used,
                master_revision: 1,
            },
        );

        set(&mut region, oversampling(), 4.0).unwrap();
        assert!(!region.store.has(RepresentationKind::IndexedLabelmap));
        assert!(region.store.has(RepresentationKind::RibbonModel));
    }

    #[test]
    fn test_ensure_defaults_only_fills_gaps() {
        let mut params = ConversionParameterSet::new();
        params.set_explicit(oversampling(), 4.0);
        ensure_defaults(
            &mut params,
            &[
                ParameterSpec::with_default(
                    RASTERIZATION_OVERSAMPLING_FACTOR,
                    DEFAULT_OVERSAMPLING_FACTOR,
                ),
                ParameterSpec::with_default("decimation_target_reduction_factor", 0.0),
                ParameterSpec::required(REFERENCE_VOLUME),
            ],
        );

        assert_eq!(params.value_of(&oversampling()), Some(4.0));
        assert_eq!(
            params.value_of(&ParamName::new("decimation_target_reduction_factor")),
            Some(0.0)
        );
        // Required-with-no-default is never invented.
        assert!(!params.contains(&ParamName::new(REFERENCE_VOLUME)));
    }
}
