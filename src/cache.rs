//! The segmentation cache facade.
//!
//! Owns every region and wires the components together: a `get` miss asks the
//! planner for a chain from the region's available kinds, the executor runs
//! it, and every mutation routes through the store and parameter components
//! so invalidation stays synchronous and precise.
//!
//! ## Concurrency Contract
//!
//! Each region's store, parameter set and master declaration live behind one
//! `parking_lot::Mutex`. A `get` that has to convert holds that mutex for the
//! whole chain, so concurrent `get` calls for the same pending kind coalesce:
//! the second caller blocks, then observes the cache hit, and the conversion
//! never runs twice. Conversions for different regions run in parallel; the
//! rule registry is read-only after startup. There is no cancellation hook —
//! rule implementations are opaque, so none could be honored mid-edge.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::executor::{self, ExecutionError};
use crate::parameters::{self, ParameterError};
use crate::planner::{ConversionPathPlanner, PlanError};
use crate::registry::{ConversionFailure, ConversionRuleRegistry};
use crate::types::geometry::Volume;
use crate::types::params::ParamName;
use crate::types::region::{RegionId, RegionState};
use crate::types::representation::{Representation, RepresentationKind};

/// Error type for cache operations.
///
/// All errors are values; the cache never silently substitutes a stale or
/// wrong-kind representation for a requested one.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheError {
    /// Unknown region.
    #[error("region not found: {0}")]
    RegionNotFound(RegionId),
    /// Planning failed: no path, or a required parameter is unset.
    #[error(transparent)]
    Plan(#[from] PlanError),
    /// A rule implementation failed at runtime.
    #[error(transparent)]
    Conversion(#[from] ConversionFailure),
    /// A parameter mutation was rejected.
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    /// Registry or store misuse — a programmer error, failed fast.
    #[error("invalid mutation: {0}")]
    InvalidMutation(String),
}

impl From<ExecutionError> for CacheError {
    fn from(e: ExecutionError) -> Self {
        match e {
            ExecutionError::Rule(failure) => Self::Conversion(failure),
            ExecutionError::MissingStart(kind) => {
                Self::InvalidMutation(format!("conversion chain started from uncached {kind}"))
            }
        }
    }
}

/// One region's slot: its exclusively-owned state behind a mutex.
#[derive(Debug)]
struct RegionSlot {
    state: Mutex<RegionState>,
}

/// The representation conversion cache.
///
/// Stores, per region, which representations exist and which is master;
/// lazily computes and caches derived representations via the shared rule
/// registry; invalidates precisely when the master or a consumed parameter
/// changes.
pub struct SegmentationCache {
    registry: Arc<ConversionRuleRegistry>,
    planner: ConversionPathPlanner,
    regions: RwLock<BTreeMap<RegionId, Arc<RegionSlot>>>,
}

impl SegmentationCache {
    /// Create a cache over a shared rule registry.
    pub fn new(registry: Arc<ConversionRuleRegistry>) -> Self {
        Self {
            planner: ConversionPathPlanner::new(Arc::clone(&registry)),
            registry,
            regions: RwLock::new(BTreeMap::new()),
        }
    }

    /// The shared rule registry.
    pub fn registry(&self) -> &Arc<ConversionRuleRegistry> {
        &self.registry
    }

    // ── Region lifecycle ────────────────────────────────────────────────

    /// Create an empty region.
    pub fn create_region(&self) -> RegionId {
        let id = RegionId::random();
        self.insert_slot(RegionState::new(id));
        id
    }

    /// Create a region seeded with one representation, optionally declared
    /// master.
    pub fn create_region_with(&self, rep: Representation, master: bool) -> RegionId {
        let id = RegionId::random();
        let mut state = RegionState::new(id);
        let kind = rep.kind();
        state.store.set(rep);
        if master {
            state.store.declare_master(kind);
        }
        self.insert_slot(state);
        id
    }

    /// Create a region whose ground truth is an existing indexed volume.
    ///
    /// Seeds an `IndexedLabelmap` master and permanently locks rasterization
    /// parameters for this region.
    pub fn create_region_from_volume(&self, volume: Volume) -> RegionId {
        let id = RegionId::random();
        let mut state = RegionState::new_from_volume(id);
        state.store.set(Representation::IndexedLabelmap(volume));
        state
            .store
            .declare_master(RepresentationKind::IndexedLabelmap);
        self.insert_slot(state);
        id
    }

    /// Destroy a region together with all its cached representations.
    /// Returns true when the region existed.
    pub fn remove_region(&self, region: RegionId) -> bool {
        self.regions.write().remove(&region).is_some()
    }

    /// True when the region exists.
    pub fn contains_region(&self, region: RegionId) -> bool {
        self.regions.read().contains_key(&region)
    }

    /// All region ids, in canonical order.
    pub fn region_ids(&self) -> Vec<RegionId> {
        self.regions.read().keys().copied().collect()
    }

    // ── Representation operations ───────────────────────────────────────

    /// Get a representation of `kind`, converting on a cache miss.
    ///
    /// A hit returns the same handle as the previous call; a miss plans the
    /// cheapest chain from the region's available kinds (master first), runs
    /// it, caches every intermediate, and returns the freshly cached value.
    pub fn get(
        &self,
        region: RegionId,
        kind: RepresentationKind,
    ) -> Result<Arc<Representation>, CacheError> {
        let slot = self.slot(region)?;
        let mut state = slot.state.lock();

        if let Some(value) = state.store.value(kind) {
            return Ok(value);
        }

        let available = state.store.planning_order();
        let path = self.planner.plan(&available, kind, state.parameters())?;
        let value = executor::execute(&mut state, &path)?;
        Ok(value)
    }

    /// Replace (or create) the stored representation of the payload's kind.
    ///
    /// Master-kind writes (or writes while no master is declared) drop every
    /// other cached kind; non-master writes do not cascade.
    pub fn set(&self, region: RegionId, rep: Representation) -> Result<(), CacheError> {
        let slot = self.slot(region)?;
        let mut state = slot.state.lock();
        state.store.set(rep);
        Ok(())
    }

    /// Delete a cached kind. Removing the master clears the master
    /// declaration and drops everything else; a new master must be declared
    /// before further reads succeed.
    pub fn remove(
        &self,
        region: RegionId,
        kind: RepresentationKind,
    ) -> Result<bool, CacheError> {
        let slot = self.slot(region)?;
        let mut state = slot.state.lock();
        Ok(state.store.remove(kind))
    }

    /// Cache-membership check; never triggers computation.
    pub fn has(&self, region: RegionId, kind: RepresentationKind) -> Result<bool, CacheError> {
        let slot = self.slot(region)?;
        let state = slot.state.lock();
        Ok(state.store.has(kind))
    }

    /// Currently cached kinds, without forcing computation.
    pub fn cached_kinds(&self, region: RegionId) -> Result<Vec<RepresentationKind>, CacheError> {
        let slot = self.slot(region)?;
        let state = slot.state.lock();
        Ok(state.store.kinds())
    }

    /// True when a `get` for `kind` would succeed without running anything
    /// new or a conversion chain exists to produce it.
    pub fn can_convert(
        &self,
        region: RegionId,
        kind: RepresentationKind,
    ) -> Result<bool, CacheError> {
        let slot = self.slot(region)?;
        let state = slot.state.lock();
        if state.store.has(kind) {
            return Ok(true);
        }
        let available = state.store.planning_order();
        Ok(self.planner.plan(&available, kind, state.parameters()).is_ok())
    }

    // ── Master declaration ──────────────────────────────────────────────

    /// Which kind is authoritative for the region, if declared.
    pub fn master_kind(
        &self,
        region: RegionId,
    ) -> Result<Option<RepresentationKind>, CacheError> {
        let slot = self.slot(region)?;
        let state = slot.state.lock();
        Ok(state.store.master_kind())
    }

    /// Declare which cached kind is authoritative.
    ///
    /// Fails fast when no representation of that kind is cached: the master
    /// must always exist.
    pub fn set_master_kind(
        &self,
        region: RegionId,
        kind: RepresentationKind,
    ) -> Result<(), CacheError> {
        let slot = self.slot(region)?;
        let mut state = slot.state.lock();
        if !state.store.declare_master(kind) {
            return Err(CacheError::InvalidMutation(format!(
                "cannot declare uncached kind {kind} as master"
            )));
        }
        Ok(())
    }

    /// True when the region was created from an existing indexed volume.
    pub fn created_from_volume(&self, region: RegionId) -> Result<bool, CacheError> {
        let slot = self.slot(region)?;
        let state = slot.state.lock();
        Ok(state.created_from_volume())
    }

    // ── Parameters ──────────────────────────────────────────────────────

    /// Read a parameter: `(value, explicitly_set)`.
    pub fn parameter(
        &self,
        region: RegionId,
        name: &ParamName,
    ) -> Result<Option<(f64, bool)>, CacheError> {
        let slot = self.slot(region)?;
        let state = slot.state.lock();
        Ok(parameters::get(&state, name))
    }

    /// Set a parameter explicitly, invalidating representations computed
    /// with a different value. Rejected on locked parameters of
    /// volume-derived regions.
    pub fn set_parameter(
        &self,
        region: RegionId,
        name: ParamName,
        value: f64,
    ) -> Result<(), CacheError> {
        let slot = self.slot(region)?;
        let mut state = slot.state.lock();
        parameters::set(&mut state, name, value)?;
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn insert_slot(&self, state: RegionState) {
        let id = state.id();
        self.regions.write().insert(
            id,
            Arc::new(RegionSlot {
                state: Mutex::new(state),
            }),
        );
    }

    pub(crate) fn slot_state<R>(
        &self,
        region: RegionId,
        f: impl FnOnce(&mut RegionState) -> R,
    ) -> Result<R, CacheError> {
        let slot = self.slot(region)?;
        let mut state = slot.state.lock();
        Ok(f(&mut state))
    }

    pub(crate) fn insert_region_state(&self, state: RegionState) -> Result<RegionId, CacheError> {
        let id = state.id();
        if self.contains_region(id) {
            return Err(CacheError::InvalidMutation(format!(
                "region {id} already exists"
            )));
        }
        self.insert_slot(state);
        Ok(id)
    }

    fn slot(&self, region: RegionId) -> Result<Arc<RegionSlot>, CacheError> {
        self.regions
            .read()
            .get(&region)
            .cloned()
            .ok_or(CacheError::RegionNotFound(region))
    }
}

impl std::fmt::Debug for SegmentationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationCache")
            .field("regions", &self.regions.read().len())
            .field("rules", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConversionRule;
    use crate::types::geometry::Mesh;
    use crate::types::params::{ConversionParameterSet, ParameterSpec};

    use crate::types::representation::RepresentationKind::{
        ClosedSurfaceModel, IndexedLabelmap, RibbonModel,
    };

    struct StubRule {
        name: &'static str,
        source: RepresentationKind,
        target: RepresentationKind,
        params: Vec<ParameterSpec>,
    }

    impl ConversionRule for StubRule {
        fn name(&self) -> &str {
            self.name
        }
        fn source_kind(&self) -> RepresentationKind {
            self.source
        }
        fn target_kind(&self) -> RepresentationKind {
            self.target
        }
        fn cost(&self) -> u64 {
            1
        }
        fn parameters(&self) -> Vec<ParameterSpec> {
            self.params.clone()
        }
        fn convert(
            &self,
            _source: &Representation,
            _params: &ConversionParameterSet,
        ) -> Result<Representation, ConversionFailure> {
            Ok(match self.target {
                IndexedLabelmap => {
                    Representation::IndexedLabelmap(Volume::filled([2, 2, 2], 1))
                }
                ClosedSurfaceModel => {
                    Representation::ClosedSurfaceModel(Mesh::new(vec![[0.0; 3]], vec![]))
                }
                RibbonModel => Representation::RibbonModel(Mesh::new(vec![[0.0; 3]], vec![])),
                other => panic!("unexpected target {other}"),
            })
        }
    }

    fn contour_registry() -> Arc<ConversionRuleRegistry> {
        let registry = ConversionRuleRegistry::new();
        registry
            .register(Arc::new(StubRule {
                name: "rasterize",
                source: RibbonModel,
                target: IndexedLabelmap,
                params: vec![ParameterSpec::with_default(
                    "rasterization_oversampling_factor",
                    2.0,
                )],
            }))
            .unwrap();
        registry
            .register(Arc::new(StubRule {
                name: "extract_surface",
                source: IndexedLabelmap,
                target: ClosedSurfaceModel,
                params: vec![ParameterSpec::with_default(
                    "decimation_target_reduction_factor",
                    0.0,
                )],
            }))
            .unwrap();
        Arc::new(registry)
    }

    fn ribbon() -> Representation {
        Representation::RibbonModel(Mesh::new(vec![[0.0; 3]], vec![]))
    }

    #[test]
    fn test_get_is_idempotent() {
        let cache = SegmentationCache::new(contour_registry());
        let region = cache.create_region_with(ribbon(), true);

        let first = cache.get(region, IndexedLabelmap).unwrap();
        let second = cache.get(region, IndexedLabelmap).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_get_unknown_region() {
        let cache = SegmentationCache::new(contour_registry());
        let err = cache.get(RegionId::random(), IndexedLabelmap).unwrap_err();
        assert!(matches!(err, CacheError::RegionNotFound(_)));
    }

    #[test]
    fn test_master_exclusivity() {
        let cache = SegmentationCache::new(contour_registry());
        let region = cache.create_region_with(ribbon(), true);

        assert_eq!(cache.master_kind(region).unwrap(), Some(RibbonModel));
        assert!(cache.has(region, RibbonModel).unwrap());

        // Declaring an uncached kind fails fast and changes nothing.
        let err = cache.set_master_kind(region, ClosedSurfaceModel).unwrap_err();
        assert!(matches!(err, CacheError::InvalidMutation(_)));
        assert_eq!(cache.master_kind(region).unwrap(), Some(RibbonModel));
    }

    #[test]
    fn test_remove_master_then_reads_fail() {
        let cache = SegmentationCache::new(contour_registry());
        let region = cache.create_region_with(ribbon(), true);
        cache.get(region, IndexedLabelmap).unwrap();

        assert!(cache.remove(region, RibbonModel).unwrap());
        assert_eq!(cache.master_kind(region).unwrap(), None);
        assert!(cache.cached_kinds(region).unwrap().is_empty());

        let err = cache.get(region, IndexedLabelmap).unwrap_err();
        assert!(matches!(err, CacheError::Plan(PlanError::NoPath { .. })));

        // Declaring a new master restores reads.
        cache.set(region, ribbon()).unwrap();
        cache.set_master_kind(region, RibbonModel).unwrap();
        assert!(cache.get(region, IndexedLabelmap).is_ok());
    }

    #[test]
    fn test_volume_region_rejects_locked_parameter() {
        let cache = SegmentationCache::new(contour_registry());
        let region = cache.create_region_from_volume(Volume::filled([4, 4, 4], 1));

        let err = cache
            .set_parameter(
                region,
                ParamName::new("rasterization_oversampling_factor"),
                2.0,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CacheError::Parameter(ParameterError::Locked { .. })
        ));
        assert!(cache.has(region, IndexedLabelmap).unwrap());
    }

    #[test]
    fn test_can_convert_does_not_compute() {
        let cache = SegmentationCache::new(contour_registry());
        let region = cache.create_region_with(ribbon(), true);

        assert!(cache.can_convert(region, ClosedSurfaceModel).unwrap());
        assert!(!cache.has(region, ClosedSurfaceModel).unwrap());
        assert!(!cache.can_convert(region, RepresentationKind::PlanarContour).unwrap());
    }

    #[test]
    fn test_parallel_gets_coalesce() {
        let cache = Arc::new(SegmentationCache::new(contour_registry()));
        let region = cache.create_region_with(ribbon(), true);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get(region, ClosedSurfaceModel).unwrap())
            })
            .collect();

        let results: Vec<Arc<Representation>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        for pair in results.windows(2) {
            assert!(Arc::ptr_eq(&pair[0], &pair[1]));
        }
    }
}
