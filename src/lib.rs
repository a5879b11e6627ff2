//! # segmentation-kernel
//!
//! Lazy representation conversion cache for segmentation geometry.
//!
//! A region of interest (a radiotherapy contour or segment) can be encoded as
//! a ribbon mesh, an indexed labelmap volume, a closed watertight surface, or
//! a planar contour stack. The kernel answers one question:
//!
//! > Given a region and a requested representation kind, hand back a
//! > representation that is **consistent with the region's master** — cached
//! > if possible, converted on demand if not.
//!
//! ## Core Contract
//!
//! 1. Per region, track which representations exist and which is master
//! 2. Plan the lowest-cost chain of registered conversion rules from any
//!    available kind to the requested one
//! 3. Cache every intermediate; invalidate precisely when the master content
//!    or a consumed parameter value changes
//!
//! ## Architecture
//!
//! ```text
//! get(region, kind) → RepresentationStore → ConversionPathPlanner → ConversionExecutor
//!                            ↓                      ↓
//!                    InvalidationPolicy    ConversionRuleRegistry
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same available kinds + same registry + same parameters → identical plan
//! - Equal-cost paths tie-break by available-kind order, then registration
//!   order
//! - All per-region maps are BTreeMaps; iteration order is canonical
//!
//! Conversion rule implementations (rasterizer, surface extractor, decimator,
//! contour stacker) are external plug-ins behind the [`ConversionRule`]
//! trait; the kernel orchestrates *when* and *whether* they run, never *how*.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod canonical;
pub mod executor;
pub mod invalidation;
pub mod parameters;
pub mod planner;
pub mod registry;
pub mod snapshot;
pub mod store;
pub mod types;

// Re-exports
pub use cache::{CacheError, SegmentationCache};
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
pub use executor::ExecutionError;
pub use parameters::ParameterError;
pub use planner::{ConversionPath, ConversionPathPlanner, PlanError};
pub use registry::{ConversionFailure, ConversionRule, ConversionRuleRegistry, RegistryError};
pub use snapshot::RegionSnapshot;
pub use store::{CachedRepresentation, Provenance, RepresentationStore};
pub use types::{
    ContourStack, ConversionParameterSet, Mesh, ParamName, ParameterSpec, ParameterValue, Plane,
    PlanarPolyline, Point3, RegionId, RegionState, Representation, RepresentationKind,
    UnknownKindError, Volume,
    DECIMATION_TARGET_REDUCTION_FACTOR, DEFAULT_DECIMATION_FACTOR, DEFAULT_OVERSAMPLING_FACTOR,
    RASTERIZATION_OVERSAMPLING_FACTOR, REFERENCE_VOLUME,
};

/// Schema version for all kernel types.
/// Increment on breaking changes to any snapshot or provenance type.
pub const SEGMENTATION_SCHEMA_VERSION: &str = "1.0.0";
