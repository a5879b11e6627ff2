//! Core types for the segmentation kernel.

pub mod geometry;
pub mod params;
pub mod region;
pub mod representation;

pub use geometry::{ContourStack, Mesh, Plane, PlanarPolyline, Point3, Volume};
pub use params::{
    values_equal, ConversionParameterSet, ParamName, ParameterSpec, ParameterValue,
    DECIMATION_TARGET_REDUCTION_FACTOR, DEFAULT_DECIMATION_FACTOR, DEFAULT_OVERSAMPLING_FACTOR,
    PARAM_EPSILON, RASTERIZATION_OVERSAMPLING_FACTOR, REFERENCE_VOLUME,
};
pub use region::{RegionId, RegionState};
pub use representation::{Representation, RepresentationKind, UnknownKindError};
