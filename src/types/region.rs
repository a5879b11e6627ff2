//! Region identity and per-region owned state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::RepresentationStore;
use crate::types::params::ConversionParameterSet;

/// Unique identifier for a region (a contour or a segment).
///
/// Wraps a UUID and implements `Ord` for deterministic ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(Uuid);

impl RegionId {
    /// Create a RegionId from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a fresh random RegionId.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::str::FromStr for RegionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything one region exclusively owns: its representation store and its
/// parameter set.
///
/// A `RegionState` lives behind a single mutex inside the cache; no
/// representation is ever shared by reference across regions.
#[derive(Debug)]
pub struct RegionState {
    id: RegionId,
    created_from_volume: bool,
    /// Cached representations plus master bookkeeping.
    pub(crate) store: RepresentationStore,
    /// Named conversion parameters.
    pub(crate) parameters: ConversionParameterSet,
}

impl RegionState {
    /// Create an empty region.
    pub fn new(id: RegionId) -> Self {
        Self {
            id,
            created_from_volume: false,
            store: RepresentationStore::new(),
            parameters: ConversionParameterSet::new(),
        }
    }

    /// Create a region whose ground truth is an existing indexed volume.
    ///
    /// Such regions permanently refuse changes to rasterization parameters.
    pub fn new_from_volume(id: RegionId) -> Self {
        Self {
            created_from_volume: true,
            ..Self::new(id)
        }
    }

    /// Region identifier.
    pub fn id(&self) -> RegionId {
        self.id
    }

    /// True when the region was derived from an existing indexed volume.
    pub fn created_from_volume(&self) -> bool {
        self.created_from_volume
    }

    /// The region's representation store.
    pub fn store(&self) -> &RepresentationStore {
        &self.store
    }

    /// The region's parameter set.
    pub fn parameters(&self) -> &ConversionParameterSet {
        &self.parameters
    }
}
