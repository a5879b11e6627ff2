//! Region snapshots for the storage collaborator.
//!
//! On save, a snapshot captures each currently-cached kind (never forcing
//! computation of absent ones), the master declaration, and the explicitly
//! set parameter values. On load, everything is restored in bulk-load mode:
//! representations and parameters go in with invalidation suppressed, and the
//! master is declared last.
//!
//! A deterministic xxh64 digest over the canonical serialization lets a
//! loader detect drift between the header and the payload it recovered.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheError, SegmentationCache};
use crate::canonical::canonical_hash_hex;
use crate::types::params::ParamName;
use crate::types::region::{RegionId, RegionState};
use crate::types::representation::{Representation, RepresentationKind};
use crate::SEGMENTATION_SCHEMA_VERSION;

/// A serializable capture of one region's cached state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSnapshot {
    /// Schema version the snapshot was written with.
    pub schema_version: String,
    /// The captured region.
    pub region: RegionId,
    /// Master declaration at capture time.
    pub master_kind: Option<RepresentationKind>,
    /// Whether the region's ground truth is an existing indexed volume.
    pub created_from_volume: bool,
    /// Explicitly set parameter values only; lazily materialized defaults
    /// are not persisted.
    pub parameters: BTreeMap<ParamName, f64>,
    /// Every cached representation at capture time.
    pub representations: BTreeMap<RepresentationKind, Representation>,
    /// xxh64 digest of the fields above, hex-encoded.
    pub digest: String,
}

/// The digest input: every snapshot field except the digest itself.
#[derive(Serialize)]
struct DigestInput<'a> {
    schema_version: &'a str,
    region: &'a RegionId,
    master_kind: &'a Option<RepresentationKind>,
    created_from_volume: bool,
    parameters: &'a BTreeMap<ParamName, f64>,
    representations: &'a BTreeMap<RepresentationKind, Representation>,
}

impl RegionSnapshot {
    fn compute_digest(&self) -> String {
        canonical_hash_hex(&DigestInput {
            schema_version: &self.schema_version,
            region: &self.region,
            master_kind: &self.master_kind,
            created_from_volume: self.created_from_volume,
            parameters: &self.parameters,
            representations: &self.representations,
        })
    }

    /// True when the digest matches the snapshot content.
    pub fn verify(&self) -> bool {
        self.digest == self.compute_digest()
    }
}

impl SegmentationCache {
    /// Capture a region's cached state for persistence.
    ///
    /// Only what is already cached is captured; nothing is computed.
    pub fn export_region(&self, region: RegionId) -> Result<RegionSnapshot, CacheError> {
        self.slot_state(region, |state| {
            let representations: BTreeMap<RepresentationKind, Representation> = state
                .store
                .iter()
                .map(|(kind, entry)| (*kind, (*entry.value).clone()))
                .collect();
            let mut snapshot = RegionSnapshot {
                schema_version: SEGMENTATION_SCHEMA_VERSION.to_string(),
                region: state.id(),
                master_kind: state.store.master_kind(),
                created_from_volume: state.created_from_volume(),
                parameters: state.parameters.explicit_values(),
                representations,
                digest: String::new(),
            };
            snapshot.digest = snapshot.compute_digest();
            snapshot
        })
    }

    /// Recreate a region from a snapshot, in bulk-load mode.
    ///
    /// Invalidation side effects are suppressed during the restore; the
    /// master declaration is applied last. Fails fast on a digest mismatch,
    /// an already-existing region, or a master kind with no restored
    /// representation.
    pub fn restore_region(&self, snapshot: &RegionSnapshot) -> Result<RegionId, CacheError> {
        if !snapshot.verify() {
            return Err(CacheError::InvalidMutation(format!(
                "snapshot digest mismatch for region {}",
                snapshot.region
            )));
        }
        if let Some(master) = snapshot.master_kind {
            if !snapshot.representations.contains_key(&master) {
                return Err(CacheError::InvalidMutation(format!(
                    "snapshot declares master {master} but carries no such representation"
                )));
            }
        }

        let mut state = if snapshot.created_from_volume {
            RegionState::new_from_volume(snapshot.region)
        } else {
            RegionState::new(snapshot.region)
        };

        for rep in snapshot.representations.values() {
            state.store.insert_restored(rep.clone());
        }
        for (name, value) in &snapshot.parameters {
            crate::parameters::restore(&mut state, name.clone(), *value);
        }
        state.store.set_master_unchecked(snapshot.master_kind);

        self.insert_region_state(state)
    }
}
