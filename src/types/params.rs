//! Named conversion parameters.
//!
//! Parameters are named doubles scoped to a region. An absent entry means
//! "unset" — there is no `-1.0` sentinel. Each entry remembers whether it was
//! set explicitly by a caller or materialized lazily from a rule default, so
//! storage collaborators can persist only the explicit ones.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Oversampling factor consumed by rasterization rules (`* -> IndexedLabelmap`).
pub const RASTERIZATION_OVERSAMPLING_FACTOR: &str = "rasterization_oversampling_factor";

/// Target reduction factor consumed by decimation rules (`* -> ClosedSurfaceModel`).
pub const DECIMATION_TARGET_REDUCTION_FACTOR: &str = "decimation_target_reduction_factor";

/// Opaque handle of the reference volume used to define rasterization geometry.
pub const REFERENCE_VOLUME: &str = "reference_volume";

/// Default oversampling factor applied when no explicit value exists.
pub const DEFAULT_OVERSAMPLING_FACTOR: f64 = 2.0;

/// Default decimation target reduction applied when no explicit value exists.
pub const DEFAULT_DECIMATION_FACTOR: f64 = 0.0;

/// Relative epsilon for parameter value comparison.
pub const PARAM_EPSILON: f64 = 1e-6;

/// Name of a conversion parameter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamName(String);

impl ParamName {
    /// Create a parameter name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when this parameter may never change on a region created from an
    /// existing volume (the labelmap is original source data there and cannot
    /// be re-derived).
    pub fn locked_for_volume_regions(&self) -> bool {
        self.0 == RASTERIZATION_OVERSAMPLING_FACTOR || self.0 == REFERENCE_VOLUME
    }
}

impl From<&str> for ParamName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for ParamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A parameter a conversion rule declares it consumes.
///
/// A spec with no default must be explicitly set before the rule is plannable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name.
    pub name: ParamName,
    /// Default applied lazily the first time the rule runs, if any.
    pub default: Option<f64>,
}

impl ParameterSpec {
    /// A required parameter with no default.
    pub fn required(name: impl Into<ParamName>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    /// A required parameter with a lazily-applied default.
    pub fn with_default(name: impl Into<ParamName>, default: f64) -> Self {
        Self {
            name: name.into(),
            default: Some(default),
        }
    }
}

/// One stored parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterValue {
    /// Current value.
    pub value: f64,
    /// True when a caller set it; false when it came from a rule default.
    pub explicit: bool,
}

/// Named, typed conversion parameters for one region.
///
/// BTreeMap-backed for deterministic iteration and hashing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionParameterSet {
    values: BTreeMap<ParamName, ParameterValue>,
}

impl ConversionParameterSet {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored entry for a name, if any.
    pub fn get(&self, name: &ParamName) -> Option<ParameterValue> {
        self.values.get(name).copied()
    }

    /// Current value for a name, explicit or default.
    pub fn value_of(&self, name: &ParamName) -> Option<f64> {
        self.values.get(name).map(|v| v.value)
    }

    /// True when any value (explicit or default) exists for the name.
    pub fn contains(&self, name: &ParamName) -> bool {
        self.values.contains_key(name)
    }

    /// Write an explicit value, replacing whatever was there.
    pub fn set_explicit(&mut self, name: ParamName, value: f64) {
        self.values.insert(
            name,
            ParameterValue {
                value,
                explicit: true,
            },
        );
    }

    /// Materialize a default. No-op when any value already exists.
    pub fn set_default(&mut self, name: ParamName, value: f64) {
        self.values.entry(name).or_insert(ParameterValue {
            value,
            explicit: false,
        });
    }

    /// All explicitly-set values, for persistence.
    pub fn explicit_values(&self) -> BTreeMap<ParamName, f64> {
        self.values
            .iter()
            .filter(|(_, v)| v.explicit)
            .map(|(k, v)| (k.clone(), v.value))
            .collect()
    }

    /// Iterate over all entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&ParamName, &ParameterValue)> {
        self.values.iter()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Compare two parameter values with a relative epsilon.
///
/// Exact equality short-circuits so that infinities and zeros compare cleanly.
pub fn values_equal(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= PARAM_EPSILON * scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_equal_epsilon() {
        assert!(values_equal(2.0, 2.0));
        assert!(values_equal(2.0, 2.0 + 1e-9));
        assert!(!values_equal(2.0, 2.1));
        assert!(values_equal(1_000_000.0, 1_000_000.5));
        assert!(!values_equal(0.0, 1e-3));
    }

    #[test]
    fn test_default_never_overwrites() {
        let mut set = ConversionParameterSet::new();
        let name = ParamName::new(RASTERIZATION_OVERSAMPLING_FACTOR);

        set.set_explicit(name.clone(), 4.0);
        set.set_default(name.clone(), DEFAULT_OVERSAMPLING_FACTOR);

        let entry = set.get(&name).unwrap();
        assert_eq!(entry.value, 4.0);
        assert!(entry.explicit);
    }

    #[test]
    fn test_explicit_values_filter() {
        let mut set = ConversionParameterSet::new();
        set.set_explicit(ParamName::new("a"), 1.0);
        set.set_default(ParamName::new("b"), 2.0);

        let explicit = set.explicit_values();
        assert_eq!(explicit.len(), 1);
        assert_eq!(explicit.get(&ParamName::new("a")), Some(&1.0));
    }

    #[test]
    fn test_locked_names() {
        assert!(ParamName::new(RASTERIZATION_OVERSAMPLING_FACTOR).locked_for_volume_regions());
        assert!(ParamName::new(REFERENCE_VOLUME).locked_for_volume_regions());
        assert!(!ParamName::new(DECIMATION_TARGET_REDUCTION_FACTOR).locked_for_volume_regions());
    }
}
