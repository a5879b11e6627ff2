//! Representation kinds and the tagged payload union.
//!
//! The source-of-truth invariant lives here: a [`Representation`]'s tag always
//! matches its [`RepresentationKind`] because `kind()` is derived from the
//! variant itself. There is no runtime downcast to fail.

use serde::{Deserialize, Serialize};

use super::geometry::{ContourStack, Mesh, Volume};

/// The closed set of geometric encodings a region may hold.
///
/// Values are opaque tags, not ordered semantically; `Ord` exists only for
/// deterministic map iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RepresentationKind {
    /// Open ribbon-like surface mesh.
    RibbonModel,
    /// Indexed voxel volume (labelmap).
    IndexedLabelmap,
    /// Closed watertight surface mesh.
    ClosedSurfaceModel,
    /// Ordered stack of planar polylines.
    PlanarContour,
}

/// Error from parsing a kind name that is not one of the canonical four.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown representation kind '{0}'")]
pub struct UnknownKindError(String);

impl RepresentationKind {
    /// All kinds, in canonical order.
    pub const ALL: [RepresentationKind; 4] = [
        Self::RibbonModel,
        Self::IndexedLabelmap,
        Self::ClosedSurfaceModel,
        Self::PlanarContour,
    ];

    /// Canonical name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RibbonModel => "ribbon_model",
            Self::IndexedLabelmap => "indexed_labelmap",
            Self::ClosedSurfaceModel => "closed_surface_model",
            Self::PlanarContour => "planar_contour",
        }
    }
}

impl std::str::FromStr for RepresentationKind {
    type Err = UnknownKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ribbon_model" => Ok(Self::RibbonModel),
            "indexed_labelmap" => Ok(Self::IndexedLabelmap),
            "closed_surface_model" => Ok(Self::ClosedSurfaceModel),
            "planar_contour" => Ok(Self::PlanarContour),
            other => Err(UnknownKindError(other.to_string())),
        }
    }
}

impl std::fmt::Display for RepresentationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One concrete geometric encoding of a region.
///
/// A region holds at most one representation per kind at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Representation {
    /// Open ribbon-like surface.
    RibbonModel(Mesh),
    /// Indexed voxel volume.
    IndexedLabelmap(Volume),
    /// Closed watertight surface.
    ClosedSurfaceModel(Mesh),
    /// Planar polyline stack.
    PlanarContour(ContourStack),
}

impl Representation {
    /// The kind tag of this payload.
    pub fn kind(&self) -> RepresentationKind {
        match self {
            Self::RibbonModel(_) => RepresentationKind::RibbonModel,
            Self::IndexedLabelmap(_) => RepresentationKind::IndexedLabelmap,
            Self::ClosedSurfaceModel(_) => RepresentationKind::ClosedSurfaceModel,
            Self::PlanarContour(_) => RepresentationKind::PlanarContour,
        }
    }

    /// Mesh payload, for the two mesh-backed kinds.
    pub fn as_mesh(&self) -> Option<&Mesh> {
        match self {
            Self::RibbonModel(m) | Self::ClosedSurfaceModel(m) => Some(m),
            _ => None,
        }
    }

    /// Volume payload, when this is a labelmap.
    pub fn as_volume(&self) -> Option<&Volume> {
        match self {
            Self::IndexedLabelmap(v) => Some(v),
            _ => None,
        }
    }

    /// Contour-stack payload, when this is a planar contour.
    pub fn as_contour_stack(&self) -> Option<&ContourStack> {
        match self {
            Self::PlanarContour(c) => Some(c),
            _ => None,
        }
    }
}
