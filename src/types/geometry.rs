//! Geometric payloads carried by representations.
//!
//! These are plain data: the kernel never interprets the geometry beyond
//! routing it through conversion rules. All payloads derive serde so that
//! snapshots hash and round-trip deterministically.

use serde::{Deserialize, Serialize};

/// A point in physical (world) space.
pub type Point3 = [f64; 3];

/// Surface mesh: points plus polygonal cells indexing into them.
///
/// Used both for open ribbon-like surfaces and for closed watertight
/// surfaces; the enclosing representation tag says which.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    /// Vertex positions in physical space.
    pub points: Vec<Point3>,
    /// Polygonal cells, each a list of indices into `points`.
    pub polys: Vec<Vec<u32>>,
}

impl Mesh {
    /// Create a mesh from points and cells.
    pub fn new(points: Vec<Point3>, polys: Vec<Vec<u32>>) -> Self {
        Self { points, polys }
    }

    /// Number of vertices.
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Number of polygonal cells.
    pub fn num_cells(&self) -> usize {
        self.polys.len()
    }

    /// True when the mesh carries no geometry at all.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.polys.is_empty()
    }
}

/// Indexed voxel volume: a 3D scalar grid plus the affine transform mapping
/// grid indices to physical space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    /// Grid extent along i, j, k.
    pub dims: [usize; 3],
    /// Homogeneous index-to-physical-space transform (row-major).
    pub ijk_to_world: [[f64; 4]; 4],
    /// Voxel values in k-major order; each value identifies a structure.
    pub voxels: Vec<u8>,
}

impl Volume {
    /// Identity index-to-world transform.
    pub const IDENTITY: [[f64; 4]; 4] = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];

    /// Create a volume filled with a single value and the identity transform.
    pub fn filled(dims: [usize; 3], value: u8) -> Self {
        let count = dims[0] * dims[1] * dims[2];
        Self {
            dims,
            ijk_to_world: Self::IDENTITY,
            voxels: vec![value; count],
        }
    }

    /// Total number of voxels implied by `dims`.
    pub fn voxel_count(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Linear index of voxel (i, j, k), or `None` when out of bounds.
    pub fn index(&self, i: usize, j: usize, k: usize) -> Option<usize> {
        if i >= self.dims[0] || j >= self.dims[1] || k >= self.dims[2] {
            return None;
        }
        Some((k * self.dims[1] + j) * self.dims[0] + i)
    }
}

/// A physical plane, given by a point on it and its unit normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    /// A point on the plane.
    pub origin: Point3,
    /// Plane normal.
    pub normal: Point3,
}

/// A single closed polyline lying in one physical plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanarPolyline {
    /// Polyline vertices, in order; the last connects back to the first.
    pub points: Vec<Point3>,
    /// The plane the polyline lies in.
    pub plane: Plane,
}

/// An ordered stack of planar polylines, e.g. as parsed from DICOM-RT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourStack {
    /// Polylines in stack order (typically by slice position).
    pub contours: Vec<PlanarPolyline>,
}

impl ContourStack {
    /// Create a contour stack.
    pub fn new(contours: Vec<PlanarPolyline>) -> Self {
        Self { contours }
    }

    /// Number of polylines in the stack.
    pub fn num_contours(&self) -> usize {
        self.contours.len()
    }
}
