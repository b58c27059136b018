//! Volumetric box mesh generation for soft bodies.
//!
//! A box is sampled as a regular grid of `nx * ny * nz` points. From that grid
//! this module produces everything a soft body needs:
//!
//! - positions (one per grid point, centered on the box, then offset)
//! - normal slots (zeroed, filled by the simulation every frame)
//! - a triangle list covering the six outer faces of the box
//! - five tetrahedra per grid cell, plus the six edge links of every tetrahedron
//!
//! ## Vertex order
//!
//! Vertices are emitted z-outer, y-middle, x-inner, so the vertex at grid
//! coordinate `(i, j, k)` has index `i + j * nx + k * nx * ny`. The physics side
//! creates one node per vertex in the same order, which is what lets the
//! stepper copy node `n` straight into vertex `n`.
//!
//! ## Cell corners
//!
//! The 8 corners of a cell are addressed by a 3-bit code: bit 0 is +x, bit 1
//! is +y, bit 2 is +z. [`CORNER_OFFSETS`] maps the code to a grid offset.
//!
//! ```text
//!        6-------7
//!       /|      /|      y
//!      4-------5 |      |
//!      | 2-----|-3      o-- x
//!      |/      |/      /
//!      0-------1      z
//! ```
//!
//! ## Five-tetrahedron split
//!
//! Every cell is split into four corner tetrahedra and one central tetrahedron
//! ([`CELL_TETRAHEDRA`]). Their volumes add up to exactly the cell volume.
//!
//! ## Usage
//!
//! ```ignore
//! use studio_core::tetra_mesh::{generate_tetra_mesh, GridSpec};
//!
//! let spec = GridSpec::new(Vec3::new(2.0, 1.0, 3.0), UVec3::new(10, 5, 15));
//! let mesh = generate_tetra_mesh(&spec)?;
//! assert_eq!(mesh.vertices.len(), 750);
//! ```

use bevy::math::{UVec3, Vec3};

use crate::error::{SimError, SimResult};

/// Grid offset of each cell corner, indexed by corner code.
pub const CORNER_OFFSETS: [UVec3; 8] = [
    UVec3::new(0, 0, 0),
    UVec3::new(1, 0, 0),
    UVec3::new(0, 1, 0),
    UVec3::new(1, 1, 0),
    UVec3::new(0, 0, 1),
    UVec3::new(1, 0, 1),
    UVec3::new(0, 1, 1),
    UVec3::new(1, 1, 1),
];

/// Corner codes of the five tetrahedra a cell is split into.
pub const CELL_TETRAHEDRA: [[usize; 4]; 5] = [
    [0, 4, 5, 6],
    [0, 2, 3, 6],
    [0, 1, 3, 5],
    [3, 5, 6, 7],
    [0, 3, 5, 6],
];

/// Local corner pairs linked for every tetrahedron.
pub const TETRA_EDGES: [[usize; 2]; 6] = [[0, 1], [0, 2], [0, 3], [1, 2], [2, 3], [3, 1]];

/// Boundary faces of a cell as two triangles of corner codes, wound so the
/// normal points out of the box.
const FACE_Z_NEG: [[usize; 3]; 2] = [[0, 2, 1], [1, 2, 3]];
const FACE_Z_POS: [[usize; 3]; 2] = [[4, 5, 6], [5, 7, 6]];
const FACE_Y_NEG: [[usize; 3]; 2] = [[0, 1, 4], [1, 5, 4]];
const FACE_Y_POS: [[usize; 3]; 2] = [[2, 6, 3], [3, 6, 7]];
const FACE_X_NEG: [[usize; 3]; 2] = [[0, 4, 2], [2, 4, 6]];
const FACE_X_POS: [[usize; 3]; 2] = [[1, 3, 5], [3, 7, 5]];

/// Box extents, grid resolution and placement of a soft body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    /// Full size of the box along each axis.
    pub extents: Vec3,
    /// Number of grid points along each axis (at least 2).
    pub resolution: UVec3,
    /// World-space translation applied after centering.
    pub offset: Vec3,
}

impl GridSpec {
    /// Grid centered on the origin.
    pub fn new(extents: Vec3, resolution: UVec3) -> Self {
        Self {
            extents,
            resolution,
            offset: Vec3::ZERO,
        }
    }

    pub fn with_offset(mut self, offset: Vec3) -> Self {
        self.offset = offset;
        self
    }

    /// Check the grid before any geometry is produced.
    pub fn validate(&self) -> SimResult<()> {
        let UVec3 { x: nx, y: ny, z: nz } = self.resolution;
        if nx < 2 || ny < 2 || nz < 2 {
            return Err(SimError::InvalidTopology { nx, ny, nz });
        }
        // Vertex and corner indices are u32.
        let points = nx as u64 * ny as u64 * nz as u64;
        if points > u32::MAX as u64 {
            return Err(SimError::InvalidParameter(format!(
                "grid has {} points, more than u32 indices can address",
                points
            )));
        }
        if !self.extents.is_finite() || self.extents.min_element() <= 0.0 {
            return Err(SimError::InvalidParameter(format!(
                "grid extents must be positive, got {:?}",
                self.extents
            )));
        }
        if !self.offset.is_finite() {
            return Err(SimError::InvalidParameter(format!(
                "grid offset must be finite, got {:?}",
                self.offset
            )));
        }
        Ok(())
    }

    /// `nx * ny * nz`
    pub fn vertex_count(&self) -> usize {
        self.resolution.x as usize * self.resolution.y as usize * self.resolution.z as usize
    }

    /// `(nx-1) * (ny-1) * (nz-1)`
    pub fn cell_count(&self) -> usize {
        let cells = self.resolution.saturating_sub(UVec3::ONE);
        cells.x as usize * cells.y as usize * cells.z as usize
    }

    /// Two triangles per boundary quad on each of the six faces.
    pub fn surface_triangle_count(&self) -> usize {
        let c = self.resolution.saturating_sub(UVec3::ONE);
        let (cx, cy, cz) = (c.x as usize, c.y as usize, c.z as usize);
        4 * (cx * cy + cx * cz + cy * cz)
    }

    pub fn tetrahedron_count(&self) -> usize {
        5 * self.cell_count()
    }

    /// Vertex index of grid point `(i, j, k)`.
    #[inline]
    pub fn vertex_index(&self, i: u32, j: u32, k: u32) -> u32 {
        i + j * self.resolution.x + k * self.resolution.x * self.resolution.y
    }

    /// Vertex index of corner `code` of the cell whose lowest corner is `base`.
    #[inline]
    pub fn corner_index(&self, base: u32, code: usize) -> u32 {
        let o = CORNER_OFFSETS[code];
        base + o.x + o.y * self.resolution.x + o.z * self.resolution.x * self.resolution.y
    }

    /// World position of grid point `(i, j, k)`.
    pub fn point_position(&self, i: u32, j: u32, k: u32) -> Vec3 {
        let steps = (self.resolution - UVec3::ONE).as_vec3();
        let grid = Vec3::new(i as f32, j as f32, k as f32);
        grid * self.extents / steps - self.extents * 0.5 + self.offset
    }
}

/// Positions and normal accumulators, one per grid point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexBuffer {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
}

impl VertexBuffer {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Triangles covering the outer surface of the box.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexBuffer {
    pub triangles: Vec<[u32; 3]>,
}

impl IndexBuffer {
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Flat `u32` list for GPU upload.
    pub fn flattened(&self) -> Vec<u32> {
        self.triangles.iter().flatten().copied().collect()
    }
}

/// Tetrahedra and the links along their edges.
///
/// Links shared by neighbouring tetrahedra appear more than once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TetraSet {
    pub tetrahedra: Vec<[u32; 4]>,
    pub links: Vec<[u32; 2]>,
}

/// Full output of [`generate_tetra_mesh`].
#[derive(Debug, Clone, PartialEq)]
pub struct TetraMesh {
    pub vertices: VertexBuffer,
    pub indices: IndexBuffer,
    pub tetras: TetraSet,
}

/// Build the volumetric mesh of a box.
///
/// Pure function of `spec`: the same spec always yields the same vertex,
/// triangle and tetrahedron order.
///
/// # Errors
/// `InvalidTopology` if any axis has fewer than 2 points, `InvalidParameter`
/// for non-positive extents. No partial mesh is returned.
pub fn generate_tetra_mesh(spec: &GridSpec) -> SimResult<TetraMesh> {
    spec.validate()?;

    let UVec3 { x: nx, y: ny, z: nz } = spec.resolution;

    let mut positions = Vec::with_capacity(spec.vertex_count());
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                positions.push(spec.point_position(i, j, k));
            }
        }
    }
    let normals = vec![Vec3::ZERO; positions.len()];

    let mut triangles = Vec::with_capacity(spec.surface_triangle_count());
    let mut tetrahedra = Vec::with_capacity(spec.tetrahedron_count());
    let mut links = Vec::with_capacity(spec.tetrahedron_count() * TETRA_EDGES.len());

    for k in 0..nz - 1 {
        for j in 0..ny - 1 {
            for i in 0..nx - 1 {
                let base = spec.vertex_index(i, j, k);

                let mut emit_face = |face: &[[usize; 3]; 2]| {
                    for tri in face {
                        triangles.push(tri.map(|code| spec.corner_index(base, code)));
                    }
                };

                if k == 0 {
                    emit_face(&FACE_Z_NEG);
                }
                if k == nz - 2 {
                    emit_face(&FACE_Z_POS);
                }
                if j == 0 {
                    emit_face(&FACE_Y_NEG);
                }
                if j == ny - 2 {
                    emit_face(&FACE_Y_POS);
                }
                if i == 0 {
                    emit_face(&FACE_X_NEG);
                }
                if i == nx - 2 {
                    emit_face(&FACE_X_POS);
                }

                for corners in &CELL_TETRAHEDRA {
                    let tet = corners.map(|code| spec.corner_index(base, code));
                    for [a, b] in TETRA_EDGES {
                        links.push([tet[a], tet[b]]);
                    }
                    tetrahedra.push(tet);
                }
            }
        }
    }

    Ok(TetraMesh {
        vertices: VertexBuffer { positions, normals },
        indices: IndexBuffer { triangles },
        tetras: TetraSet { tetrahedra, links },
    })
}

/// Signed volume of a tetrahedron.
pub fn tetrahedron_volume(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3) -> f32 {
    (p1 - p0).dot((p2 - p0).cross(p3 - p0)) / 6.0
}
