//! Spatial neighbor-query primitives for the schooling simulation.
//!
//! Three pieces live here: periodic geometry over a cubic domain ([`Vec3`],
//! [`wrap`], [`min_image`]), precomputed cell stencils that classify unit
//! grid cells against an interaction sphere ([`Stencil`]), and the per-step
//! uniform grid that buckets agents by cell ([`CellGrid`]). The grid holds
//! integer agent indices into the caller's flat agent storage; it never owns
//! agent data.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Errors emitted by the spatial index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g. a zero-sized grid).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// A 3-component vector over `f64`, the only coordinate type in the workspace.
///
/// Arithmetic is exposed as plain methods rather than operator impls so there
/// is exactly one way to construct and combine vectors.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// The zero vector.
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    #[must_use]
    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    #[must_use]
    pub fn scale(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    #[must_use]
    pub fn div(self, divisor: f64) -> Self {
        Self::new(self.x / divisor, self.y / divisor, self.z / divisor)
    }

    /// Euclidean norm.
    #[must_use]
    pub fn norm(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector in the direction of `self`.
    ///
    /// Normalizing the zero vector divides by zero and yields NaN components;
    /// the result is propagated, not guarded.
    #[must_use]
    pub fn normalized(self) -> Self {
        self.div(self.norm())
    }

    /// Component-wise [`wrap`] into `[0, side)`.
    #[must_use]
    pub fn wrapped(self, side: f64) -> Self {
        Self::new(
            wrap(self.x, side),
            wrap(self.y, side),
            wrap(self.z, side),
        )
    }
}

/// Maps `coord` into `[0, side)` by adding or subtracting exactly one
/// multiple of `side`.
///
/// The per-step displacement of an agent is assumed smaller than one domain
/// width, so a single correction always suffices; coordinates further out of
/// range trip a debug assertion instead of silently landing in the wrong cell.
#[must_use]
pub fn wrap(coord: f64, side: f64) -> f64 {
    debug_assert!(
        coord >= -side && coord < 2.0 * side,
        "coordinate {coord} is more than one domain width outside [0, {side})"
    );
    if coord >= side {
        coord - side
    } else if coord < 0.0 {
        coord + side
    } else {
        coord
    }
}

/// Minimum-image displacement from `from` to `to` on a torus of side `side`.
///
/// Per axis, the raw difference is shifted by one domain width whenever its
/// magnitude exceeds `side / 2`, selecting the shortest of the direct and
/// wrapped-around displacements. Correct only while
/// `side >= 2 * interaction radius`.
#[must_use]
pub fn min_image(from: Vec3, to: Vec3, side: f64) -> Vec3 {
    let mut d = to.sub(from);
    let half = side / 2.0;
    if d.x > half {
        d.x -= side;
    } else if d.x < -half {
        d.x += side;
    }
    if d.y > half {
        d.y -= side;
    } else if d.y < -half {
        d.y += side;
    }
    if d.z > half {
        d.z -= side;
    } else if d.z < -half {
        d.z += side;
    }
    d
}

/// An integer cell displacement relative to an agent's home cell.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CellOffset {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellOffset {
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// The 26 sample points of a unit cell: 6 face centers, 8 vertices, and 12
/// edge midpoints, relative to the cell center. They double as the reference
/// centers the full stencils are aggregated over, because the querying agent
/// may sit anywhere in its home cell.
const SAMPLE_POINTS: [Vec3; 26] = [
    // Face centers.
    Vec3::new(0.5, 0.0, 0.0),
    Vec3::new(-0.5, 0.0, 0.0),
    Vec3::new(0.0, 0.5, 0.0),
    Vec3::new(0.0, -0.5, 0.0),
    Vec3::new(0.0, 0.0, 0.5),
    Vec3::new(0.0, 0.0, -0.5),
    // Vertices.
    Vec3::new(0.5, 0.5, 0.5),
    Vec3::new(0.5, 0.5, -0.5),
    Vec3::new(0.5, -0.5, 0.5),
    Vec3::new(0.5, -0.5, -0.5),
    Vec3::new(-0.5, 0.5, 0.5),
    Vec3::new(-0.5, 0.5, -0.5),
    Vec3::new(-0.5, -0.5, 0.5),
    Vec3::new(-0.5, -0.5, -0.5),
    // Edge midpoints.
    Vec3::new(0.5, 0.5, 0.0),
    Vec3::new(0.5, -0.5, 0.0),
    Vec3::new(0.5, 0.0, 0.5),
    Vec3::new(0.5, 0.0, -0.5),
    Vec3::new(0.0, 0.5, 0.5),
    Vec3::new(0.0, 0.5, -0.5),
    Vec3::new(-0.5, 0.5, 0.0),
    Vec3::new(-0.5, -0.5, 0.0),
    Vec3::new(-0.5, 0.0, 0.5),
    Vec3::new(-0.5, 0.0, -0.5),
    Vec3::new(0.0, -0.5, 0.5),
    Vec3::new(0.0, -0.5, -0.5),
];

/// Counts how many of the cell's 26 sample points lie within `radius` of
/// `center`. The boundary test is open (`< radius`), the inner test closed.
fn samples_within(cell: CellOffset, radius: f64, center: Vec3, strict: bool) -> usize {
    SAMPLE_POINTS
        .iter()
        .filter(|rel| {
            let sample = Vec3::new(
                f64::from(cell.x) + rel.x,
                f64::from(cell.y) + rel.y,
                f64::from(cell.z) + rel.z,
            );
            let distance = sample.sub(center).norm();
            if strict {
                distance < radius
            } else {
                distance <= radius
            }
        })
        .count()
}

/// The sphere surface passes through the cell: some, but not all, sample
/// points lie strictly inside.
fn cell_on_boundary(cell: CellOffset, radius: f64, center: Vec3) -> bool {
    let inside = samples_within(cell, radius, center, true);
    inside > 0 && inside < SAMPLE_POINTS.len()
}

/// The cell lies entirely within the sphere: every sample point is within
/// the closed radius.
fn cell_inside(cell: CellOffset, radius: f64, center: Vec3) -> bool {
    samples_within(cell, radius, center, false) == SAMPLE_POINTS.len()
}

/// A precomputed set of relative cell offsets for one interaction radius (or
/// annulus): `boundary` cells straddle the sphere surface and require an
/// exact distance re-test per candidate agent, `inner` cells are covered
/// entirely and their occupants are accepted unconditionally.
///
/// Stencils are computed once per run, depend only on the radii, and are
/// deterministic: offsets are stored sorted and deduplicated, so equal radii
/// always produce identical vectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stencil {
    pub boundary: Vec<CellOffset>,
    pub inner: Vec<CellOffset>,
}

impl Stencil {
    /// Builds the boundary and inner stencils for a sphere of `radius`.
    ///
    /// Each candidate cell is classified against all 26 reference centers;
    /// a cell is boundary if any center sees it straddling the surface, and
    /// inner only if every center sees it fully covered. Non-positive radii
    /// produce empty stencils.
    #[must_use]
    pub fn sphere(radius: f64) -> Self {
        if radius <= 0.0 {
            return Self {
                boundary: Vec::new(),
                inner: Vec::new(),
            };
        }

        let reach = radius as i32 + 1;
        let mut boundary = BTreeSet::new();
        let mut covered_votes: BTreeMap<CellOffset, usize> = BTreeMap::new();

        for center in SAMPLE_POINTS {
            for x in -reach..=reach {
                for y in -reach..=reach {
                    for z in -reach..=reach {
                        let cell = CellOffset::new(x, y, z);
                        if cell_on_boundary(cell, radius, center) {
                            boundary.insert(cell);
                        }
                        if cell_inside(cell, radius, center) {
                            *covered_votes.entry(cell).or_default() += 1;
                        }
                    }
                }
            }
        }

        let inner = covered_votes
            .into_iter()
            .filter(|&(_, votes)| votes == SAMPLE_POINTS.len())
            .map(|(cell, _)| cell)
            .collect();

        Self {
            boundary: boundary.into_iter().collect(),
            inner,
        }
    }

    /// Builds the stencils for the annulus between two radii (swapped so the
    /// smaller is the inner bound).
    ///
    /// Boundary offsets are the deduplicated union of both sphere boundaries.
    /// Inner offsets are the cells fully inside the outer sphere that are
    /// neither fully inside, nor straddling, the inner sphere.
    #[must_use]
    pub fn annulus(radius_a: f64, radius_b: f64) -> Self {
        let (lo, hi) = if radius_a <= radius_b {
            (radius_a, radius_b)
        } else {
            (radius_b, radius_a)
        };
        let lo_stencil = Self::sphere(lo);
        let hi_stencil = Self::sphere(hi);

        let mut boundary: BTreeSet<CellOffset> = lo_stencil.boundary.iter().copied().collect();
        boundary.extend(hi_stencil.boundary.iter().copied());

        let excluded: BTreeSet<CellOffset> = lo_stencil
            .inner
            .iter()
            .chain(lo_stencil.boundary.iter())
            .copied()
            .collect();
        let inner = hi_stencil
            .inner
            .into_iter()
            .filter(|cell| !excluded.contains(cell))
            .collect();

        Self {
            boundary: boundary.into_iter().collect(),
            inner,
        }
    }
}

/// A uniform grid of unit cells over the cubic domain, rebuilt from agent
/// positions every step.
///
/// Buckets store indices into the caller's agent slice. The bucket vectors
/// are cleared, not dropped, on rebuild, so allocations are reused across
/// steps.
#[derive(Debug, Clone)]
pub struct CellGrid {
    side: usize,
    buckets: Vec<Vec<usize>>,
}

impl CellGrid {
    /// Creates an empty grid of `side` unit cells per axis.
    pub fn new(side: u32) -> Result<Self, IndexError> {
        if side == 0 {
            return Err(IndexError::InvalidConfig("grid side must be non-zero"));
        }
        let side = side as usize;
        Ok(Self {
            side,
            buckets: vec![Vec::new(); side * side * side],
        })
    }

    /// Edge length of the grid in cells (= in world units; cells are unit cubes).
    #[must_use]
    pub fn side(&self) -> usize {
        self.side
    }

    /// Re-buckets every agent by the integer cell containing its position.
    ///
    /// Positions must already be wrapped into `[0, side)` on every axis;
    /// each index then lands in exactly one bucket and the union of all
    /// buckets is the full agent set.
    pub fn rebuild(&mut self, positions: &[Vec3]) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        for (index, position) in positions.iter().enumerate() {
            let [x, y, z] = self.cell_of(*position);
            let slot = self.flat(x, y, z);
            self.buckets[slot].push(index);
        }
    }

    /// Integer cell coordinate containing a (wrapped) position.
    #[must_use]
    pub fn cell_of(&self, position: Vec3) -> [usize; 3] {
        let side = self.side as f64;
        debug_assert!(
            position.x >= 0.0
                && position.x < side
                && position.y >= 0.0
                && position.y < side
                && position.z >= 0.0
                && position.z < side,
            "position {position:?} not wrapped into [0, {side})"
        );
        [position.x as usize, position.y as usize, position.z as usize]
    }

    /// The agent indices bucketed in the cell `offset` away from `home`,
    /// with toroidal wraparound at the grid edges.
    #[must_use]
    pub fn offset_bucket(&self, home: [usize; 3], offset: CellOffset) -> &[usize] {
        let side = self.side as i64;
        let x = (home[0] as i64 + i64::from(offset.x)).rem_euclid(side) as usize;
        let y = (home[1] as i64 + i64::from(offset.y)).rem_euclid(side) as usize;
        let z = (home[2] as i64 + i64::from(offset.z)).rem_euclid(side) as usize;
        &self.buckets[self.flat(x, y, z)]
    }

    fn flat(&self, x: usize, y: usize, z: usize) -> usize {
        (x * self.side + y) * self.side + z
    }
}
