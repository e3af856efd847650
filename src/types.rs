use derive_more::{Add, Display, From, Sub};
use nalgebra::{Point3, Vector3};

/// Scalar field value at a point in space.
pub type Value = f32;

/// A 3D point with [`Value`] components.
pub type Point = Point3<Value>;

/// A 3D vector with [`Value`] components.
pub type Vector = Vector3<Value>;

/// Integer lattice position of a chunk.
///
/// The chunk's world-space origin is `coord * chunk_size`; its field covers
/// `[origin, origin + chunk_size]` on every axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Add, Sub)]
#[display("({x}, {y}, {z})")]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the chunk containing the world-space `position` (component-wise floor).
    pub fn from_world(position: Point, chunk_size: Value) -> Self {
        Self {
            x: (position.x / chunk_size).floor() as i32,
            y: (position.y / chunk_size).floor() as i32,
            z: (position.z / chunk_size).floor() as i32,
        }
    }

    /// World-space position of the chunk's minimum corner.
    pub fn origin(self, chunk_size: Value) -> Point {
        Point::new(
            self.x as Value * chunk_size,
            self.y as Value * chunk_size,
            self.z as Value * chunk_size,
        )
    }

    /// The coordinate as a point in chunk units, i.e. the noise domain offset.
    pub fn as_point(self) -> Point {
        Point::new(self.x as Value, self.y as Value, self.z as Value)
    }

    /// Max-of-axis distance between two coordinates.
    pub fn chebyshev_distance(self, other: Self) -> i32 {
        (self.x - other.x)
            .abs()
            .max((self.y - other.y).abs())
            .max((self.z - other.z).abs())
    }

    /// Every coordinate within Chebyshev `radius` of `self`, iterated z-major.
    pub fn cube_around(self, radius: i32) -> impl Iterator<Item = ChunkCoord> {
        let center = self;
        (-radius..=radius).flat_map(move |dz| {
            (-radius..=radius).flat_map(move |dy| {
                (-radius..=radius)
                    .map(move |dx| ChunkCoord::new(center.x + dx, center.y + dy, center.z + dz))
            })
        })
    }
}
