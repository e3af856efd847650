use crate::types::{Point, Value, Vector};

/// One output triangle of the triangulator, vertices in emission order.
///
/// The layout mirrors an append-buffer element: three packed positions, nine floats.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub a: Point,
    pub b: Point,
    pub c: Point,
}

impl Triangle {
    pub fn new(a: Point, b: Point, c: Point) -> Self {
        Self { a, b, c }
    }

    /// Unit face normal following the right-hand rule over `a → b → c`.
    ///
    /// Returns the zero vector if the triangle is degenerate.
    pub fn normal(&self) -> Vector {
        let cross = (self.b - self.a).cross(&(self.c - self.b));
        let nrm = cross.norm();
        if nrm == 0.0 {
            Vector::zeros()
        } else {
            cross / nrm
        }
    }
}

/// Chunk geometry as a non-indexed triangle soup.
///
/// Every group of three consecutive positions forms one triangle, so vertex `i` has index `i`.
/// Normals are flat: each vertex carries its face normal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkMesh {
    /// Flat list of vertex positions: `[[x, y, z], ...]`
    pub positions: Vec<[Value; 3]>,

    /// Per-vertex face normals: `[[nx, ny, nz], ...]`
    pub normals: Vec<[Value; 3]>,
}

impl ChunkMesh {
    /// Creates an empty mesh.
    pub fn new_empty() -> Self {
        Self::default()
    }

    /// Builds a mesh from triangulator output.
    pub fn from_triangles(triangles: &[Triangle]) -> Self {
        let mut mesh = Self::new_empty();
        mesh.rebuild(triangles);
        mesh
    }

    /// Replaces the geometry with `triangles`, reusing the existing allocations.
    pub fn rebuild(&mut self, triangles: &[Triangle]) {
        self.positions.clear();
        self.normals.clear();
        self.positions.reserve(triangles.len() * 3);
        self.normals.reserve(triangles.len() * 3);

        for tri in triangles {
            let n = tri.normal();
            let n = [n.x, n.y, n.z];
            for p in [tri.a, tri.b, tri.c] {
                self.positions.push([p.x, p.y, p.z]);
                self.normals.push(n);
            }
        }
    }

    /// Drops all geometry but keeps the allocations.
    pub fn clear(&mut self) {
        self.positions.clear();
        self.normals.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Sequential triangle indices `0..vertex_count`, for consumers that need an index buffer.
    pub fn indices(&self) -> Vec<u32> {
        (0..self.positions.len() as u32).collect()
    }

    /// Returns the three vertex positions of triangle `tri`.
    pub fn tri_coords(&self, tri: usize) -> [Point; 3] {
        let v = |i: usize| {
            let [x, y, z] = self.positions[tri * 3 + i];
            Point::new(x, y, z)
        };
        [v(0), v(1), v(2)]
    }

    /// An axis-aligned box spanning `min..max` whose faces point inwards.
    ///
    /// Used as the collision shell around the loaded window, keeping the viewer inside it.
    pub fn border_box(min: Point, max: Point) -> Self {
        let corners = [
            // bottom
            Point::new(min.x, min.y, min.z),
            Point::new(min.x, min.y, max.z),
            Point::new(max.x, min.y, max.z),
            Point::new(max.x, min.y, min.z),
            // top
            Point::new(min.x, max.y, min.z),
            Point::new(min.x, max.y, max.z),
            Point::new(max.x, max.y, max.z),
            Point::new(max.x, max.y, min.z),
        ];
        const FACES: [[usize; 3]; 12] = [
            // bottom
            [0, 1, 2],
            [0, 2, 3],
            // top
            [6, 5, 4],
            [6, 4, 7],
            // front
            [0, 3, 4],
            [7, 4, 3],
            // back
            [1, 5, 2],
            [2, 5, 6],
            // left
            [0, 4, 1],
            [1, 4, 5],
            // right
            [2, 6, 7],
            [2, 7, 3],
        ];
        let triangles: Vec<Triangle> = FACES
            .iter()
            .map(|&[a, b, c]| Triangle::new(corners[a], corners[b], corners[c]))
            .collect();
        Self::from_triangles(&triangles)
    }
}
