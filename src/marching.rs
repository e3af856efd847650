use ndarray::ArrayView3;
use rayon::prelude::*;

use crate::{
    interp::midpoint,
    mesh::Triangle,
    tables::{CORNER_POINT_INDICES, CORNERS, TRI_TABLE},
    types::{Point, Value},
};

/// Reads the 8 corner values of the cell at `(x, y, z)` from a `[[z, y, x]]` field view.
#[inline]
pub fn corner_values(field: &ArrayView3<'_, Value>, x: usize, y: usize, z: usize) -> [Value; 8] {
    CORNERS.map(|[cx, cy, cz]| field[[z + cz, y + cy, x + cx]])
}

/// Computes the marching cubes case index for a cell.
///
/// Each of the 8 corners maps to one bit. A bit is set when the corner's value
/// is **at or above** the threshold (i.e. solid):
///
/// ```text
/// corner index:  7  6  5  4  3  2  1  0
/// state bits:   [_][_][_][_][_][_][_][_]
///                                      ^-- corner 0 solid?
/// ```
#[inline]
pub fn get_state(corner_values: &[Value; 8], threshold: Value) -> u8 {
    corner_values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v >= threshold)
        .fold(0u8, |state, (i, _)| state | (1 << i))
}

/// Cell-local position of the vertex on `edge`: the midpoint of its two corners.
#[inline]
fn edge_vertex(cell: [usize; 3], edge: usize) -> Point {
    let [a, b] = CORNER_POINT_INDICES[edge];
    let corner = |i: usize| {
        let [cx, cy, cz] = CORNERS[i];
        Point::new(
            (cell[0] + cx) as Value,
            (cell[1] + cy) as Value,
            (cell[2] + cz) as Value,
        )
    };
    midpoint(corner(a), corner(b))
}

/// The triangles of one cell.
///
/// `TRI_TABLE[state]` contains edge indices in groups of three, terminated by `-1`:
/// ```text
/// TRI_TABLE[state] = [e0, e1, e2,  e3, e4, e5,  -1, ...]
///                     \___tri0__/   \___tri1__/
/// ```
/// Each triangle is emitted as `[e2, e1, e0]`. The table is wound for "inside below the
/// threshold", so reversing it makes the faces point away from solid corners.
#[inline]
pub fn cell_triangles(cell: [usize; 3], state: u8, cell_size: Value) -> impl Iterator<Item = Triangle> {
    TRI_TABLE[state as usize]
        .chunks_exact(3)
        .take_while(|edges| edges[0] >= 0)
        .map(move |edges| {
            let [a, b, c] = [edges[0], edges[1], edges[2]].map(|e| edge_vertex(cell, e as usize) * cell_size);
            Triangle::new(c, b, a)
        })
}

/// Appends the triangles of one cell to `out`. See [`cell_triangles`].
#[inline]
pub fn triangulate_cell(cell: [usize; 3], state: u8, cell_size: Value, out: &mut Vec<Triangle>) {
    out.extend(cell_triangles(cell, state, cell_size));
}

/// Runs marching cubes over a whole field and appends the triangles to `out`.
///
/// `field` is a `(N+1)³` view indexed `[[z, y, x]]`. Work is parallelised over z slabs and
/// extended straight into `out` in slab order, so the output order is deterministic and
/// matches a sequential `z, y, x` sweep. Returns the number of triangles appended.
///
/// ```text
/// Per cell:
/// 1. corner_values       →  8 scalar values
/// 2. get_state           →  256-entry lookup key
/// 3. cell_triangles      →  midpoint vertices from TRI_TABLE, reversed, scaled
/// ```
pub fn triangulate(field: ArrayView3<'_, Value>, threshold: Value, cell_size: Value, out: &mut Vec<Triangle>) -> usize {
    let segments = field.shape()[0].saturating_sub(1);
    let before = out.len();

    out.par_extend((0..segments).into_par_iter().flat_map_iter(|z| {
        (0..segments)
            .flat_map(move |y| (0..segments).map(move |x| [x, y, z]))
            .flat_map(move |[x, y, z]| {
                // cases 0 and 255 have empty table rows
                let state = get_state(&corner_values(&field, x, y, z), threshold);
                cell_triangles([x, y, z], state, cell_size)
            })
    }));

    out.len() - before
}
