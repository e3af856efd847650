use fastnoise_lite::{FastNoiseLite, NoiseType};
use ndarray::ArrayView3;
use rayon::prelude::*;

use crate::{
    error::{Result, TerrainError},
    interp::normalize_noise,
    types::{Point, Value},
};

/// A coherent noise function sampled by the field evaluator.
///
/// Implementations return values in `[-1, 1]`; the evaluator normalises them onto `[0, 1]`.
/// Any `Fn(Point) -> Value` closure is a noise source, which is handy for tests and SDF-style terrain.
pub trait NoiseSource: Send + Sync {
    fn sample(&self, p: Point) -> Value;
}

impl<F> NoiseSource for F
where
    F: Fn(Point) -> Value + Send + Sync,
{
    fn sample(&self, p: Point) -> Value {
        self(p)
    }
}

/// Seeded 3D OpenSimplex2 noise with unit frequency.
///
/// Frequency is left at `1.0` because the evaluator applies `noise_scale` itself.
pub struct SimplexNoise {
    noise: FastNoiseLite,
}

impl SimplexNoise {
    pub fn new(seed: i32) -> Self {
        let mut noise = FastNoiseLite::with_seed(seed);
        noise.set_noise_type(Some(NoiseType::OpenSimplex2));
        noise.set_frequency(Some(1.0));
        Self { noise }
    }
}

impl NoiseSource for SimplexNoise {
    fn sample(&self, p: Point) -> Value {
        self.noise.get_noise_3d(p.x, p.y, p.z)
    }
}

/// Dense grid of iso-values for one chunk.
///
/// The grid has `(segments + 1)³` corner points and `segments³` cells. Values live in a
/// single flat buffer addressed by [`index`](ScalarField::index), which is the standard
/// layout of an `[z][y][x]` array:
///
/// ```text
/// index = z * (N+1) * (N+1) + y * (N+1) + x
/// ```
///
/// Corners on a chunk face are evaluated independently by both neighbours; nothing is
/// shared across chunks.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarField {
    segments: usize,
    values: Vec<Value>,
}

impl ScalarField {
    /// Creates a field with every value set to `0.0`.
    pub fn new(segments: usize) -> Self {
        Self::filled(segments, 0.)
    }

    /// Creates a field with every value set to `value`.
    pub fn filled(segments: usize, value: Value) -> Self {
        let side = segments + 1;
        Self {
            segments,
            values: vec![value; side * side * side],
        }
    }

    /// Wraps an existing buffer, which must hold exactly `(segments + 1)³` values.
    pub fn from_values(segments: usize, values: Vec<Value>) -> Result<Self> {
        let expected = Self::len_for(segments);
        if values.len() != expected {
            return Err(TerrainError::FieldSizeMismatch {
                expected,
                found: values.len(),
            });
        }
        Ok(Self { segments, values })
    }

    /// Number of values in a field with `segments` cells per axis.
    pub fn len_for(segments: usize) -> usize {
        (segments + 1).pow(3)
    }

    /// Cells per axis.
    pub fn segments(&self) -> usize {
        self.segments
    }

    /// Corner points per axis.
    pub fn side(&self) -> usize {
        self.segments + 1
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        let side = self.side();
        z * side * side + y * side + x
    }

    /// Returns the value at corner `(x, y, z)`.
    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> Value {
        self.values[self.index(x, y, z)]
    }

    /// Sets the value at corner `(x, y, z)`, clamped to `[0, 1]`.
    pub fn set(&mut self, x: usize, y: usize, z: usize, v: Value) {
        let i = self.index(x, y, z);
        self.values[i] = v.clamp(0., 1.);
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Overwrites every value from `values`, which must have the same length as the field.
    pub fn copy_from(&mut self, values: &[Value]) -> Result<()> {
        if values.len() != self.values.len() {
            return Err(TerrainError::FieldSizeMismatch {
                expected: self.values.len(),
                found: values.len(),
            });
        }
        self.values.copy_from_slice(values);
        Ok(())
    }

    /// A `[[z, y, x]]`-indexed view over the flat buffer.
    pub fn view(&self) -> Result<ArrayView3<'_, Value>> {
        let side = self.side();
        Ok(ArrayView3::from_shape((side, side, side), &self.values)?)
    }

    /// Calls `f(x, y, z, &mut value)` for every corner in the grid.
    ///
    /// Coordinates are integer corner indices, not world-space positions.
    pub fn for_each_corner<F>(&mut self, mut f: F)
    where
        F: FnMut(usize, usize, usize, &mut Value),
    {
        let side = self.side();
        for (i, value) in self.values.iter_mut().enumerate() {
            f(i % side, (i / side) % side, i / (side * side), value);
        }
    }

    /// Adds `delta` to every corner within `radius` of `center`, clamping to `[0, 1]`.
    ///
    /// `center` is in chunk-local world units; corner `(x, y, z)` sits at `(x, y, z) * cell_size`.
    /// The candidate range is the brush's bounding box rounded outwards to whole corners and
    /// clamped to the grid. Returns `false`, leaving the field untouched, when that box lies
    /// entirely outside the grid or `radius` is negative or NaN.
    pub fn apply_brush(&mut self, center: Point, delta: Value, radius: Value, cell_size: Value) -> bool {
        if radius.is_nan() || radius < 0. {
            return false;
        }
        let n = self.segments as i64;
        let lo = center.coords.map(|c| ((c - radius) / cell_size).floor() as i64);
        let hi = center.coords.map(|c| ((c + radius) / cell_size).ceil() as i64);

        if lo.iter().any(|&v| v > n) || hi.iter().any(|&v| v < 0) {
            return false;
        }

        let lo = lo.map(|v| v.clamp(0, n) as usize);
        let hi = hi.map(|v| v.clamp(0, n) as usize);

        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    let corner = Point::new(x as Value, y as Value, z as Value) * cell_size;
                    if nalgebra::distance(&center, &corner) <= radius {
                        let i = self.index(x, y, z);
                        self.values[i] = (self.values[i] + delta).clamp(0., 1.);
                    }
                }
            }
        }
        true
    }

    /// First corner, in z-major scan order, whose value is at or below `threshold`.
    pub fn find_at_or_below(&self, threshold: Value) -> Option<[usize; 3]> {
        let side = self.side();
        self.values
            .iter()
            .position(|&v| v <= threshold)
            .map(|i| [i % side, (i / side) % side, i / (side * side)])
    }
}

/// Fills `field` with normalised noise for the chunk at `offset`.
///
/// `offset` is the chunk coordinate in chunk units. Corner `(x, y, z)` receives
///
/// ```text
/// normalize(noise(scale * (offset + (x, y, z) / N)))
/// ```
///
/// so neighbouring chunks sample one continuous noise domain. The output depends only on the
/// arguments: the same inputs always produce bit-identical fields. Work is split across z planes.
pub fn evaluate_field<N>(noise: &N, offset: Point, scale: Value, field: &mut ScalarField)
where
    N: NoiseSource + ?Sized,
{
    let segments = field.segments() as Value;
    let side = field.side();

    field
        .values
        .par_chunks_mut(side * side)
        .enumerate()
        .for_each(|(z, plane)| {
            for (i, value) in plane.iter_mut().enumerate() {
                let local = Point::new((i % side) as Value, (i / side) as Value, z as Value) / segments;
                let p = (offset + local.coords) * scale;
                *value = normalize_noise(noise.sample(p));
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_z_major() {
        let field = ScalarField::new(4);
        assert_eq!(field.index(0, 0, 0), 0);
        assert_eq!(field.index(1, 0, 0), 1);
        assert_eq!(field.index(0, 1, 0), 5);
        assert_eq!(field.index(0, 0, 1), 25);
        assert_eq!(field.values().len(), 125);
    }

    #[test]
    fn view_matches_flat_addressing() {
        let mut field = ScalarField::new(3);
        field.set(1, 2, 3, 0.25);
        let view = field.view().unwrap();
        assert_eq!(view[[3, 2, 1]], 0.25);
        assert_eq!(field.values()[field.index(1, 2, 3)], 0.25);
    }

    #[test]
    fn from_values_rejects_wrong_length() {
        let err = ScalarField::from_values(2, vec![0.; 8]).unwrap_err();
        assert!(matches!(
            err,
            TerrainError::FieldSizeMismatch { expected: 27, found: 8 }
        ));
    }

    #[test]
    fn for_each_corner_visits_matching_indices() {
        let mut field = ScalarField::new(2);
        field.for_each_corner(|x, y, z, v| *v = (x + 10 * y + 100 * z) as Value / 1000.);
        assert_eq!(field.get(2, 1, 0), 0.012);
        assert_eq!(field.get(0, 2, 1), 0.12);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let noise = SimplexNoise::new(7);
        let offset = Point::new(3., -1., 2.);
        let mut a = ScalarField::new(8);
        let mut b = ScalarField::new(8);
        evaluate_field(&noise, offset, 0.7, &mut a);
        evaluate_field(&noise, offset, 0.7, &mut b);
        assert_eq!(a, b);
        assert!(a.values().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn evaluation_samples_scaled_chunk_domain() {
        let noise = |p: Point| p.x / 16.;
        let mut field = ScalarField::new(4);
        evaluate_field(&noise, Point::new(1., 0., 0.), 2., &mut field);
        // corner x = 2 of chunk 1 sits at 1.5 chunk units, 3.0 after scaling
        assert_eq!(field.get(2, 0, 0), normalize_noise(3. / 16.));
        assert_eq!(field.get(2, 3, 4), field.get(2, 0, 0));
    }

    #[test]
    fn adjacent_chunks_agree_on_shared_face() {
        let noise = SimplexNoise::new(1);
        let mut left = ScalarField::new(4);
        let mut right = ScalarField::new(4);
        evaluate_field(&noise, Point::new(0., 0., 0.), 1., &mut left);
        evaluate_field(&noise, Point::new(1., 0., 0.), 1., &mut right);
        for z in 0..=4 {
            for y in 0..=4 {
                assert!((left.get(4, y, z) - right.get(0, y, z)).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn brush_outside_grid_is_rejected() {
        let mut field = ScalarField::filled(4, 0.5);
        let before = field.clone();
        assert!(!field.apply_brush(Point::new(-10., 2., 2.), 0.3, 1., 1.));
        assert!(!field.apply_brush(Point::new(2., 9., 2.), 0.3, 1., 1.));
        assert_eq!(field, before);
    }

    #[test]
    fn negative_or_nan_radius_is_rejected() {
        let mut field = ScalarField::filled(4, 0.5);
        let before = field.clone();
        let center = Point::new(2., 2., 2.);
        assert!(!field.apply_brush(center, 0.5, -1., 1.));
        assert!(!field.apply_brush(center, 0.5, -0.1, 1.));
        assert!(!field.apply_brush(center, 0.5, Value::NAN, 1.));
        assert_eq!(field, before);
        // a zero radius still reaches the corner under the center
        assert!(field.apply_brush(center, 0.5, 0., 1.));
        assert_eq!(field.get(2, 2, 2), 1.);
    }

    #[test]
    fn brush_only_touches_cells_in_radius() {
        let mut field = ScalarField::filled(4, 0.5);
        assert!(field.apply_brush(Point::new(2., 2., 2.), 0.25, 1., 1.));
        assert_eq!(field.get(2, 2, 2), 0.75);
        assert_eq!(field.get(3, 2, 2), 0.75);
        assert_eq!(field.get(3, 3, 2), 0.5);
        assert_eq!(field.get(0, 0, 0), 0.5);
    }

    #[test]
    fn brush_clamps_to_unit_range() {
        let mut field = ScalarField::filled(2, 0.9);
        field.apply_brush(Point::new(1., 1., 1.), 0.5, 0.5, 1.);
        assert_eq!(field.get(1, 1, 1), 1.);
        field.apply_brush(Point::new(1., 1., 1.), -3., 0.5, 1.);
        assert_eq!(field.get(1, 1, 1), 0.);
    }

    #[test]
    fn find_at_or_below_scans_z_major() {
        let mut field = ScalarField::filled(2, 1.);
        assert_eq!(field.find_at_or_below(0.2), None);
        field.set(2, 0, 1, 0.1);
        field.set(0, 2, 1, 0.1);
        assert_eq!(field.find_at_or_below(0.2), Some([2, 0, 1]));
    }
}
