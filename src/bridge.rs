//! Parallel compute bridge between chunks and the executor that evaluates and meshes fields.
//!
//! The bridge owns one set of persistent buffers (a field buffer and a triangle append
//! buffer with its counter) shared by every chunk. Generation is therefore serialised:
//! every method takes `&mut self`, so at most one request is ever in flight.
//!
//! ```text
//! set_uniforms(origin) → dispatch_field_eval → read_field ─┐
//!                        dispatch_triangulate → read_count → read_triangles(count)
//! ```

use tracing::trace;

use crate::{
    config::TerrainConfig,
    error::{Result, TerrainError},
    field::{NoiseSource, ScalarField, evaluate_field},
    marching::triangulate,
    mesh::Triangle,
    tables::MAX_CELL_TRIANGLES,
    types::{ChunkCoord, Point, Value},
};

/// Per-dispatch parameters shared by both kernels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Uniforms {
    /// Cells per chunk axis.
    pub segment_count: u32,
    /// Multiplier applied to noise-domain coordinates.
    pub noise_scale: Value,
    /// Chunk coordinate in chunk units; the noise-domain offset.
    pub chunk_origin: Point,
    /// Iso-surface threshold.
    pub iso_threshold: Value,
    /// World-space side length of a chunk.
    pub axis_size: Value,
}

impl Uniforms {
    pub fn from_config(config: &TerrainConfig) -> Self {
        Self {
            segment_count: config.segments as u32,
            noise_scale: config.noise_scale,
            chunk_origin: Point::origin(),
            iso_threshold: config.iso_threshold,
            axis_size: config.chunk_size,
        }
    }

    /// World-space size of one cell.
    pub fn cell_size(&self) -> Value {
        self.axis_size / self.segment_count as Value
    }

    /// Capacity of the triangle buffer: every cell emitting its maximum.
    pub fn max_triangles(&self) -> usize {
        (self.segment_count as usize).pow(3) * MAX_CELL_TRIANGLES
    }
}

/// A parallel executor for the two chunk kernels.
///
/// This is the whole surface the core depends on; a GPU compute backend would implement
/// it with a uniform block, two dispatches and buffer readbacks.
pub trait ComputeBackend {
    fn set_uniforms(&mut self, uniforms: Uniforms);

    /// Fills the field buffer for the current `chunk_origin`.
    fn dispatch_field_eval(&mut self);

    /// Resets the triangle counter and appends the triangles of the current field buffer.
    fn dispatch_triangulate(&mut self) -> Result<()>;

    /// Number of triangles written by the last triangulate dispatch.
    fn read_count(&self) -> u32;

    /// The valid prefix of the triangle buffer, at most `max_count` long.
    fn read_triangles(&self, max_count: usize) -> &[Triangle];

    fn read_field(&self) -> &[Value];

    /// Replaces the field buffer, e.g. after an edit.
    fn write_field(&mut self, values: &[Value]) -> Result<()>;

    /// Frees the buffers. The next `set_uniforms` reallocates them.
    fn release(&mut self);
}

/// Rayon-backed [`ComputeBackend`].
///
/// Both dispatches run data-parallel over z planes and block until finished.
pub struct CpuBackend<N> {
    noise: N,
    uniforms: Uniforms,
    field: ScalarField,
    triangles: Vec<Triangle>,
    count: u32,
}

impl<N: NoiseSource> CpuBackend<N> {
    /// Allocates buffers for `uniforms.segment_count`.
    pub fn new(noise: N, uniforms: Uniforms) -> Self {
        Self {
            noise,
            uniforms,
            field: ScalarField::new(uniforms.segment_count as usize),
            triangles: Vec::with_capacity(uniforms.max_triangles()),
            count: 0,
        }
    }
}

impl<N: NoiseSource> ComputeBackend for CpuBackend<N> {
    fn set_uniforms(&mut self, uniforms: Uniforms) {
        let segments = uniforms.segment_count as usize;
        if self.field.segments() != segments || self.triangles.capacity() < uniforms.max_triangles() {
            self.field = ScalarField::new(segments);
            self.triangles = Vec::with_capacity(uniforms.max_triangles());
            self.count = 0;
        }
        self.uniforms = uniforms;
    }

    fn dispatch_field_eval(&mut self) {
        evaluate_field(
            &self.noise,
            self.uniforms.chunk_origin,
            self.uniforms.noise_scale,
            &mut self.field,
        );
    }

    fn dispatch_triangulate(&mut self) -> Result<()> {
        self.count = 0;
        self.triangles.clear();
        let view = self.field.view()?;
        let written = triangulate(
            view,
            self.uniforms.iso_threshold,
            self.uniforms.cell_size(),
            &mut self.triangles,
        );
        debug_assert!(written <= self.uniforms.max_triangles());
        self.count = written as u32;
        Ok(())
    }

    fn read_count(&self) -> u32 {
        self.count
    }

    fn read_triangles(&self, max_count: usize) -> &[Triangle] {
        let n = max_count.min(self.count as usize).min(self.triangles.len());
        &self.triangles[..n]
    }

    fn read_field(&self) -> &[Value] {
        self.field.values()
    }

    fn write_field(&mut self, values: &[Value]) -> Result<()> {
        self.field.copy_from(values)
    }

    fn release(&mut self) {
        self.field = ScalarField::new(0);
        self.triangles = Vec::new();
        self.count = 0;
    }
}

/// Blocking front end over a [`ComputeBackend`].
pub struct ComputeBridge<B> {
    backend: B,
    uniforms: Uniforms,
}

impl<B: ComputeBackend> ComputeBridge<B> {
    pub fn new(mut backend: B, uniforms: Uniforms) -> Self {
        backend.set_uniforms(uniforms);
        Self { backend, uniforms }
    }

    pub fn uniforms(&self) -> &Uniforms {
        &self.uniforms
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Evaluates the field of the chunk at `coord` into the shared field buffer and returns it.
    pub fn evaluate_field(&mut self, coord: ChunkCoord) -> &[Value] {
        self.uniforms.chunk_origin = coord.as_point();
        self.backend.set_uniforms(self.uniforms);
        self.backend.dispatch_field_eval();
        self.backend.read_field()
    }

    /// Triangulates the shared field buffer and returns the valid prefix of the triangle buffer.
    pub fn triangulate(&mut self) -> Result<&[Triangle]> {
        self.backend.dispatch_triangulate()?;
        let count = self.backend.read_count() as usize;
        trace!("triangulated {count} triangles at {:?}", self.uniforms.chunk_origin);
        Ok(self.backend.read_triangles(count))
    }

    /// Overwrites the shared field buffer, e.g. with an edited chunk field.
    pub fn upload_field(&mut self, field: &ScalarField) -> Result<()> {
        if field.segments() != self.uniforms.segment_count as usize {
            return Err(TerrainError::FieldSizeMismatch {
                expected: ScalarField::len_for(self.uniforms.segment_count as usize),
                found: field.values().len(),
            });
        }
        self.backend.write_field(field.values())
    }

    /// Frees the backend's buffers.
    pub fn release(&mut self) {
        self.backend.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::SimplexNoise;

    fn uniforms(segments: u32) -> Uniforms {
        Uniforms {
            segment_count: segments,
            noise_scale: 1.,
            chunk_origin: Point::origin(),
            iso_threshold: 0.5,
            axis_size: segments as Value,
        }
    }

    #[test]
    fn triangle_buffer_is_sized_for_worst_case() {
        let backend = CpuBackend::new(SimplexNoise::new(0), uniforms(4));
        assert_eq!(uniforms(4).max_triangles(), 4 * 4 * 4 * 5);
        assert!(backend.triangles.capacity() >= 320);
    }

    #[test]
    fn counter_is_reset_between_dispatches() {
        let noise = |p: Point| -> Value { if p.x < 0.3 { 1. } else { -1. } };
        let mut bridge = ComputeBridge::new(CpuBackend::new(noise, uniforms(4)), uniforms(4));
        bridge.evaluate_field(ChunkCoord::new(0, 0, 0));
        let first = bridge.triangulate().unwrap().len();
        assert!(first > 0);
        assert_eq!(bridge.triangulate().unwrap().len(), first);
        assert_eq!(bridge.backend().read_count() as usize, first);

        bridge.evaluate_field(ChunkCoord::new(5, 0, 0));
        assert!(bridge.triangulate().unwrap().is_empty());
        assert_eq!(bridge.backend().read_count(), 0);
    }

    #[test]
    fn read_triangles_slices_valid_prefix() {
        let noise = |p: Point| -> Value { if p.y < 0.5 { 1. } else { -1. } };
        let mut backend = CpuBackend::new(noise, uniforms(4));
        backend.dispatch_field_eval();
        backend.dispatch_triangulate().unwrap();
        let count = backend.read_count() as usize;
        assert!(count > 0);
        assert_eq!(backend.read_triangles(usize::MAX).len(), count);
        assert_eq!(backend.read_triangles(3).len(), 3);
    }

    #[test]
    fn upload_replaces_field_buffer() {
        let noise = |_: Point| -> Value { -1. };
        let mut bridge = ComputeBridge::new(CpuBackend::new(noise, uniforms(2)), uniforms(2));
        bridge.evaluate_field(ChunkCoord::default());
        assert!(bridge.triangulate().unwrap().is_empty());

        let mut field = ScalarField::new(2);
        field.set(1, 1, 1, 1.);
        bridge.upload_field(&field).unwrap();
        assert_eq!(bridge.backend().read_field(), field.values());
        assert_eq!(bridge.triangulate().unwrap().len(), 8);
    }

    #[test]
    fn upload_rejects_foreign_field_size() {
        let mut bridge = ComputeBridge::new(CpuBackend::new(SimplexNoise::new(0), uniforms(2)), uniforms(2));
        let err = bridge.upload_field(&ScalarField::new(3)).unwrap_err();
        assert!(matches!(err, TerrainError::FieldSizeMismatch { expected: 27, found: 64 }));
    }

    #[test]
    fn released_buffers_are_reallocated_on_next_use() {
        let mut bridge = ComputeBridge::new(CpuBackend::new(SimplexNoise::new(3), uniforms(4)), uniforms(4));
        bridge.release();
        assert_eq!(bridge.backend().read_field().len(), 1);
        assert_eq!(bridge.evaluate_field(ChunkCoord::default()).len(), 125);
    }
}
