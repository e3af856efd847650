use crate::{
    bridge::{ComputeBackend, ComputeBridge},
    error::Result,
    field::ScalarField,
    mesh::ChunkMesh,
    types::{ChunkCoord, Point, Value, Vector},
};

/// Lifecycle of a pooled [`Chunk`].
///
/// ```text
/// Pooled → Generating → Ready → (Editing → Ready)* → Pooled
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ChunkState {
    /// Allocated but holding no terrain.
    #[default]
    Pooled,
    /// Field evaluation or triangulation in progress.
    Generating,
    /// Field and mesh describe `coord`.
    Ready,
    /// Field edited and uploaded; the mesh is stale until the next [`Chunk::remesh`].
    Editing,
}

/// One cube of terrain: a scalar field and the mesh triangulated from it.
///
/// Chunks are allocated once and then moved around the world by
/// [`regenerate`](Chunk::regenerate), which reuses both the field and the mesh allocations.
///
/// The field covers `[origin, origin + chunk_size]` on every axis, where
/// `origin = coord * chunk_size`. Mesh positions are chunk-local.
#[derive(Clone, Debug)]
pub struct Chunk {
    slot: usize,
    coord: ChunkCoord,
    field: ScalarField,
    mesh: ChunkMesh,
    state: ChunkState,
    revision: u64,
}

impl Chunk {
    /// Creates a pooled chunk with a zeroed `segments³` field.
    pub fn new(slot: usize, segments: usize) -> Self {
        Self {
            slot,
            coord: ChunkCoord::default(),
            field: ScalarField::new(segments),
            mesh: ChunkMesh::new_empty(),
            state: ChunkState::Pooled,
            revision: 0,
        }
    }

    /// Index of this chunk in its streamer's pool. Stable for the chunk's lifetime.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    pub fn field(&self) -> &ScalarField {
        &self.field
    }

    pub fn mesh(&self) -> &ChunkMesh {
        &self.mesh
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    /// Incremented every time the mesh is rebuilt.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// World-space position of the chunk's minimum corner.
    pub fn origin(&self, chunk_size: Value) -> Point {
        self.coord.origin(chunk_size)
    }

    /// Moves the chunk to `coord` and rebuilds its field and mesh.
    ///
    /// When `spawn_threshold` is set, returns the world position of the first field corner,
    /// in z, y, x scan order, whose value is at or below it.
    pub fn regenerate<B: ComputeBackend>(
        &mut self,
        coord: ChunkCoord,
        bridge: &mut ComputeBridge<B>,
        spawn_threshold: Option<Value>,
    ) -> Result<Option<Point>> {
        self.state = ChunkState::Generating;
        self.coord = coord;

        let values = bridge.evaluate_field(coord);
        self.field.copy_from(values)?;
        self.rebuild_mesh(bridge)?;

        let uniforms = bridge.uniforms();
        let origin = self.origin(uniforms.axis_size);
        let cell_size = uniforms.cell_size();
        Ok(spawn_threshold
            .and_then(|threshold| self.field.find_at_or_below(threshold))
            .map(|[x, y, z]| origin + Vector::new(x as Value, y as Value, z as Value) * cell_size))
    }

    /// Re-triangulates the bridge's current field buffer, which [`edit`](Chunk::edit) left
    /// holding this chunk's field.
    pub fn remesh<B: ComputeBackend>(&mut self, bridge: &mut ComputeBridge<B>) -> Result<()> {
        self.rebuild_mesh(bridge)
    }

    fn rebuild_mesh<B: ComputeBackend>(&mut self, bridge: &mut ComputeBridge<B>) -> Result<()> {
        let triangles = bridge.triangulate()?;
        self.mesh.rebuild(triangles);
        self.revision += 1;
        self.state = ChunkState::Ready;
        Ok(())
    }

    /// Adds `delta` to every field corner within `radius` of `local_center` and uploads the
    /// field to the bridge.
    ///
    /// `local_center` is relative to the chunk origin. Returns `false` without touching the
    /// field or the bridge when the brush misses the chunk or the chunk is pooled. The mesh
    /// is not rebuilt; call [`remesh`](Chunk::remesh) next.
    pub fn edit<B: ComputeBackend>(
        &mut self,
        local_center: Point,
        delta: Value,
        radius: Value,
        bridge: &mut ComputeBridge<B>,
    ) -> Result<bool> {
        if self.state == ChunkState::Pooled {
            return Ok(false);
        }
        let cell_size = bridge.uniforms().cell_size();
        if !self.field.apply_brush(local_center, delta, radius, cell_size) {
            return Ok(false);
        }
        self.state = ChunkState::Editing;
        bridge.upload_field(&self.field)?;
        Ok(true)
    }

    /// Returns the chunk to the pool, dropping its geometry.
    pub fn release(&mut self) {
        self.mesh.clear();
        self.state = ChunkState::Pooled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{CpuBackend, Uniforms};

    fn bridge<N: Fn(Point) -> Value + Send + Sync>(noise: N) -> ComputeBridge<CpuBackend<N>> {
        let uniforms = Uniforms {
            segment_count: 4,
            noise_scale: 1.,
            chunk_origin: Point::origin(),
            iso_threshold: 0.5,
            axis_size: 8.,
        };
        ComputeBridge::new(CpuBackend::new(noise, uniforms), uniforms)
    }

    // solid below world y = 0.5 chunk units
    fn ground(p: Point) -> Value {
        if p.y < 0.5 { 1. } else { -1. }
    }

    #[test]
    fn regenerate_moves_chunk_and_builds_mesh() {
        let mut bridge = bridge(ground);
        let mut chunk = Chunk::new(3, 4);
        assert_eq!(chunk.state(), ChunkState::Pooled);

        chunk.regenerate(ChunkCoord::new(0, 0, 0), &mut bridge, None).unwrap();
        assert_eq!(chunk.state(), ChunkState::Ready);
        assert_eq!(chunk.slot(), 3);
        assert_eq!(chunk.revision(), 1);
        assert!(!chunk.mesh().is_empty());
        assert_eq!(chunk.field().values(), bridge.backend().read_field());

        // entirely above the ground: empty mesh, same allocations
        chunk.regenerate(ChunkCoord::new(2, 1, -1), &mut bridge, None).unwrap();
        assert_eq!(chunk.coord(), ChunkCoord::new(2, 1, -1));
        assert_eq!(chunk.origin(8.), Point::new(16., 8., -8.));
        assert!(chunk.mesh().is_empty());
        assert_eq!(chunk.revision(), 2);
    }

    #[test]
    fn spawn_scan_reports_first_open_corner() {
        let mut bridge = bridge(ground);
        let mut chunk = Chunk::new(0, 4);
        let spawn = chunk
            .regenerate(ChunkCoord::new(1, 0, 0), &mut bridge, Some(0.2))
            .unwrap();
        // corners with y >= 2 sit at 0.5 chunk units or above and are empty
        assert_eq!(spawn, Some(Point::new(8., 4., 0.)));

        let mut chunk = Chunk::new(0, 4);
        let solid = |_: Point| -> Value { 1. };
        let mut solid_bridge = self::bridge(solid);
        assert_eq!(chunk.regenerate(ChunkCoord::default(), &mut solid_bridge, Some(0.2)).unwrap(), None);
    }

    #[test]
    fn edit_then_remesh_updates_geometry() {
        let empty = |_: Point| -> Value { -1. };
        let mut bridge = bridge(empty);
        let mut chunk = Chunk::new(0, 4);
        chunk.regenerate(ChunkCoord::default(), &mut bridge, None).unwrap();
        assert!(chunk.mesh().is_empty());

        assert!(chunk.edit(Point::new(4., 4., 4.), 1., 2.5, &mut bridge).unwrap());
        assert_eq!(chunk.state(), ChunkState::Editing);
        assert_eq!(chunk.mesh().triangle_count(), 0);
        assert_eq!(bridge.backend().read_field(), chunk.field().values());

        chunk.remesh(&mut bridge).unwrap();
        assert_eq!(chunk.state(), ChunkState::Ready);
        assert!(chunk.mesh().triangle_count() > 0);
    }

    #[test]
    fn edit_outside_chunk_is_rejected() {
        let mut bridge = bridge(ground);
        let mut chunk = Chunk::new(0, 4);
        chunk.regenerate(ChunkCoord::default(), &mut bridge, None).unwrap();
        let before = chunk.field().clone();
        assert!(!chunk.edit(Point::new(40., 4., 4.), -1., 2., &mut bridge).unwrap());
        assert_eq!(chunk.field(), &before);
        assert_eq!(chunk.state(), ChunkState::Ready);
    }

    #[test]
    fn released_chunks_ignore_edits() {
        let mut bridge = bridge(ground);
        let mut chunk = Chunk::new(0, 4);
        chunk.regenerate(ChunkCoord::default(), &mut bridge, None).unwrap();
        chunk.release();
        assert_eq!(chunk.state(), ChunkState::Pooled);
        assert!(chunk.mesh().is_empty());
        assert!(!chunk.edit(Point::new(4., 4., 4.), -1., 2., &mut bridge).unwrap());
    }
}
