use std::collections::{HashMap, HashSet};

use tracing::{debug, info, trace, warn};

use crate::{
    bridge::{ComputeBackend, ComputeBridge, CpuBackend, Uniforms},
    chunk::Chunk,
    config::TerrainConfig,
    error::{Result, TerrainError},
    field::SimplexNoise,
    mesh::ChunkMesh,
    types::{ChunkCoord, Point, Value, Vector},
};

/// Field change that turns a solid corner into an empty one: anything at or below
/// `iso_threshold - 1` is open space after clamping.
const CAVITY_EPSILON: Value = 1.00001;

/// A chunk regeneration found open space at `position`.
///
/// Emitted only when [`TerrainConfig::spawn_threshold`] is set; intended as a spawn point for
/// agents that live inside the terrain's cavities.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OccupancySignal {
    pub coord: ChunkCoord,
    pub position: Point,
}

/// What one [`ChunkStreamer::tick`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The viewer moved far enough for a new window to be computed.
    pub retargeted: bool,
    /// Chunks regenerated at a new coordinate.
    pub recycled: usize,
    /// Coordinates still waiting for a chunk.
    pub pending: usize,
}

/// Per-chunk outcome of a world edit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EditReport {
    /// Loaded chunks whose field changed and whose mesh was rebuilt.
    pub edited: usize,
    /// Loaded chunks in the footprint that the brush missed.
    pub untouched: usize,
    /// Footprint coordinates with no loaded chunk.
    pub skipped: usize,
}

/// Keeps a cube of chunks loaded around a moving viewer.
///
/// The streamer owns a fixed pool of [`Chunk`]s, one per coordinate of the window, and the
/// [`ComputeBridge`] they all share. When the viewer moves more than half a chunk since the
/// last window computation, the new window is diffed against the loaded set; chunks that
/// fell out of it are then regenerated at vacant coordinates, at most
/// [`max_recycled_per_frame`](TerrainConfig::max_recycled_per_frame) per tick.
///
/// ```text
/// init(viewer)  →  tick(viewer)*  →  teardown()
///                   ├─ retarget: desired cube − loaded = to_add, loaded − desired = to_remove
///                   └─ recycle:  (to_remove[i] → to_add[i]) up to the per-tick budget
/// ```
pub struct ChunkStreamer<B> {
    config: TerrainConfig,
    bridge: ComputeBridge<B>,
    chunks: Vec<Chunk>,
    loaded: HashMap<ChunkCoord, usize>,
    to_add: Vec<ChunkCoord>,
    to_remove: Vec<ChunkCoord>,
    last_retarget: Option<Point>,
    window: Option<(ChunkCoord, ChunkCoord)>,
    occupancy: Vec<OccupancySignal>,
    generation: u64,
}

impl ChunkStreamer<CpuBackend<SimplexNoise>> {
    /// Builds a streamer over rayon and seeded simplex noise.
    pub fn from_config(config: TerrainConfig) -> Result<Self> {
        config.validate()?;
        let uniforms = Uniforms::from_config(&config);
        let backend = CpuBackend::new(SimplexNoise::new(config.seed), uniforms);
        Self::new(config, ComputeBridge::new(backend, uniforms))
    }
}

impl<B: ComputeBackend> ChunkStreamer<B> {
    /// Creates an empty streamer. Nothing is generated until [`init`](ChunkStreamer::init).
    pub fn new(config: TerrainConfig, bridge: ComputeBridge<B>) -> Result<Self> {
        config.validate()?;
        if bridge.uniforms().segment_count as usize != config.segments {
            return Err(TerrainError::InvalidConfig(
                "bridge segment count differs from config",
            ));
        }
        Ok(Self {
            config,
            bridge,
            chunks: Vec::new(),
            loaded: HashMap::new(),
            to_add: Vec::new(),
            to_remove: Vec::new(),
            last_retarget: None,
            window: None,
            occupancy: Vec::new(),
            generation: 0,
        })
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn bridge(&self) -> &ComputeBridge<B> {
        &self.bridge
    }

    /// The chunk pool, indexed by [`Chunk::slot`].
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// The chunk currently loaded at `coord`, if any.
    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.loaded.get(&coord).map(|&slot| &self.chunks[slot])
    }

    pub fn loaded_coords(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        self.loaded.keys().copied()
    }

    /// Number of times [`init`](ChunkStreamer::init) has run. Chunk revisions restart with
    /// every generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_initialized(&self) -> bool {
        !self.chunks.is_empty()
    }

    /// Coordinates of the current window still waiting for a chunk.
    pub fn pending(&self) -> usize {
        self.to_add.len()
    }

    /// Allocates and generates one chunk per coordinate of the window around `viewer`.
    ///
    /// Calling it on an initialised streamer tears the old terrain down first.
    pub fn init(&mut self, viewer: Point) -> Result<()> {
        if self.is_initialized() {
            warn!("terrain already initialised, tearing down before init");
            self.teardown();
        }

        self.generation += 1;
        self.retarget(viewer);
        let segments = self.config.segments;
        let spawn_threshold = self.config.spawn_threshold;
        self.chunks.reserve_exact(self.to_add.len());

        for coord in std::mem::take(&mut self.to_add) {
            let slot = self.chunks.len();
            let mut chunk = Chunk::new(slot, segments);
            let spawn = chunk.regenerate(coord, &mut self.bridge, spawn_threshold)?;
            self.chunks.push(chunk);
            self.loaded.insert(coord, slot);
            if let Some(position) = spawn {
                self.occupancy.push(OccupancySignal { coord, position });
            }
        }

        if self.config.carve_spawn_cavity {
            let radius = self.config.chunk_size / 2.;
            let delta = self.config.iso_threshold - CAVITY_EPSILON;
            self.edit(viewer, delta, radius)?;
        }

        info!(
            "terrain initialised: {} chunks around {}",
            self.chunks.len(),
            ChunkCoord::from_world(viewer, self.config.chunk_size),
        );
        Ok(())
    }

    /// Advances streaming by one frame.
    ///
    /// Does nothing before [`init`](ChunkStreamer::init). With a stationary viewer and no
    /// pending work, a tick changes nothing.
    pub fn tick(&mut self, viewer: Point) -> Result<TickReport> {
        let Some(last) = self.last_retarget else {
            return Ok(TickReport::default());
        };

        let retargeted = (viewer - last).norm_squared() > self.config.retarget_distance_squared();
        if retargeted {
            self.retarget(viewer);
        }
        let recycled = self.recycle()?;

        Ok(TickReport {
            retargeted,
            recycled,
            pending: self.to_add.len(),
        })
    }

    /// Recomputes the window around `viewer` and replaces both work lists.
    ///
    /// `to_add` is ordered nearest-first so the space around the viewer fills in first.
    fn retarget(&mut self, viewer: Point) {
        let center = ChunkCoord::from_world(viewer, self.config.chunk_size);
        let radius = self.config.view_radius();
        let desired: HashSet<ChunkCoord> = center.cube_around(radius).collect();

        self.to_remove = self
            .loaded
            .keys()
            .filter(|coord| !desired.contains(*coord))
            .copied()
            .collect();
        self.to_add = center
            .cube_around(radius)
            .filter(|coord| !self.loaded.contains_key(coord))
            .collect();
        self.to_add.sort_by_key(|coord| coord.chebyshev_distance(center));

        let extent = ChunkCoord::new(radius, radius, radius);
        self.window = Some((center - extent, center + extent));
        self.last_retarget = Some(viewer);

        debug!(
            "retarget around {center}: {} to add, {} to remove",
            self.to_add.len(),
            self.to_remove.len(),
        );
    }

    /// Moves up to `max_recycled_per_frame` chunks from stale coordinates to vacant ones.
    fn recycle(&mut self) -> Result<usize> {
        let count = self
            .config
            .max_recycled_per_frame
            .min(self.to_add.len())
            .min(self.to_remove.len());
        let spawn_threshold = self.config.spawn_threshold;

        let adds: Vec<ChunkCoord> = self.to_add.drain(..count).collect();
        let removes: Vec<ChunkCoord> = self.to_remove.drain(..count).collect();

        let mut recycled = 0;
        for (remove, add) in removes.into_iter().zip(adds) {
            let Some(slot) = self.loaded.remove(&remove) else {
                continue;
            };
            let spawn = self.chunks[slot].regenerate(add, &mut self.bridge, spawn_threshold)?;
            self.loaded.insert(add, slot);
            if let Some(position) = spawn {
                self.occupancy.push(OccupancySignal { coord: add, position });
            }
            trace!("recycled chunk {slot}: {remove} -> {add}");
            recycled += 1;
        }
        Ok(recycled)
    }

    /// Releases every chunk and the bridge buffers. [`init`](ChunkStreamer::init) starts over.
    pub fn teardown(&mut self) {
        for chunk in &mut self.chunks {
            chunk.release();
        }
        self.chunks.clear();
        self.loaded.clear();
        self.to_add.clear();
        self.to_remove.clear();
        self.last_retarget = None;
        self.window = None;
        self.occupancy.clear();
        self.bridge.release();
        info!("terrain torn down");
    }

    /// Tears down and regenerates the terrain around `viewer`, discarding all edits.
    pub fn reload(&mut self, viewer: Point) -> Result<()> {
        self.teardown();
        self.init(viewer)
    }

    /// Applies a spherical brush at world-space `center` to every loaded chunk it may reach.
    ///
    /// Chunks whose field changed are re-meshed immediately. Positive `delta` fills,
    /// negative digs.
    pub fn edit(&mut self, center: Point, delta: Value, radius: Value) -> Result<EditReport> {
        let chunk_size = self.config.chunk_size;
        let reach = Vector::repeat(radius + self.config.cell_size());
        let lo = ChunkCoord::from_world(center - reach, chunk_size);
        let hi = ChunkCoord::from_world(center + reach, chunk_size);

        // filter the loaded set, the footprint box grows with `radius`
        let mut reached: Vec<(ChunkCoord, usize)> = self
            .loaded
            .iter()
            .filter(|(coord, _)| lo.x <= coord.x && coord.x <= hi.x)
            .filter(|(coord, _)| lo.y <= coord.y && coord.y <= hi.y)
            .filter(|(coord, _)| lo.z <= coord.z && coord.z <= hi.z)
            .map(|(&coord, &slot)| (coord, slot))
            .collect();
        reached.sort_unstable_by_key(|&(coord, _)| (coord.z, coord.y, coord.x));

        let mut report = EditReport {
            skipped: footprint_volume(lo, hi).saturating_sub(reached.len()),
            ..Default::default()
        };
        for (coord, slot) in reached {
            let chunk = &mut self.chunks[slot];
            let local = Point::from(center - coord.origin(chunk_size));
            if chunk.edit(local, delta, radius, &mut self.bridge)? {
                chunk.remesh(&mut self.bridge)?;
                report.edited += 1;
            } else {
                report.untouched += 1;
            }
        }

        if report.skipped > 0 {
            debug!(
                "edit at {center:?} reached {} unloaded chunks",
                report.skipped
            );
        }
        Ok(report)
    }

    /// [`edit`](ChunkStreamer::edit) with [`TerrainConfig::edit_radius`].
    pub fn edit_with_default_radius(&mut self, center: Point, delta: Value) -> Result<EditReport> {
        self.edit(center, delta, self.config.edit_radius)
    }

    /// World-space bounds of the window computed at the last retarget.
    pub fn window_bounds(&self) -> Option<(Point, Point)> {
        let chunk_size = self.config.chunk_size;
        self.window.map(|(min, max)| {
            (
                min.origin(chunk_size),
                (max + ChunkCoord::new(1, 1, 1)).origin(chunk_size),
            )
        })
    }

    /// Inward-facing box around [`window_bounds`](ChunkStreamer::window_bounds), for use as a
    /// world border collider.
    pub fn border_mesh(&self) -> Option<ChunkMesh> {
        self.window_bounds()
            .map(|(min, max)| ChunkMesh::border_box(min, max))
    }

    /// Takes every occupancy signal emitted since the last drain.
    pub fn drain_occupancy(&mut self) -> std::vec::Drain<'_, OccupancySignal> {
        self.occupancy.drain(..)
    }
}

/// Number of chunk coordinates in the inclusive box `[lo, hi]`, saturating at `usize::MAX`.
fn footprint_volume(lo: ChunkCoord, hi: ChunkCoord) -> usize {
    [(lo.x, hi.x), (lo.y, hi.y), (lo.z, hi.z)]
        .into_iter()
        .map(|(lo, hi)| (hi as i64 - lo as i64 + 1).max(0) as u64)
        .fold(1u64, u64::saturating_mul)
        .try_into()
        .unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TerrainConfig {
        TerrainConfig::default()
            .with_view_distance(2)
            .with_segments(4)
            .with_chunk_size(4.)
            .with_max_recycled_per_frame(5)
            .with_spawn_cavity(false)
    }

    fn streamer(config: TerrainConfig) -> ChunkStreamer<CpuBackend<SimplexNoise>> {
        ChunkStreamer::from_config(config).unwrap()
    }

    #[test]
    fn new_rejects_invalid_config() {
        assert!(ChunkStreamer::from_config(config().with_view_distance(0)).is_err());

        let uniforms = Uniforms::from_config(&config().with_segments(8));
        let bridge = ComputeBridge::new(CpuBackend::new(SimplexNoise::new(0), uniforms), uniforms);
        let err = ChunkStreamer::new(config(), bridge).err();
        assert!(matches!(err, Some(TerrainError::InvalidConfig(_))));
    }

    #[test]
    fn tick_before_init_is_a_no_op() {
        let mut streamer = streamer(config());
        assert_eq!(streamer.tick(Point::origin()).unwrap(), TickReport::default());
        assert!(!streamer.is_initialized());
    }

    #[test]
    fn init_loads_window_around_viewer() {
        let mut streamer = streamer(config());
        streamer.init(Point::new(-1., 5., 2.)).unwrap();
        assert_eq!(streamer.chunks().len(), 27);
        assert_eq!(streamer.pending(), 0);

        let center = ChunkCoord::new(-1, 1, 0);
        for coord in center.cube_around(1) {
            let chunk = streamer.chunk(coord).unwrap();
            assert_eq!(chunk.coord(), coord);
        }
        assert_eq!(
            streamer.window_bounds(),
            Some((Point::new(-8., 0., -4.), Point::new(4., 12., 8.)))
        );
        assert_eq!(streamer.border_mesh().unwrap().triangle_count(), 12);
    }

    #[test]
    fn small_moves_do_not_retarget() {
        let mut streamer = streamer(config());
        streamer.init(Point::new(2., 2., 2.)).unwrap();
        // half a chunk is 2 world units
        let report = streamer.tick(Point::new(3.9, 2., 2.)).unwrap();
        assert!(!report.retargeted);
        let report = streamer.tick(Point::new(4.1, 2., 2.)).unwrap();
        assert!(report.retargeted);
    }

    #[test]
    fn recycling_respects_budget() {
        let mut streamer = streamer(config());
        streamer.init(Point::new(2., 2., 2.)).unwrap();
        let before: Vec<u64> = streamer.chunks().iter().map(Chunk::revision).collect();

        // one chunk over on x: a 3x3 slab of 9 coordinates changes hands
        let report = streamer.tick(Point::new(6., 2., 2.)).unwrap();
        assert_eq!(report, TickReport { retargeted: true, recycled: 5, pending: 4 });
        let report = streamer.tick(Point::new(6., 2., 2.)).unwrap();
        assert_eq!(report, TickReport { retargeted: false, recycled: 4, pending: 0 });

        let changed = streamer
            .chunks()
            .iter()
            .zip(before)
            .filter(|(chunk, revision)| chunk.revision() != *revision)
            .count();
        assert_eq!(changed, 9);
        assert_eq!(streamer.chunks().len(), 27);
    }

    #[test]
    fn spawn_cavity_opens_space_at_viewer() {
        let viewer = Point::new(2., 2., 2.);
        let mut streamer = streamer(config().with_spawn_cavity(true));
        streamer.init(viewer).unwrap();
        let chunk = streamer.chunk(ChunkCoord::default()).unwrap();
        // the viewer sits on corner (2, 2, 2)
        assert!(chunk.field().get(2, 2, 2) < streamer.config().iso_threshold);
    }

    #[test]
    fn occupancy_signals_are_drained() {
        let mut streamer = streamer(config().with_spawn_threshold(1.));
        streamer.init(Point::new(2., 2., 2.)).unwrap();
        let signals: Vec<_> = streamer.drain_occupancy().collect();
        assert_eq!(signals.len(), 27);
        for signal in &signals {
            // threshold 1 accepts every corner, so the scan stops at corner 0
            assert_eq!(signal.position, signal.coord.origin(4.));
        }
        assert_eq!(streamer.drain_occupancy().count(), 0);
    }

    #[test]
    fn teardown_releases_everything() {
        let mut streamer = streamer(config());
        streamer.init(Point::origin()).unwrap();
        streamer.teardown();
        assert!(!streamer.is_initialized());
        assert_eq!(streamer.loaded_coords().count(), 0);
        assert_eq!(streamer.window_bounds(), None);
        assert_eq!(streamer.tick(Point::origin()).unwrap(), TickReport::default());

        streamer.reload(Point::origin()).unwrap();
        assert_eq!(streamer.chunks().len(), 27);
        assert_eq!(streamer.generation(), 2);
    }

    #[test]
    fn footprint_volume_counts_inclusive_boxes() {
        let origin = ChunkCoord::default();
        assert_eq!(footprint_volume(origin, origin), 1);
        assert_eq!(footprint_volume(ChunkCoord::new(-1, -1, -1), ChunkCoord::new(1, 1, 1)), 27);
        assert_eq!(footprint_volume(ChunkCoord::new(1, 0, 0), origin), 0);
        let max = ChunkCoord::new(i32::MAX, i32::MAX, i32::MAX);
        let min = ChunkCoord::new(i32::MIN, i32::MIN, i32::MIN);
        assert_eq!(footprint_volume(min, max), usize::MAX);
    }

    #[test]
    fn huge_brush_only_visits_loaded_chunks() {
        let mut streamer = streamer(config());
        streamer.init(Point::new(2., 2., 2.)).unwrap();
        let revisions: Vec<u64> = streamer.chunks().iter().map(Chunk::revision).collect();

        // 800 chunks across on every axis: far too many coordinates to walk one by one
        let radius = 800. * 4.;
        let report = streamer.edit(Point::new(2., 2., 2.), 0.25, radius).unwrap();
        let reach = radius + streamer.config().cell_size();
        let span = (((2. + reach) / 4.).floor() - ((2. - reach) / 4.).floor()) as usize + 1;
        assert_eq!(report.edited, 27);
        assert_eq!(report.untouched, 0);
        assert_eq!(report.skipped, span.pow(3) - 27);

        for (chunk, revision) in streamer.chunks().iter().zip(revisions) {
            assert_eq!(chunk.revision(), revision + 1);
        }
    }

    #[test]
    fn edit_during_recycle_reaches_chunks_leaving_the_window() {
        let mut streamer = streamer(config().with_max_recycled_per_frame(1));
        streamer.init(Point::new(2., 2., 2.)).unwrap();
        let report = streamer.tick(Point::new(6., 2., 2.)).unwrap();
        assert!(report.pending > 0);

        // x = -1 is outside the new window but stays loaded until it is recycled
        let leaving = streamer.loaded_coords().find(|coord| coord.x == -1).unwrap();
        let slot = streamer.chunk(leaving).unwrap().slot();
        let revision = streamer.chunks()[slot].revision();
        let center = leaving.origin(4.) + Vector::repeat(2.);
        let report = streamer.edit(center, 0.25, 1.).unwrap();
        assert_eq!(report.edited, 1);
        assert_eq!(streamer.chunks()[slot].revision(), revision + 1);
    }
}
