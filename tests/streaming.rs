use std::collections::HashSet;

use bevy_marching_terrain::{
    bridge::CpuBackend,
    chunk::ChunkState,
    config::TerrainConfig,
    field::{ScalarField, SimplexNoise, evaluate_field},
    streamer::{ChunkStreamer, TickReport},
    types::{ChunkCoord, Point},
};

type Streamer = ChunkStreamer<CpuBackend<SimplexNoise>>;

fn config() -> TerrainConfig {
    TerrainConfig::default()
        .with_view_distance(3)
        .with_segments(4)
        .with_chunk_size(4.)
        .with_max_recycled_per_frame(7)
        .with_seed(42)
        .with_spawn_cavity(false)
}

fn init(config: TerrainConfig, viewer: Point) -> Streamer {
    let mut streamer = ChunkStreamer::from_config(config).unwrap();
    streamer.init(viewer).unwrap();
    streamer
}

fn window(streamer: &Streamer, viewer: Point) -> HashSet<ChunkCoord> {
    let config = streamer.config();
    ChunkCoord::from_world(viewer, config.chunk_size)
        .cube_around(config.view_radius())
        .collect()
}

/// Asserts the pool holds exactly `expected`, once each, and every field is freshly evaluated.
fn assert_loaded_exactly(streamer: &Streamer, expected: &HashSet<ChunkCoord>) {
    let config = streamer.config();
    let noise = SimplexNoise::new(config.seed);
    let coords: Vec<ChunkCoord> = streamer.chunks().iter().map(|chunk| chunk.coord()).collect();
    let unique: HashSet<ChunkCoord> = coords.iter().copied().collect();
    assert_eq!(coords.len(), unique.len(), "a coordinate is loaded twice");
    assert_eq!(&unique, expected);
    assert_eq!(streamer.loaded_coords().collect::<HashSet<_>>(), unique);

    for chunk in streamer.chunks() {
        assert_eq!(chunk.state(), ChunkState::Ready);
        let mut fresh = ScalarField::new(config.segments);
        evaluate_field(&noise, chunk.coord().as_point(), config.noise_scale, &mut fresh);
        assert_eq!(chunk.field(), &fresh, "stale field at {}", chunk.coord());
    }
}

#[test]
fn stationary_viewer_is_idempotent() {
    let viewer = Point::new(1., 2., 3.);
    let mut streamer = init(config(), viewer);
    let fields: Vec<ScalarField> = streamer.chunks().iter().map(|c| c.field().clone()).collect();
    let revisions: Vec<u64> = streamer.chunks().iter().map(|c| c.revision()).collect();

    for _ in 0..5 {
        assert_eq!(streamer.tick(viewer).unwrap(), TickReport::default());
    }
    // jitter below half a chunk
    assert_eq!(streamer.tick(Point::new(2.5, 2., 3.)).unwrap(), TickReport::default());

    let after: Vec<ScalarField> = streamer.chunks().iter().map(|c| c.field().clone()).collect();
    assert_eq!(after, fields);
    assert_eq!(
        streamer.chunks().iter().map(|c| c.revision()).collect::<Vec<_>>(),
        revisions
    );
}

#[test]
fn init_generates_the_full_window() {
    let viewer = Point::new(-3., 9., 0.5);
    let streamer = init(config(), viewer);
    assert_eq!(streamer.chunks().len(), streamer.config().chunk_count());
    assert_loaded_exactly(&streamer, &window(&streamer, viewer));
}

#[test]
fn converges_within_budgeted_ticks() {
    let start = Point::new(2., 2., 2.);
    let mut streamer = init(config(), start);
    let pool = streamer.chunks().len();

    let target = Point::new(10., 2., 6.);
    let before = window(&streamer, start);
    let after = window(&streamer, target);
    let vacancies = after.difference(&before).count();
    let budget = streamer.config().max_recycled_per_frame;
    let expected_ticks = vacancies.div_ceil(budget);

    let mut ticks = 0;
    let mut recycled = 0;
    loop {
        let report = streamer.tick(target).unwrap();
        assert_eq!(report.retargeted, ticks == 0);
        assert!(report.recycled <= budget);
        assert_eq!(streamer.chunks().len(), pool);
        ticks += 1;
        recycled += report.recycled;
        if report.pending == 0 {
            break;
        }
        assert!(ticks < 100, "streamer never converged");
    }

    assert_eq!(ticks, expected_ticks);
    assert_eq!(recycled, vacancies);
    assert_loaded_exactly(&streamer, &after);
    assert_eq!(streamer.tick(target).unwrap(), TickReport::default());
}

#[test]
fn retarget_mid_recycle_replaces_work_lists() {
    let start = Point::new(2., 2., 2.);
    let mut streamer = init(config().with_max_recycled_per_frame(3), start);

    let report = streamer.tick(Point::new(30., 2., 2.)).unwrap();
    assert_eq!(report.recycled, 3);
    assert!(report.pending > 0);

    // turn around before the first move finished
    let back = Point::new(-6., 2., 2.);
    let mut ticks = 0;
    while streamer.tick(back).unwrap().pending > 0 {
        ticks += 1;
        assert!(ticks < 100, "streamer never converged");
    }
    assert_eq!(streamer.chunks().len(), streamer.config().chunk_count());
    assert_loaded_exactly(&streamer, &window(&streamer, back));
}

#[test]
fn window_follows_floored_viewer_chunk() {
    let mut streamer = init(config(), Point::new(0.5, 0.5, 0.5));
    let viewer = Point::new(-0.5, 0.5, 0.5);
    // still within half a chunk of the last retarget: no new window yet
    assert!(!streamer.tick(viewer).unwrap().retargeted);

    let viewer = Point::new(-2.5, 0.5, 0.5);
    assert!(streamer.tick(viewer).unwrap().retargeted);
    let (min, max) = streamer.window_bounds().unwrap();
    assert_eq!(min, Point::new(-12., -8., -8.));
    assert_eq!(max, Point::new(8., 12., 12.));
}
