use bevy::{
    asset::RenderAssetUsages,
    mesh::{Indices, PrimitiveTopology},
    prelude::*,
};

use crate::{
    bridge::CpuBackend,
    config::TerrainConfig,
    error::Result,
    field::SimplexNoise,
    mesh::ChunkMesh,
    streamer::{ChunkStreamer, OccupancySignal},
    types::{ChunkCoord, Point, Value},
};

/// System sets for the terrain pipeline.
///
/// Use these to order your own systems relative to streaming:
///
/// ```rust,ignore
/// // Queue edits before they are applied this frame:
/// app.add_systems(Update, dig.before(TerrainSet::Edit));
/// ```
///
/// ```text
/// TerrainSet::Stream  →  TerrainSet::Edit  →  [your systems]  →  TerrainSet::Upload
/// ```
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum TerrainSet {
    /// Initialises the terrain on the first frame with a viewer, then recycles chunks.
    Stream,
    /// Applies queued [`TerrainEdits`].
    Edit,
    /// Uploads changed chunk meshes into [`Mesh3d`]s.
    Upload,
}

/// Marks the entity the terrain streams around, usually the camera.
#[derive(Component, Default)]
pub struct TerrainViewer;

/// A chunk entity. Its [`Transform`] sits at the chunk origin and its [`Mesh3d`] is chunk-local.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerrainChunk {
    /// Pool slot; the entity keeps it for as long as the terrain is loaded.
    pub slot: usize,
    pub coord: ChunkCoord,
}

/// The streamer driving the terrain.
#[derive(Resource, Deref, DerefMut)]
pub struct Terrain(pub ChunkStreamer<CpuBackend<SimplexNoise>>);

impl Terrain {
    pub fn new(config: TerrainConfig) -> Result<Self> {
        Ok(Self(ChunkStreamer::from_config(config)?))
    }
}

/// A brush stroke in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EditRequest {
    pub center: Vec3,
    /// Positive fills, negative digs.
    pub delta: Value,
    /// Falls back to [`TerrainConfig::edit_radius`].
    pub radius: Option<Value>,
}

/// Edits applied during [`TerrainSet::Edit`], then cleared.
///
/// ```rust,ignore
/// fn dig(time: Res<Time>, config: Res<TerrainConfig>, mut edits: ResMut<TerrainEdits>) {
///     edits.push(target, config.edit_delta(time.delta_secs(), true));
/// }
/// ```
#[derive(Resource, Default, Debug)]
pub struct TerrainEdits(pub Vec<EditRequest>);

impl TerrainEdits {
    pub fn push(&mut self, center: Vec3, delta: Value) {
        self.0.push(EditRequest {
            center,
            delta,
            radius: None,
        });
    }

    pub fn push_with_radius(&mut self, center: Vec3, delta: Value, radius: Value) {
        self.0.push(EditRequest {
            center,
            delta,
            radius: Some(radius),
        });
    }
}

/// Occupancy signals collected from chunk regenerations.
///
/// Only filled when [`TerrainConfig::spawn_threshold`] is set. Never cleared by the plugin:
/// consumers drain it.
#[derive(Resource, Default, Debug)]
pub struct OccupancySignals(pub Vec<OccupancySignal>);

/// Material given to every chunk entity. Insert it to make chunks visible with your own shading.
#[derive(Resource, Clone)]
pub struct TerrainMaterial(pub Handle<StandardMaterial>);

/// Entity and last uploaded `(generation, revision)` per pool slot.
#[derive(Resource, Default)]
struct ChunkEntities(Vec<(Entity, Option<(u64, u64)>)>);

/// Bevy plugin that streams marching cubes terrain around the [`TerrainViewer`].
///
/// When the `auto_stream` feature is enabled, the terrain is generated on the first frame a
/// [`TerrainViewer`] exists and kept current from then on:
///
/// ```text
/// TerrainViewer moves
///   → chunks recycled               (TerrainSet::Stream, bounded per frame)
///   → TerrainEdits applied          (TerrainSet::Edit)
///   → [your systems here]
///   → Mesh3d replaced on changed chunks  (TerrainSet::Upload)
/// ```
///
/// Changing the [`TerrainConfig`] resource regenerates the terrain from scratch.
#[derive(Default)]
pub struct TerrainPlugin {
    pub config: TerrainConfig,
}

impl Plugin for TerrainPlugin {
    fn build(&self, app: &mut App) {
        let terrain = match Terrain::new(self.config.clone()) {
            Ok(terrain) => terrain,
            Err(err) => {
                error!("terrain disabled: {err}");
                return;
            }
        };

        app.insert_resource(self.config.clone())
            .insert_resource(terrain)
            .init_resource::<TerrainEdits>()
            .init_resource::<OccupancySignals>()
            .init_resource::<ChunkEntities>();

        #[cfg(feature = "auto_stream")]
        app.configure_sets(
            Update,
            (TerrainSet::Stream, TerrainSet::Edit, TerrainSet::Upload).chain(),
        )
        .add_systems(
            Update,
            (
                (reload_on_config_change, stream_chunks)
                    .chain()
                    .in_set(TerrainSet::Stream),
                apply_edits.in_set(TerrainSet::Edit),
                upload_chunks.in_set(TerrainSet::Upload),
            ),
        );
    }
}

fn to_point(v: Vec3) -> Point {
    Point::new(v.x, v.y, v.z)
}

fn to_vec3(p: Point) -> Vec3 {
    Vec3::new(p.x, p.y, p.z)
}

/// Rebuilds the streamer when [`TerrainConfig`] is modified after startup.
fn reload_on_config_change(
    config: Res<TerrainConfig>,
    mut terrain: ResMut<Terrain>,
    mut entities: ResMut<ChunkEntities>,
    viewer: Query<&GlobalTransform, With<TerrainViewer>>,
) {
    if !config.is_changed() || config.is_added() {
        return;
    }
    let next = match Terrain::new(config.clone()) {
        Ok(next) => next,
        Err(err) => {
            warn!("ignoring terrain config change: {err}");
            return;
        }
    };
    terrain.teardown();
    *terrain = next;
    // the new streamer restarts generation and revision counts
    for (_, uploaded) in &mut entities.0 {
        *uploaded = None;
    }
    if let Ok(transform) = viewer.single()
        && let Err(err) = terrain.init(to_point(transform.translation()))
    {
        error!("terrain reload failed: {err}");
    }
}

/// Initialises the terrain around the viewer, then recycles chunks every frame.
fn stream_chunks(
    mut terrain: ResMut<Terrain>,
    mut signals: ResMut<OccupancySignals>,
    viewer: Query<&GlobalTransform, With<TerrainViewer>>,
) {
    let Ok(transform) = viewer.single() else {
        return;
    };
    let position = to_point(transform.translation());

    if !terrain.is_initialized() {
        if let Err(err) = terrain.init(position) {
            error!("terrain init failed: {err}");
        }
    } else {
        match terrain.tick(position) {
            Ok(report) if report.recycled > 0 => {
                debug!("recycled {} chunks, {} pending", report.recycled, report.pending);
            }
            Ok(_) => {}
            Err(err) => error!("terrain tick failed: {err}"),
        }
    }

    signals.0.extend(terrain.drain_occupancy());
}

/// Applies and clears every queued [`EditRequest`].
fn apply_edits(mut terrain: ResMut<Terrain>, mut edits: ResMut<TerrainEdits>) {
    if edits.0.is_empty() {
        return;
    }
    for edit in edits.0.drain(..) {
        let center = to_point(edit.center);
        let result = match edit.radius {
            Some(radius) => terrain.edit(center, edit.delta, radius),
            None => terrain.edit_with_default_radius(center, edit.delta),
        };
        if let Err(err) = result {
            error!("terrain edit failed: {err}");
        }
    }
}

fn build_mesh(chunk_mesh: &ChunkMesh) -> Mesh {
    let mut mesh = Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::RENDER_WORLD,
    );
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, chunk_mesh.positions.clone());
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, chunk_mesh.normals.clone());
    mesh.insert_indices(Indices::U32(chunk_mesh.indices()));
    mesh
}

/// Spawns one entity per pool slot and replaces the [`Mesh3d`] of every chunk whose mesh
/// changed since the last upload.
///
/// Entities of slots that no longer exist (after a teardown) are despawned.
fn upload_chunks(
    mut commands: Commands,
    terrain: Res<Terrain>,
    material: Option<Res<TerrainMaterial>>,
    mut entities: ResMut<ChunkEntities>,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    let chunk_size = terrain.config().chunk_size;
    let generation = terrain.generation();

    for chunk in terrain.chunks() {
        let slot = chunk.slot();
        while entities.0.len() <= slot {
            let entity = commands.spawn((Transform::default(), Visibility::default())).id();
            entities.0.push((entity, None));
        }

        let (entity, uploaded) = &mut entities.0[slot];
        let version = Some((generation, chunk.revision()));
        if *uploaded == version {
            continue;
        }

        let mut entity_commands = commands.entity(*entity);
        entity_commands.insert((
            TerrainChunk {
                slot,
                coord: chunk.coord(),
            },
            Transform::from_translation(to_vec3(chunk.origin(chunk_size))),
            Mesh3d(meshes.add(build_mesh(chunk.mesh()))),
        ));
        if let Some(material) = &material {
            entity_commands.insert(MeshMaterial3d(material.0.clone()));
        }
        *uploaded = version;
    }

    let live = terrain.chunks().len();
    if entities.0.len() > live {
        for (entity, _) in entities.0.drain(live..) {
            commands.entity(entity).despawn();
        }
    }
}
