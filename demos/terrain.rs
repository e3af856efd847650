use bevy::prelude::*;
use bevy_infinite_grid::{InfiniteGridBundle, InfiniteGridPlugin, InfiniteGridSettings};
use bevy_marching_terrain::{
    TerrainPlugin,
    config::TerrainConfig,
    plugin::{Terrain, TerrainEdits, TerrainMaterial, TerrainSet, TerrainViewer},
};
use bevy_panorbit_camera::{PanOrbitCamera, PanOrbitCameraPlugin};

fn main() {
    App::new()
        .add_plugins((
            DefaultPlugins,
            TerrainPlugin {
                config: TerrainConfig::default()
                    .with_view_distance(4)
                    .with_noise_scale(0.6),
            },
            PanOrbitCameraPlugin,
            InfiniteGridPlugin,
            #[cfg(not(target_arch = "wasm32"))]
            bevy::pbr::wireframe::WireframePlugin::default(),
        ))
        .add_systems(Startup, setup)
        .add_systems(
            Update,
            (
                follow_focus.before(TerrainSet::Stream),
                edit_at_focus.before(TerrainSet::Edit),
                debug,
            ),
        )
        .run();
}

fn setup(mut commands: Commands, mut materials: ResMut<Assets<StandardMaterial>>) {
    commands.spawn(InfiniteGridBundle {
        settings: InfiniteGridSettings {
            fadeout_distance: 1000.0,
            ..Default::default()
        },
        ..Default::default()
    });

    commands.insert_resource(TerrainMaterial(materials.add(StandardMaterial {
        base_color: Color::srgb(0.55, 0.45, 0.35),
        perceptual_roughness: 0.9,
        ..Default::default()
    })));

    commands.spawn((
        Camera3d::default(),
        PanOrbitCamera {
            button_orbit: MouseButton::Right,
            button_pan: MouseButton::Middle,
            ..default()
        },
        Transform::from_xyz(40., 40., 40.).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    // the terrain streams around the orbit focus, not the camera
    commands.spawn((TerrainViewer, Transform::default()));

    commands.spawn((
        DirectionalLight {
            illuminance: light_consts::lux::FULL_DAYLIGHT,
            ..Default::default()
        },
        Transform::default().with_rotation(Quat::from_rotation_x(-45.0_f32.to_radians())),
    ));
}

fn follow_focus(
    pan_orbit: Query<&PanOrbitCamera>,
    mut viewer: Query<&mut Transform, With<TerrainViewer>>,
) {
    let (Ok(camera), Ok(mut transform)) = (pan_orbit.single(), viewer.single_mut()) else {
        return;
    };
    transform.translation = camera.target_focus;
}

/// Left mouse digs at the orbit focus, `F` fills.
fn edit_at_focus(
    time: Res<Time>,
    config: Res<TerrainConfig>,
    mouse: Res<ButtonInput<MouseButton>>,
    keys: Res<ButtonInput<KeyCode>>,
    pan_orbit: Query<&PanOrbitCamera>,
    mut edits: ResMut<TerrainEdits>,
) {
    let dig = mouse.pressed(MouseButton::Left);
    let fill = keys.pressed(KeyCode::KeyF);
    if dig == fill {
        return;
    }
    let Ok(camera) = pan_orbit.single() else {
        return;
    };
    edits.push(camera.target_focus, config.edit_delta(time.delta_secs(), dig));
}

fn debug(mut gizmos: Gizmos, terrain: Res<Terrain>) {
    let Some((min, max)) = terrain.window_bounds() else {
        return;
    };
    let min = Vec3::new(min.x, min.y, min.z);
    let max = Vec3::new(max.x, max.y, max.z);
    gizmos.cube(
        Transform::from_translation((min + max) / 2.).with_scale(max - min),
        Color::WHITE,
    );
}
