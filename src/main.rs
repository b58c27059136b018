use bevy::prelude::*;
use studio_core::{CorePlugin, OrbitCameraBundle, SceneConfig};
use studio_physics::SoftBodyPhysicsPlugin;
use studio_ui::StudioUiPlugin;

const SCENE_PATH: &str = "assets/scene.json";

fn main() {
    let scene = SceneConfig::load_or_default(SCENE_PATH);

    App::new()
        .add_plugins(DefaultPlugins)
        .add_plugins(CorePlugin)
        .add_plugins(SoftBodyPhysicsPlugin::new(scene))
        .add_plugins(StudioUiPlugin)
        .insert_resource(ClearColor(Color::srgb(0.05, 0.05, 0.08)))
        .add_systems(Startup, setup)
        .run();
}

fn setup(mut commands: Commands) {
    // Orbit camera looking at the drop zone from distance 20
    commands.spawn(OrbitCameraBundle::new(20.0, Vec3::new(0.0, 2.0, 0.0)));

    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: 300.0,
        affects_lightmapped_meshes: false,
    });
}
