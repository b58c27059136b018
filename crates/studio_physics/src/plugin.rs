//! Bevy front end of the simulation.
//!
//! The plugin plays two roles around the [`SimulationStepper`]: frame driver
//! (one `on_frame` call per `Update`, after the orbit camera has applied its
//! input) and renderer (bevy meshes and transforms mirroring the render list).

use bevy::asset::RenderAssetUsages;
use bevy::mesh::{Indices, PrimitiveTopology};
use bevy::prelude::*;
use studio_core::orbit_camera::orbit_camera_system;
use studio_core::{
    BodyShape, RenderableId, Renderable, RigidBoxConfig, SceneConfig, SimResult, SoftVisual,
};

use crate::rapier_world::RapierWorld;
use crate::rigid_body::RigidBodyDesc;
use crate::soft_body::SoftBodyParams;
use crate::stepper::{FrameOutcome, SimulationStepper};

const BOX_COLOR: Color = Color::srgb(0.0, 0.467, 1.0);
const GROUND_COLOR: Color = Color::srgb(0.5, 0.5, 0.5);
const SOFT_COLOR: Color = Color::srgb(0.9, 0.35, 0.3);

/// Scene the plugin builds at startup.
#[derive(Resource, Debug, Clone)]
pub struct SceneSettings(pub SceneConfig);

/// Links a Bevy entity to its entry in the render list.
#[derive(Component, Debug, Clone, Copy)]
pub struct RenderLink(pub RenderableId);

/// Request to drop a new box into the running scene.
#[derive(Message, Debug, Clone)]
pub struct SpawnBoxMessage(pub RigidBoxConfig);

/// The running simulation.
#[derive(Resource)]
pub struct PhysicsState {
    pub stepper: SimulationStepper<RapierWorld>,
    /// Paused frames do not step and reset the clock, so resuming starts with
    /// a warm-up frame.
    pub paused: bool,
    pub last_outcome: FrameOutcome,
    /// Set when a step failed. The simulation stays stopped afterwards.
    pub fault: Option<String>,
}

impl PhysicsState {
    /// Build the world and every body listed in `scene`.
    pub fn from_scene(scene: &SceneConfig) -> SimResult<Self> {
        let world = RapierWorld::new(&scene.world);
        let mut stepper = SimulationStepper::new(world, scene.world.clone())?;
        stepper.initialize()?;

        for config in &scene.boxes {
            stepper.add_rigid_body(&RigidBodyDesc::from(config))?;
        }
        for config in &scene.soft_bodies {
            stepper.add_soft_body(&config.grid_spec(), &SoftBodyParams::from(config))?;
        }

        Ok(Self {
            stepper,
            paused: false,
            last_outcome: FrameOutcome::default(),
            fault: None,
        })
    }

    pub fn rigid_body_count(&self) -> usize {
        self.stepper.registry().rigid_bodies().len()
    }

    pub fn dynamic_body_count(&self) -> usize {
        self.stepper.registry().needs_sync_count()
    }

    pub fn soft_body_count(&self) -> usize {
        self.stepper.registry().soft_bodies().len()
    }

    pub fn soft_node_count(&self) -> usize {
        self.stepper.registry().soft_node_total()
    }

    pub fn simulated_time(&self) -> f64 {
        self.stepper.simulated_time()
    }
}

pub struct SoftBodyPhysicsPlugin {
    scene: SceneConfig,
}

impl SoftBodyPhysicsPlugin {
    pub fn new(scene: SceneConfig) -> Self {
        Self { scene }
    }
}

impl Default for SoftBodyPhysicsPlugin {
    fn default() -> Self {
        Self::new(SceneConfig::default())
    }
}

impl Plugin for SoftBodyPhysicsPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(SceneSettings(self.scene.clone()))
            .add_message::<SpawnBoxMessage>()
            .add_systems(Startup, setup_simulation)
            .add_systems(
                Update,
                (
                    spawn_requested_boxes,
                    step_physics,
                    (sync_rigid_visuals, sync_soft_meshes),
                )
                    .chain()
                    .after(orbit_camera_system)
                    .run_if(resource_exists::<PhysicsState>),
            );
    }
}

fn setup_simulation(
    mut commands: Commands,
    settings: Res<SceneSettings>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let state = match PhysicsState::from_scene(&settings.0) {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to build scene: {}", e);
            return;
        }
    };

    let ground_size = settings.0.world.ground_size;
    for (id, renderable) in state.stepper.renderables().iter() {
        spawn_renderable(
            &mut commands,
            &mut meshes,
            &mut materials,
            id,
            renderable,
            ground_size,
        );
    }

    commands.spawn((
        DirectionalLight {
            illuminance: 10000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_rotation(Quat::from_euler(EulerRot::XYZ, -0.9, 0.4, 0.0)),
    ));

    info!(
        "Scene ready: {} rigid bodies ({} dynamic), {} soft bodies with {} nodes",
        state.rigid_body_count(),
        state.dynamic_body_count(),
        state.soft_body_count(),
        state.soft_node_count()
    );
    commands.insert_resource(state);
}

fn spawn_renderable(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
    id: RenderableId,
    renderable: &Renderable,
    ground_size: f32,
) {
    match renderable {
        Renderable::Rigid(visual) => {
            let (mesh, color) = match visual.shape {
                BodyShape::Cuboid { half_extents } => {
                    (meshes.add(Cuboid::from_size(half_extents * 2.0)), BOX_COLOR)
                }
                BodyShape::Ball { radius } => (meshes.add(Sphere::new(radius)), BOX_COLOR),
                BodyShape::Plane { normal } => (
                    meshes.add(Plane3d::new(normal, Vec2::splat(ground_size * 0.5))),
                    GROUND_COLOR,
                ),
            };
            let transform = visual.transform();
            commands.spawn((
                Mesh3d(mesh),
                MeshMaterial3d(materials.add(color)),
                Transform::from_translation(transform.translation)
                    .with_rotation(transform.rotation),
                RenderLink(id),
            ));
        }
        Renderable::Soft(visual) => {
            commands.spawn((
                Mesh3d(meshes.add(soft_mesh(visual))),
                MeshMaterial3d(materials.add(StandardMaterial {
                    base_color: SOFT_COLOR,
                    double_sided: true,
                    cull_mode: None,
                    ..default()
                })),
                Transform::IDENTITY,
                RenderLink(id),
            ));
        }
    }
}

fn to_arrays(values: &[Vec3]) -> Vec<[f32; 3]> {
    values.iter().map(|v| v.to_array()).collect()
}

/// World-space triangle mesh of a soft body.
fn soft_mesh(visual: &SoftVisual) -> Mesh {
    Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::MAIN_WORLD | RenderAssetUsages::RENDER_WORLD,
    )
    .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, to_arrays(visual.positions()))
    .with_inserted_attribute(Mesh::ATTRIBUTE_NORMAL, to_arrays(visual.normals()))
    .with_inserted_indices(Indices::U32(visual.indices().flattened()))
}

fn spawn_requested_boxes(
    mut commands: Commands,
    mut requests: MessageReader<SpawnBoxMessage>,
    mut physics: ResMut<PhysicsState>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    for SpawnBoxMessage(config) in requests.read() {
        let record = match physics.stepper.add_rigid_body(&RigidBodyDesc::from(config)) {
            Ok(record) => record,
            Err(e) => {
                warn!("Could not spawn box at {:?}: {}", config.position, e);
                continue;
            }
        };
        if let Some(renderable) = physics.stepper.renderables().get(record.renderable) {
            spawn_renderable(
                &mut commands,
                &mut meshes,
                &mut materials,
                record.renderable,
                renderable,
                0.0,
            );
        }
        info!(
            "Dropped box {} (mass {}) at {:?}",
            record.handle.id(),
            config.mass,
            config.position
        );
    }
}

fn step_physics(time: Res<Time>, mut physics: ResMut<PhysicsState>) {
    if physics.fault.is_some() {
        return;
    }
    if physics.paused {
        physics.stepper.reset_clock();
        return;
    }

    let timestamp_ms = time.elapsed_secs_f64() * 1000.0;
    match physics.stepper.on_frame(timestamp_ms) {
        Ok(outcome) => physics.last_outcome = outcome,
        Err(e) => {
            error!("Simulation stopped: {}", e);
            physics.fault = Some(e.to_string());
            physics.paused = true;
        }
    }
}

fn sync_rigid_visuals(
    mut physics: ResMut<PhysicsState>,
    mut query: Query<(&RenderLink, &mut Transform)>,
) {
    let renderables = physics.stepper.renderables_mut();
    for (link, mut transform) in query.iter_mut() {
        let Some(visual) = renderables.rigid_mut(link.0) else {
            continue;
        };
        if !visual.is_dirty() {
            continue;
        }
        let t = visual.transform();
        transform.translation = t.translation;
        transform.rotation = t.rotation;
        visual.clear_dirty();
    }
}

fn sync_soft_meshes(
    mut physics: ResMut<PhysicsState>,
    mut meshes: ResMut<Assets<Mesh>>,
    query: Query<(&RenderLink, &Mesh3d)>,
) {
    let renderables = physics.stepper.renderables_mut();
    for (link, mesh3d) in query.iter() {
        let Some(visual) = renderables.soft_mut(link.0) else {
            continue;
        };
        if !visual.is_dirty() {
            continue;
        }
        if let Some(mesh) = meshes.get_mut(&mesh3d.0) {
            mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, to_arrays(visual.positions()));
            mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, to_arrays(visual.normals()));
        }
        visual.clear_dirty();
    }
}
