use bevy::prelude::*;
use bevy_mod_imgui::prelude::*;
use rand::Rng;
use studio_core::RigidBoxConfig;
use studio_physics::{PhysicsState, SpawnBoxMessage};

/// Mass range of boxes dropped from the UI.
const DROP_MASS: std::ops::Range<f32> = 1.0..3.0;

pub struct StudioUiPlugin;

impl Plugin for StudioUiPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(bevy_mod_imgui::ImguiPlugin::default())
            .add_systems(Update, imgui_ui.run_if(resource_exists::<PhysicsState>));
    }
}

/// Random box above the ground, tilted like the scene's own boxes.
fn random_box(rng: &mut impl Rng) -> RigidBoxConfig {
    let size = rng.gen_range(0.5..2.0);
    RigidBoxConfig {
        position: [
            rng.gen_range(-3.0..3.0),
            rng.gen_range(10.0..20.0),
            rng.gen_range(-3.0..3.0),
        ],
        size: [size; 3],
        mass: rng.gen_range(DROP_MASS),
        ..Default::default()
    }
}

fn imgui_ui(
    mut context: NonSendMut<ImguiContext>,
    mut physics: ResMut<PhysicsState>,
    mut spawn_boxes: MessageWriter<SpawnBoxMessage>,
) {
    let ui = context.ui();

    // Enable docking
    ui.dockspace_over_main_viewport();

    ui.window("Scene")
        .size([320.0, 220.0], Condition::FirstUseEver)
        .build(|| {
            ui.text(format!(
                "Rigid bodies: {} ({} dynamic)",
                physics.rigid_body_count(),
                physics.dynamic_body_count()
            ));
            ui.text(format!(
                "Soft bodies: {} ({} nodes)",
                physics.soft_body_count(),
                physics.soft_node_count()
            ));
            ui.separator();

            let outcome = physics.last_outcome;
            ui.text(format!(
                "Last frame: {} sub-steps, {:.4}s simulated",
                outcome.report.sub_steps, outcome.report.simulated
            ));
            ui.text(format!("Simulated time: {:.2}s", physics.simulated_time()));

            let lost = physics.stepper.out_of_bounds_bodies().len();
            if lost > 0 {
                ui.text_colored([1.0, 0.6, 0.2, 1.0], format!("Out of bounds: {}", lost));
            }
            if let Some(fault) = &physics.fault {
                ui.text_colored([1.0, 0.3, 0.3, 1.0], format!("Stopped: {}", fault));
            }
            ui.separator();

            if ui.button("Drop Box") {
                spawn_boxes.write(SpawnBoxMessage(random_box(&mut rand::thread_rng())));
            }

            ui.same_line();

            let mut paused = physics.paused;
            if ui.checkbox("Pause", &mut paused) {
                physics.paused = paused;
            }
        });
}
