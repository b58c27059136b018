//! Physics side of Soft Body Studio.
//!
//! - [`PhysicsWorld`]: what the simulation needs from a physics engine
//! - [`RapierWorld`]: Rapier rigid bodies plus position-based soft bodies
//! - rigid and soft body factories
//! - [`SimulationStepper`]: per-frame step and sync
//! - [`SoftBodyPhysicsPlugin`]: Bevy frame driver and renderer

pub mod plugin;
pub mod rapier_world;
pub mod registry;
pub mod rigid_body;
pub mod soft_body;
mod soft_solver;
pub mod stepper;
#[cfg(test)]
mod testing;
pub mod world;

pub use plugin::{PhysicsState, RenderLink, SceneSettings, SoftBodyPhysicsPlugin, SpawnBoxMessage};
pub use rapier_world::RapierWorld;
pub use registry::BodyRegistry;
pub use rigid_body::{build_rigid_body, RigidBodyDesc, RigidBodyRecord};
pub use soft_body::{build_soft_body, SoftBodyParams, SoftBodyRecord};
pub use stepper::{FrameOutcome, SimulationStepper, StepperState};
pub use world::{
    CollisionFlags, PhysicsWorld, RigidHandle, SoftHandle, SoftMaterial, SolverIterations,
    StepReport,
};
