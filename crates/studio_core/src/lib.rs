//! Core types and data preparation for Soft Body Studio.
//!
//! This crate provides:
//! - Tetrahedral box mesh generation for soft bodies
//! - Frame clock for fixed-step physics
//! - Render list shared between simulation and renderer
//! - Scene configuration
//! - Orbit camera controller
//!
//! Nothing here depends on a physics engine.

use bevy::prelude::*;

pub mod config;
pub mod error;
pub mod frame_clock;
pub mod orbit_camera;
pub mod renderable;
pub mod shape;
pub mod tetra_mesh;

pub use config::{
    RigidBoxConfig, SceneConfig, SoftBodyConfig, WorldConfig, CEILING_BOUNDARY, FLOOR_BOUNDARY,
};
pub use error::{SimError, SimResult};
pub use frame_clock::FrameClock;
pub use orbit_camera::{OrbitCamera, OrbitCameraBundle, OrbitCameraPlugin};
pub use renderable::{
    RenderList, Renderable, RenderableId, RigidVisual, SoftVisual, VisualTransform,
};
pub use shape::BodyShape;
pub use tetra_mesh::{
    generate_tetra_mesh, tetrahedron_volume, GridSpec, IndexBuffer, TetraMesh, TetraSet,
    VertexBuffer,
};

/// Core plugin for shared functionality.
pub struct CorePlugin;

impl Plugin for CorePlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(OrbitCameraPlugin);
    }
}
