//! Scene configuration.
//!
//! Supports `.json` scene files (human readable, hand editable). Every field
//! has a default, so a scene file only needs to list what it changes.
//!
//! # Example
//!
//! ```ignore
//! use studio_core::SceneConfig;
//!
//! let scene = SceneConfig::load_or_default("assets/scene.json");
//! scene.save("worlds/my_scene.json")?;
//! ```

use std::fs;
use std::path::Path;

use bevy::log::{info, warn};
use bevy::math::{Quat, UVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::tetra_mesh::GridSpec;

/// Y coordinate of the floor surface.
pub const FLOOR_BOUNDARY: f32 = 0.0;

/// Highest Y coordinate a body is expected to reach.
pub const CEILING_BOUNDARY: f32 = 100.0;

/// Physics world settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Gravity acceleration (default: -9.82 on Y)
    pub gravity: [f32; 3],
    /// Physics steps per simulated second; the fixed sub-step is its inverse.
    pub step_frequency: f32,
    /// Maximum sub-steps integrated per rendered frame.
    pub max_sub_steps: u32,
    /// Rigid solver iterations per sub-step.
    pub solver_iterations: u32,
    /// Create the static ground plane at initialization.
    pub ground_enabled: bool,
    /// Y position of the ground plane.
    pub ground_height: f32,
    /// Side length of the rendered ground quad.
    pub ground_size: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, -9.82, 0.0],
            step_frequency: 60.0,
            max_sub_steps: 3,
            solver_iterations: 10,
            ground_enabled: true,
            ground_height: FLOOR_BOUNDARY - 0.05,
            ground_size: 10.0,
        }
    }
}

impl WorldConfig {
    pub fn gravity(&self) -> Vec3 {
        Vec3::from_array(self.gravity)
    }

    /// Fixed sub-step size in seconds.
    pub fn fixed_step(&self) -> f32 {
        1.0 / self.step_frequency
    }

    pub fn validate(&self) -> SimResult<()> {
        if !self.step_frequency.is_finite() || self.step_frequency <= 0.0 {
            return Err(SimError::InvalidParameter(format!(
                "step frequency must be positive, got {}",
                self.step_frequency
            )));
        }
        if self.max_sub_steps == 0 {
            return Err(SimError::InvalidParameter(
                "max sub-steps must be at least 1".to_string(),
            ));
        }
        if self.solver_iterations == 0 {
            return Err(SimError::InvalidParameter(
                "solver iterations must be at least 1".to_string(),
            ));
        }
        if !self.gravity().is_finite() {
            return Err(SimError::InvalidParameter(format!(
                "gravity must be finite, got {:?}",
                self.gravity
            )));
        }
        Ok(())
    }
}

/// A box dropped into the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidBoxConfig {
    pub position: [f32; 3],
    /// Full size of the box.
    pub size: [f32; 3],
    /// 0 makes the box static.
    pub mass: f32,
    /// Initial rotation about +X in degrees.
    pub tilt_degrees: f32,
}

impl Default for RigidBoxConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 20.0, 0.0],
            size: [1.0, 1.0, 1.0],
            mass: 1.0,
            tilt_degrees: 30.0,
        }
    }
}

impl RigidBoxConfig {
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn size(&self) -> Vec3 {
        Vec3::from_array(self.size)
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_axis_angle(Vec3::X, self.tilt_degrees.to_radians())
    }
}

/// A deformable box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftBodyConfig {
    /// Full size of the box.
    pub extents: [f32; 3],
    /// Grid points per axis.
    pub resolution: [u32; 3],
    /// Center of the box in world space.
    pub offset: [f32; 3],
    /// Mass spread evenly over all nodes.
    pub total_mass: f32,
    pub pressure: f32,
    pub linear_stiffness: f32,
    pub angular_stiffness: f32,
    pub volume_stiffness: f32,
    pub friction: f32,
    pub damping: f32,
    pub collision_margin: f32,
    pub position_iterations: u32,
    pub drift_iterations: u32,
}

impl Default for SoftBodyConfig {
    fn default() -> Self {
        Self {
            extents: [2.0, 1.0, 3.0],
            resolution: [10, 5, 15],
            offset: [0.0, 4.0, 0.0],
            total_mass: 15.0,
            pressure: 5.0,
            linear_stiffness: 0.9,
            angular_stiffness: 0.9,
            volume_stiffness: 0.9,
            friction: 0.1,
            damping: 0.01,
            collision_margin: 0.05,
            position_iterations: 10,
            drift_iterations: 2,
        }
    }
}

impl SoftBodyConfig {
    pub fn grid_spec(&self) -> GridSpec {
        GridSpec::new(
            Vec3::from_array(self.extents),
            UVec3::from_array(self.resolution),
        )
        .with_offset(Vec3::from_array(self.offset))
    }
}

/// Everything needed to build a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub world: WorldConfig,
    pub boxes: Vec<RigidBoxConfig>,
    pub soft_bodies: Vec<SoftBodyConfig>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            boxes: vec![
                RigidBoxConfig {
                    position: [0.0, 20.0, 0.0],
                    size: [1.0, 1.0, 1.0],
                    mass: 1.0,
                    ..Default::default()
                },
                RigidBoxConfig {
                    position: [2.0, 20.0, -1.0],
                    size: [2.0, 2.0, 2.0],
                    mass: 3.0,
                    ..Default::default()
                },
                RigidBoxConfig {
                    position: [-3.0, 20.0, 2.0],
                    size: [1.5, 1.5, 1.5],
                    mass: 2.0,
                    ..Default::default()
                },
            ],
            soft_bodies: vec![SoftBodyConfig::default()],
        }
    }
}

impl SceneConfig {
    /// Load a scene from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let contents = fs::read_to_string(path)?;
        let scene: SceneConfig = serde_json::from_str(&contents)?;
        scene.world.validate()?;
        Ok(scene)
    }

    /// Load a scene, falling back to the built-in scene if the file is
    /// missing or unreadable.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No scene file at {}, using built-in scene", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(scene) => {
                info!(
                    "Loaded scene from {} ({} boxes, {} soft bodies)",
                    path.display(),
                    scene.boxes.len(),
                    scene.soft_bodies.len()
                );
                scene
            }
            Err(e) => {
                warn!("Failed to load scene {}: {}. Using built-in scene", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save the scene as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> SimResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
