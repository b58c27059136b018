//! The seam between the simulation core and a physics engine.
//!
//! The core never owns physics objects. It asks the world to create them and
//! keeps the returned handles, which are plain indices into the world's own
//! registry. Everything the core needs from a solver goes through
//! [`PhysicsWorld`].

use bevy::math::{Quat, Vec3};
use studio_core::{BodyShape, SimResult};

/// Handle to a rigid body owned by a [`PhysicsWorld`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RigidHandle(pub(crate) u32);

impl RigidHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn id(self) -> u32 {
        self.0
    }
}

/// Handle to a soft body owned by a [`PhysicsWorld`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoftHandle(pub(crate) u32);

impl SoftHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a call to [`PhysicsWorld::step`] actually integrated.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepReport {
    /// Fixed sub-steps run.
    pub sub_steps: u32,
    /// Simulated seconds (`sub_steps * fixed_step`).
    pub simulated: f32,
}

/// Stiffness coefficients of a soft body material, each in `0..=1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftMaterial {
    /// Link (edge length) stiffness.
    pub linear: f32,
    /// Bending stiffness.
    pub angular: f32,
    /// Tetrahedron volume stiffness.
    pub volume: f32,
}

impl SoftMaterial {
    pub fn uniform(stiffness: f32) -> Self {
        Self {
            linear: stiffness,
            angular: stiffness,
            volume: stiffness,
        }
    }
}

impl Default for SoftMaterial {
    fn default() -> Self {
        Self::uniform(0.9)
    }
}

/// Solver passes per sub-step for a soft body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverIterations {
    /// Constraint + collision passes.
    pub position: u32,
    /// Extra link-only passes after collision.
    pub drift: u32,
}

impl Default for SolverIterations {
    fn default() -> Self {
        Self {
            position: 10,
            drift: 2,
        }
    }
}

/// Which contacts a soft body takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionFlags {
    pub soft_soft: bool,
    pub soft_rigid: bool,
}

impl CollisionFlags {
    pub const ALL: Self = Self {
        soft_soft: true,
        soft_rigid: true,
    };
    pub const NONE: Self = Self {
        soft_soft: false,
        soft_rigid: false,
    };
}

impl Default for CollisionFlags {
    fn default() -> Self {
        Self::ALL
    }
}

/// Operations the simulation core needs from a physics engine.
///
/// Implementations own every body. Handles are only valid for the world that
/// issued them.
pub trait PhysicsWorld {
    /// Immovable body (infinite mass).
    fn create_static_body(
        &mut self,
        shape: &BodyShape,
        position: Vec3,
        rotation: Quat,
    ) -> SimResult<RigidHandle>;

    /// Body with finite positive `mass`.
    fn create_dynamic_body(
        &mut self,
        mass: f32,
        shape: &BodyShape,
        position: Vec3,
        rotation: Quat,
    ) -> SimResult<RigidHandle>;

    /// Allow or forbid the body from going to sleep when idle.
    fn set_rigid_deactivation(&mut self, body: RigidHandle, enabled: bool) -> SimResult<()>;

    /// Current world transform, or `None` if the world has no motion state for it.
    fn read_transform(&self, body: RigidHandle) -> Option<(Vec3, Quat)>;

    /// Advance the world by `dt` seconds in fixed sub-steps of `fixed_sub_step`,
    /// running at most `max_sub_steps` of them.
    fn step(&mut self, dt: f32, fixed_sub_step: f32, max_sub_steps: u32) -> SimResult<StepReport>;

    /// Empty soft body, not yet simulated.
    fn create_soft_body(&mut self) -> SimResult<SoftHandle>;

    /// Append a node; returns its index (nodes are numbered in append order).
    fn append_node(&mut self, body: SoftHandle, position: Vec3, mass: f32) -> SimResult<u32>;

    fn append_face(&mut self, body: SoftHandle, nodes: [u32; 3]) -> SimResult<()>;

    fn append_tetrahedron(&mut self, body: SoftHandle, nodes: [u32; 4]) -> SimResult<()>;

    fn append_link(&mut self, body: SoftHandle, nodes: [u32; 2]) -> SimResult<()>;

    fn set_solver_iterations(
        &mut self,
        body: SoftHandle,
        iterations: SolverIterations,
    ) -> SimResult<()>;

    fn set_collision_flags(&mut self, body: SoftHandle, flags: CollisionFlags) -> SimResult<()>;

    fn set_friction(&mut self, body: SoftHandle, friction: f32) -> SimResult<()>;

    fn set_damping(&mut self, body: SoftHandle, damping: f32) -> SimResult<()>;

    fn set_pressure(&mut self, body: SoftHandle, pressure: f32) -> SimResult<()>;

    fn set_material(&mut self, body: SoftHandle, material: SoftMaterial) -> SimResult<()>;

    fn set_collision_margin(&mut self, body: SoftHandle, margin: f32) -> SimResult<()>;

    fn set_soft_deactivation(&mut self, body: SoftHandle, enabled: bool) -> SimResult<()>;

    /// Start simulating a fully built soft body.
    fn add_soft_body(&mut self, body: SoftHandle) -> SimResult<()>;

    /// Drop everything appended to a soft body and never simulate it. The
    /// handle stays reserved so other handles keep their meaning.
    fn discard_soft_body(&mut self, body: SoftHandle) -> SimResult<()>;

    /// Position and normal of one node.
    fn read_soft_node_state(&self, body: SoftHandle, node: u32) -> Option<(Vec3, Vec3)>;

    fn soft_node_count(&self, body: SoftHandle) -> usize;
}
