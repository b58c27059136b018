//! Rigid body factory.
//!
//! A mass of zero builds a static body: it is drawn once and never synced. A
//! positive mass builds a dynamic body that never goes to sleep, so its
//! visual keeps following the world until it is torn down.

use bevy::prelude::*;
use studio_core::{
    BodyShape, RenderList, RenderableId, RigidBoxConfig, SimError, SimResult, VisualTransform,
};

use crate::registry::BodyRegistry;
use crate::world::{PhysicsWorld, RigidHandle};

/// What to build.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidBodyDesc {
    pub shape: BodyShape,
    /// 0 for a static body.
    pub mass: f32,
    pub position: Vec3,
    pub rotation: Quat,
}

impl RigidBodyDesc {
    pub fn new(shape: BodyShape, mass: f32, position: Vec3, rotation: Quat) -> Self {
        Self {
            shape,
            mass,
            position,
            rotation,
        }
    }

    pub fn is_static(&self) -> bool {
        self.mass == 0.0
    }
}

impl From<&RigidBoxConfig> for RigidBodyDesc {
    fn from(config: &RigidBoxConfig) -> Self {
        Self::new(
            BodyShape::cuboid(config.size()),
            config.mass,
            config.position(),
            config.rotation(),
        )
    }
}

/// A built rigid body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidBodyRecord {
    pub handle: RigidHandle,
    pub renderable: RenderableId,
    pub mass: f32,
    pub shape: BodyShape,
}

impl RigidBodyRecord {
    pub fn is_static(&self) -> bool {
        self.mass == 0.0
    }
}

fn validate(desc: &RigidBodyDesc) -> SimResult<Quat> {
    if !desc.mass.is_finite() || desc.mass < 0.0 {
        return Err(SimError::InvalidParameter(format!(
            "rigid body mass must be zero or positive, got {}",
            desc.mass
        )));
    }
    desc.shape.validate()?;
    if !desc.position.is_finite() {
        return Err(SimError::InvalidParameter(format!(
            "rigid body position must be finite, got {}",
            desc.position
        )));
    }
    if !desc.rotation.is_finite() || desc.rotation.length_squared() < 1e-12 {
        return Err(SimError::InvalidParameter(format!(
            "rigid body rotation must be a non-zero quaternion, got {}",
            desc.rotation
        )));
    }
    Ok(desc.rotation.normalize())
}

/// Build a rigid body in `world` and register it with `registry` and
/// `renderables`.
///
/// # Errors
/// `InvalidParameter` for a negative or non-finite mass, a degenerate shape
/// or a non-finite transform. Nothing is registered when an error is returned.
pub fn build_rigid_body<W: PhysicsWorld>(
    world: &mut W,
    registry: &mut BodyRegistry,
    renderables: &mut RenderList,
    desc: &RigidBodyDesc,
) -> SimResult<RigidBodyRecord> {
    let rotation = validate(desc)?;
    let visual = VisualTransform::new(desc.position, rotation);

    let handle = if desc.is_static() {
        world.create_static_body(&desc.shape, desc.position, rotation)?
    } else {
        let handle = world.create_dynamic_body(desc.mass, &desc.shape, desc.position, rotation)?;
        world.set_rigid_deactivation(handle, false)?;
        handle
    };

    let record = RigidBodyRecord {
        handle,
        renderable: renderables.push_rigid(desc.shape, visual),
        mass: desc.mass,
        shape: desc.shape,
    };
    registry.insert_rigid(record);

    debug!(
        "Built {} rigid body {} (mass {}, {:?}) at {}",
        if record.is_static() { "static" } else { "dynamic" },
        handle.id(),
        desc.mass,
        desc.shape,
        desc.position
    );
    Ok(record)
}
