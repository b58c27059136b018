//! Collision shape descriptions shared by the physics adapter and the renderer.

use bevy::math::Vec3;

use crate::error::{SimError, SimResult};

/// Shape of a rigid body.
///
/// The physics world turns this into a collider, the renderer into a mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BodyShape {
    /// Axis-aligned box in body space.
    Cuboid { half_extents: Vec3 },
    /// Sphere.
    Ball { radius: f32 },
    /// Infinite half-space; everything below the plane through the body origin is solid.
    Plane { normal: Vec3 },
}

impl BodyShape {
    /// Box shape from its full size (the way scene files describe boxes).
    pub fn cuboid(size: Vec3) -> Self {
        BodyShape::Cuboid {
            half_extents: size * 0.5,
        }
    }

    pub fn ball(radius: f32) -> Self {
        BodyShape::Ball { radius }
    }

    pub fn plane(normal: Vec3) -> Self {
        BodyShape::Plane { normal }
    }

    /// Reject degenerate shapes before anything gets registered.
    pub fn validate(&self) -> SimResult<()> {
        match *self {
            BodyShape::Cuboid { half_extents } => {
                if !half_extents.is_finite() || half_extents.min_element() <= 0.0 {
                    return Err(SimError::InvalidParameter(format!(
                        "cuboid half extents must be positive, got {:?}",
                        half_extents
                    )));
                }
            }
            BodyShape::Ball { radius } => {
                if !radius.is_finite() || radius <= 0.0 {
                    return Err(SimError::InvalidParameter(format!(
                        "ball radius must be positive, got {}",
                        radius
                    )));
                }
            }
            BodyShape::Plane { normal } => {
                if !normal.is_finite() || normal.length_squared() < 1e-12 {
                    return Err(SimError::InvalidParameter(format!(
                        "plane normal must be non-zero, got {:?}",
                        normal
                    )));
                }
            }
        }
        Ok(())
    }
}
