//! Soft body factory.
//!
//! Turns a [`GridSpec`] into a tetrahedral soft body. Node `i` in the physics
//! world is vertex `i` of the generated mesh, which is what lets the stepper
//! copy node state straight into the render buffers.

use bevy::prelude::*;
use studio_core::{
    generate_tetra_mesh, GridSpec, RenderList, RenderableId, SimError, SimResult, SoftBodyConfig,
    TetraMesh,
};

use crate::registry::BodyRegistry;
use crate::world::{CollisionFlags, PhysicsWorld, SoftHandle, SoftMaterial, SolverIterations};

/// Material and solver settings of a soft body. Fixed once the body is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftBodyParams {
    /// Spread evenly over the nodes.
    pub total_mass: f32,
    pub pressure: f32,
    pub material: SoftMaterial,
    pub friction: f32,
    pub damping: f32,
    pub collision_margin: f32,
    pub iterations: SolverIterations,
}

impl Default for SoftBodyParams {
    fn default() -> Self {
        Self::from(&SoftBodyConfig::default())
    }
}

impl From<&SoftBodyConfig> for SoftBodyParams {
    fn from(config: &SoftBodyConfig) -> Self {
        Self {
            total_mass: config.total_mass,
            pressure: config.pressure,
            material: SoftMaterial {
                linear: config.linear_stiffness,
                angular: config.angular_stiffness,
                volume: config.volume_stiffness,
            },
            friction: config.friction,
            damping: config.damping,
            collision_margin: config.collision_margin,
            iterations: SolverIterations {
                position: config.position_iterations,
                drift: config.drift_iterations,
            },
        }
    }
}

impl SoftBodyParams {
    pub fn validate(&self) -> SimResult<()> {
        let invalid = |what: &str, value: f32| -> SimResult<()> {
            Err(SimError::InvalidParameter(format!(
                "soft body {} out of range: {}",
                what, value
            )))
        };

        if !self.total_mass.is_finite() || self.total_mass <= 0.0 {
            return invalid("total mass", self.total_mass);
        }
        if !self.pressure.is_finite() {
            return invalid("pressure", self.pressure);
        }
        for (what, k) in [
            ("linear stiffness", self.material.linear),
            ("angular stiffness", self.material.angular),
            ("volume stiffness", self.material.volume),
            ("damping", self.damping),
        ] {
            if !(0.0..=1.0).contains(&k) {
                return invalid(what, k);
            }
        }
        if !self.friction.is_finite() || self.friction < 0.0 {
            return invalid("friction", self.friction);
        }
        if !self.collision_margin.is_finite() || self.collision_margin < 0.0 {
            return invalid("collision margin", self.collision_margin);
        }
        if self.iterations.position == 0 {
            return Err(SimError::InvalidParameter(
                "soft body needs at least one position iteration".to_string(),
            ));
        }
        Ok(())
    }
}

/// A built soft body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftBodyRecord {
    pub handle: SoftHandle,
    pub renderable: RenderableId,
    pub node_count: usize,
    pub node_mass: f32,
    pub params: SoftBodyParams,
}

/// Build a soft body from a box grid and register it with `registry` and
/// `renderables`.
///
/// The mesh and the parameters are checked before the world is touched, so a
/// rejected grid or parameter set leaves no trace anywhere. If the world
/// rejects the body halfway through, it is discarded before the error is
/// returned and nothing is registered.
///
/// # Errors
/// `InvalidTopology` for a grid with fewer than 2 points on some axis,
/// `InvalidParameter` for bad extents or parameters.
pub fn build_soft_body<W: PhysicsWorld>(
    world: &mut W,
    registry: &mut BodyRegistry,
    renderables: &mut RenderList,
    spec: &GridSpec,
    params: &SoftBodyParams,
) -> SimResult<SoftBodyRecord> {
    let mesh = generate_tetra_mesh(spec)?;
    params.validate()?;

    let node_count = mesh.vertices.len();
    let node_mass = params.total_mass / node_count as f32;

    let handle = world.create_soft_body()?;
    if let Err(e) = populate_soft_body(world, handle, &mesh, node_mass, params) {
        warn!("Soft body {} rejected by the world: {}", handle.index(), e);
        if let Err(discard) = world.discard_soft_body(handle) {
            error!("Could not discard soft body {}: {}", handle.index(), discard);
        }
        return Err(e);
    }

    let renderable = renderables.push_soft(mesh.vertices, mesh.indices);
    let record = SoftBodyRecord {
        handle,
        renderable,
        node_count,
        node_mass,
        params: *params,
    };
    registry.insert_soft(record);

    debug!(
        "Built soft body {}: {} nodes of {} kg, {} faces, {} tetrahedra",
        handle.index(),
        node_count,
        node_mass,
        spec.surface_triangle_count(),
        spec.tetrahedron_count()
    );
    Ok(record)
}

/// Nodes, faces, tetrahedra and links, then solver settings, then activation.
fn populate_soft_body<W: PhysicsWorld>(
    world: &mut W,
    handle: SoftHandle,
    mesh: &TetraMesh,
    node_mass: f32,
    params: &SoftBodyParams,
) -> SimResult<()> {
    for &position in &mesh.vertices.positions {
        world.append_node(handle, position, node_mass)?;
    }
    for &triangle in &mesh.indices.triangles {
        world.append_face(handle, triangle)?;
    }
    // Six links per tetrahedron, in tetrahedron order.
    for (tetra, links) in mesh
        .tetras
        .tetrahedra
        .iter()
        .zip(mesh.tetras.links.chunks_exact(6))
    {
        world.append_tetrahedron(handle, *tetra)?;
        for &link in links {
            world.append_link(handle, link)?;
        }
    }

    world.set_solver_iterations(handle, params.iterations)?;
    world.set_collision_flags(handle, CollisionFlags::ALL)?;
    world.set_friction(handle, params.friction)?;
    world.set_damping(handle, params.damping)?;
    world.set_pressure(handle, params.pressure)?;
    world.set_material(handle, params.material)?;
    world.set_collision_margin(handle, params.collision_margin)?;
    world.set_soft_deactivation(handle, false)?;
    world.add_soft_body(handle)
}
