//! [`PhysicsWorld`] backed by Rapier.
//!
//! Rigid bodies live in Rapier's sets and are stepped by its
//! `PhysicsPipeline`. Soft bodies are stepped by [`crate::soft_solver`] right
//! after the rigid step of every sub-step, colliding against Rapier colliders
//! through the query pipeline. Contact is one-way: soft nodes are pushed out
//! of rigid bodies, rigid bodies do not feel the soft body.
//!
//! Time is consumed Cannon-style: every call adds `dt` to an accumulator,
//! whole fixed sub-steps are run while the accumulator holds one (up to the
//! cap), and anything beyond a partial sub-step is discarded.

use std::num::NonZeroUsize;

use bevy::prelude::*;
use rapier3d::prelude as rapier;
use rapier::nalgebra::{Isometry3, Point3, Quaternion, Translation3, Unit, UnitQuaternion, Vector3};
use studio_core::{BodyShape, SimError, SimResult, WorldConfig};

use crate::soft_solver::{solve_soft_soft, ContactQuery, SoftBody};
use crate::world::{
    CollisionFlags, PhysicsWorld, RigidHandle, SoftHandle, SoftMaterial, SolverIterations,
    StepReport,
};

/// Friction coefficient of every rigid collider.
const RIGID_FRICTION: f32 = 0.3;

/// Rapier rigid bodies plus position-based soft bodies.
pub struct RapierWorld {
    gravity: Vector3<f32>,
    integration_parameters: rapier::IntegrationParameters,
    physics_pipeline: rapier::PhysicsPipeline,
    island_manager: rapier::IslandManager,
    broad_phase: rapier::DefaultBroadPhase,
    narrow_phase: rapier::NarrowPhase,
    rigid_body_set: rapier::RigidBodySet,
    collider_set: rapier::ColliderSet,
    impulse_joint_set: rapier::ImpulseJointSet,
    multibody_joint_set: rapier::MultibodyJointSet,
    ccd_solver: rapier::CCDSolver,
    query_pipeline: rapier::QueryPipeline,
    /// `RigidHandle` index -> Rapier handle.
    rigid_handles: Vec<rapier::RigidBodyHandle>,
    soft_bodies: Vec<SoftBody>,
    accumulator: f32,
    simulated_time: f64,
}

impl RapierWorld {
    pub fn new(config: &WorldConfig) -> Self {
        let g = config.gravity();
        let mut integration_parameters = rapier::IntegrationParameters::default();
        integration_parameters.dt = config.fixed_step();
        integration_parameters.num_solver_iterations =
            NonZeroUsize::new(config.solver_iterations as usize).unwrap_or(NonZeroUsize::MIN);

        Self {
            gravity: Vector3::new(g.x, g.y, g.z),
            integration_parameters,
            physics_pipeline: rapier::PhysicsPipeline::new(),
            island_manager: rapier::IslandManager::new(),
            broad_phase: rapier::DefaultBroadPhase::new(),
            narrow_phase: rapier::NarrowPhase::new(),
            rigid_body_set: rapier::RigidBodySet::new(),
            collider_set: rapier::ColliderSet::new(),
            impulse_joint_set: rapier::ImpulseJointSet::new(),
            multibody_joint_set: rapier::MultibodyJointSet::new(),
            ccd_solver: rapier::CCDSolver::new(),
            query_pipeline: rapier::QueryPipeline::new(),
            rigid_handles: Vec::new(),
            soft_bodies: Vec::new(),
            accumulator: 0.0,
            simulated_time: 0.0,
        }
    }

    /// Unused time carried to the next `step` call (always below one sub-step).
    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    /// Total simulated seconds.
    pub fn simulated_time(&self) -> f64 {
        self.simulated_time
    }

    pub fn rigid_body_count(&self) -> usize {
        self.rigid_handles.len()
    }

    pub fn dynamic_body_count(&self) -> usize {
        self.rigid_body_set
            .iter()
            .filter(|(_, body)| body.is_dynamic())
            .count()
    }

    pub fn soft_body_count(&self) -> usize {
        self.soft_bodies.len()
    }

    /// Current volume of a soft body.
    pub fn soft_body_volume(&self, body: SoftHandle) -> Option<f32> {
        self.soft_bodies.get(body.index()).map(SoftBody::volume)
    }

    /// Mean node position of a soft body.
    pub fn soft_body_center(&self, body: SoftHandle) -> Option<Vec3> {
        self.soft_bodies.get(body.index()).map(SoftBody::center)
    }

    pub fn is_soft_body_sleeping(&self, body: SoftHandle) -> Option<bool> {
        self.soft_bodies.get(body.index()).map(SoftBody::is_sleeping)
    }

    fn rapier_handle(&self, body: RigidHandle) -> SimResult<rapier::RigidBodyHandle> {
        self.rigid_handles
            .get(body.index())
            .copied()
            .ok_or_else(|| SimError::UnknownHandle(format!("rigid body {}", body.id())))
    }

    fn soft_mut(&mut self, body: SoftHandle) -> SimResult<&mut SoftBody> {
        self.soft_bodies
            .get_mut(body.index())
            .ok_or_else(|| SimError::UnknownHandle(format!("soft body {}", body.index())))
    }

    fn insert_rigid(
        &mut self,
        builder: rapier::RigidBodyBuilder,
        shape: &BodyShape,
        mass: Option<f32>,
    ) -> SimResult<RigidHandle> {
        shape.validate()?;
        let mut collider = collider_for(shape).friction(RIGID_FRICTION);
        if let Some(mass) = mass {
            collider = collider.mass(mass);
        }

        let body = self.rigid_body_set.insert(builder);
        self.collider_set
            .insert_with_parent(collider, body, &mut self.rigid_body_set);

        let handle = RigidHandle(self.rigid_handles.len() as u32);
        self.rigid_handles.push(body);
        Ok(handle)
    }

    /// One fixed sub-step: rigid bodies first, then soft bodies against the
    /// updated rigid geometry.
    fn internal_step(&mut self, h: f32) -> SimResult<()> {
        self.integration_parameters.dt = h;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );

        let gravity = Vec3::new(self.gravity.x, self.gravity.y, self.gravity.z);
        let contacts = RapierContacts {
            query: &self.query_pipeline,
            bodies: &self.rigid_body_set,
            colliders: &self.collider_set,
        };
        for body in self.soft_bodies.iter_mut().filter(|b| b.is_active()) {
            let query: Option<&dyn ContactQuery> = if body.params.flags.soft_rigid {
                Some(&contacts)
            } else {
                None
            };
            body.step(gravity, h, query)?;
        }

        solve_soft_soft(&mut self.soft_bodies);
        for body in self.soft_bodies.iter_mut().filter(|b| b.is_active()) {
            body.update_normals();
        }

        for (handle, body) in self.rigid_body_set.iter() {
            if !body.translation().iter().all(|v| v.is_finite()) {
                return Err(SimError::WorldStepFailure(format!(
                    "rigid body {:?} diverged",
                    handle
                )));
            }
        }
        Ok(())
    }
}

fn collider_for(shape: &BodyShape) -> rapier::ColliderBuilder {
    match *shape {
        BodyShape::Cuboid { half_extents: he } => rapier::ColliderBuilder::cuboid(he.x, he.y, he.z),
        BodyShape::Ball { radius } => rapier::ColliderBuilder::ball(radius),
        BodyShape::Plane { normal } => rapier::ColliderBuilder::halfspace(Unit::new_normalize(
            Vector3::new(normal.x, normal.y, normal.z),
        )),
    }
}

fn to_isometry(position: Vec3, rotation: Quat) -> Isometry3<f32> {
    let rotation = rotation.normalize();
    Isometry3::from_parts(
        Translation3::new(position.x, position.y, position.z),
        UnitQuaternion::from_quaternion(Quaternion::new(
            rotation.w, rotation.x, rotation.y, rotation.z,
        )),
    )
}

/// Rigid geometry as seen by soft nodes.
struct RapierContacts<'a> {
    query: &'a rapier::QueryPipeline,
    bodies: &'a rapier::RigidBodySet,
    colliders: &'a rapier::ColliderSet,
}

impl ContactQuery for RapierContacts<'_> {
    fn push_out(&self, point: Vec3) -> Option<Vec3> {
        let p = Point3::new(point.x, point.y, point.z);
        let mut closest: Option<(f32, Vec3)> = None;
        self.query.intersections_with_point(
            self.bodies,
            self.colliders,
            &p,
            rapier::QueryFilter::default(),
            |handle| {
                let Some(collider) = self.colliders.get(handle) else {
                    return true;
                };
                let proj = collider.shape().project_point(collider.position(), &p, false);
                if proj.is_inside {
                    let surface = Vec3::new(proj.point.x, proj.point.y, proj.point.z);
                    let distance = surface.distance_squared(point);
                    if closest.map_or(true, |(best, _)| distance < best) {
                        closest = Some((distance, surface));
                    }
                }
                true
            },
        );
        closest.map(|(_, surface)| surface)
    }
}

impl PhysicsWorld for RapierWorld {
    fn create_static_body(
        &mut self,
        shape: &BodyShape,
        position: Vec3,
        rotation: Quat,
    ) -> SimResult<RigidHandle> {
        let builder = rapier::RigidBodyBuilder::fixed().position(to_isometry(position, rotation));
        self.insert_rigid(builder, shape, None)
    }

    fn create_dynamic_body(
        &mut self,
        mass: f32,
        shape: &BodyShape,
        position: Vec3,
        rotation: Quat,
    ) -> SimResult<RigidHandle> {
        if !mass.is_finite() || mass <= 0.0 {
            return Err(SimError::InvalidParameter(format!(
                "dynamic body mass must be positive, got {}",
                mass
            )));
        }
        if matches!(shape, BodyShape::Plane { .. }) {
            return Err(SimError::InvalidParameter(
                "a plane cannot be a dynamic body".to_string(),
            ));
        }
        let builder =
            rapier::RigidBodyBuilder::dynamic().position(to_isometry(position, rotation));
        self.insert_rigid(builder, shape, Some(mass))
    }

    fn set_rigid_deactivation(&mut self, body: RigidHandle, enabled: bool) -> SimResult<()> {
        let handle = self.rapier_handle(body)?;
        let rb = self
            .rigid_body_set
            .get_mut(handle)
            .ok_or_else(|| SimError::UnknownHandle(format!("rigid body {}", body.id())))?;
        *rb.activation_mut() = if enabled {
            rapier::RigidBodyActivation::active()
        } else {
            rapier::RigidBodyActivation::cannot_sleep()
        };
        rb.wake_up(true);
        Ok(())
    }

    fn read_transform(&self, body: RigidHandle) -> Option<(Vec3, Quat)> {
        let handle = self.rigid_handles.get(body.index())?;
        let rb = self.rigid_body_set.get(*handle)?;
        let pos = rb.translation();
        let rot = rb.rotation();
        Some((
            Vec3::new(pos.x, pos.y, pos.z),
            Quat::from_xyzw(rot.i, rot.j, rot.k, rot.w),
        ))
    }

    fn step(&mut self, dt: f32, fixed_sub_step: f32, max_sub_steps: u32) -> SimResult<StepReport> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(SimError::WorldStepFailure(format!(
                "frame delta must be a non-negative number, got {}",
                dt
            )));
        }
        if !fixed_sub_step.is_finite() || fixed_sub_step <= 0.0 {
            return Err(SimError::WorldStepFailure(format!(
                "fixed sub-step must be positive, got {}",
                fixed_sub_step
            )));
        }

        self.accumulator += dt;
        let mut sub_steps = 0;
        while self.accumulator >= fixed_sub_step && sub_steps < max_sub_steps {
            // A failed frame's time is dropped, never integrated again.
            if let Err(e) = self.internal_step(fixed_sub_step) {
                self.accumulator = 0.0;
                return Err(e);
            }
            self.accumulator -= fixed_sub_step;
            sub_steps += 1;
        }
        self.accumulator %= fixed_sub_step;

        let simulated = sub_steps as f32 * fixed_sub_step;
        self.simulated_time += simulated as f64;
        Ok(StepReport {
            sub_steps,
            simulated,
        })
    }

    fn create_soft_body(&mut self) -> SimResult<SoftHandle> {
        let handle = SoftHandle(self.soft_bodies.len() as u32);
        self.soft_bodies.push(SoftBody::new());
        Ok(handle)
    }

    fn append_node(&mut self, body: SoftHandle, position: Vec3, mass: f32) -> SimResult<u32> {
        Ok(self.soft_mut(body)?.append_node(position, mass))
    }

    fn append_face(&mut self, body: SoftHandle, nodes: [u32; 3]) -> SimResult<()> {
        self.soft_mut(body)?.append_face(nodes)
    }

    fn append_tetrahedron(&mut self, body: SoftHandle, nodes: [u32; 4]) -> SimResult<()> {
        self.soft_mut(body)?.append_tetrahedron(nodes)
    }

    fn append_link(&mut self, body: SoftHandle, nodes: [u32; 2]) -> SimResult<()> {
        self.soft_mut(body)?.append_link(nodes)
    }

    fn set_solver_iterations(
        &mut self,
        body: SoftHandle,
        iterations: SolverIterations,
    ) -> SimResult<()> {
        self.soft_mut(body)?.params.iterations = iterations;
        Ok(())
    }

    fn set_collision_flags(&mut self, body: SoftHandle, flags: CollisionFlags) -> SimResult<()> {
        self.soft_mut(body)?.params.flags = flags;
        Ok(())
    }

    fn set_friction(&mut self, body: SoftHandle, friction: f32) -> SimResult<()> {
        self.soft_mut(body)?.params.friction = friction;
        Ok(())
    }

    fn set_damping(&mut self, body: SoftHandle, damping: f32) -> SimResult<()> {
        self.soft_mut(body)?.params.damping = damping;
        Ok(())
    }

    fn set_pressure(&mut self, body: SoftHandle, pressure: f32) -> SimResult<()> {
        self.soft_mut(body)?.params.pressure = pressure;
        Ok(())
    }

    fn set_material(&mut self, body: SoftHandle, material: SoftMaterial) -> SimResult<()> {
        self.soft_mut(body)?.params.material = material;
        Ok(())
    }

    fn set_collision_margin(&mut self, body: SoftHandle, margin: f32) -> SimResult<()> {
        self.soft_mut(body)?.params.margin = margin;
        Ok(())
    }

    fn set_soft_deactivation(&mut self, body: SoftHandle, enabled: bool) -> SimResult<()> {
        self.soft_mut(body)?.params.deactivation = enabled;
        Ok(())
    }

    fn add_soft_body(&mut self, body: SoftHandle) -> SimResult<()> {
        let soft = self.soft_mut(body)?;
        soft.update_normals();
        soft.activate();
        debug!(
            "Soft body {} active: {} nodes, {} faces, {} tetrahedra, {} links",
            body.index(),
            soft.nodes.len(),
            soft.face_count(),
            soft.tetra_count(),
            soft.link_count()
        );
        Ok(())
    }

    fn discard_soft_body(&mut self, body: SoftHandle) -> SimResult<()> {
        *self.soft_mut(body)? = SoftBody::new();
        debug!("Soft body {} discarded", body.index());
        Ok(())
    }

    fn read_soft_node_state(&self, body: SoftHandle, node: u32) -> Option<(Vec3, Vec3)> {
        self.soft_bodies.get(body.index())?.node_state(node)
    }

    fn soft_node_count(&self, body: SoftHandle) -> usize {
        self.soft_bodies
            .get(body.index())
            .map_or(0, |b| b.nodes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> RapierWorld {
        RapierWorld::new(&WorldConfig::default())
    }

    #[test]
    fn test_static_body_does_not_move() {
        let mut w = world();
        let ground = w
            .create_static_body(&BodyShape::plane(Vec3::Y), Vec3::new(0.0, -0.05, 0.0), Quat::IDENTITY)
            .unwrap();
        for _ in 0..30 {
            w.step(1.0 / 60.0, 1.0 / 60.0, 3).unwrap();
        }
        let (pos, _) = w.read_transform(ground).unwrap();
        assert!((pos.y + 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_dynamic_box_falls() {
        let mut w = world();
        let cube = w
            .create_dynamic_body(1.0, &BodyShape::cuboid(Vec3::ONE), Vec3::new(0.0, 20.0, 0.0), Quat::IDENTITY)
            .unwrap();
        for _ in 0..30 {
            w.step(1.0 / 60.0, 1.0 / 60.0, 3).unwrap();
        }
        let (pos, _) = w.read_transform(cube).unwrap();
        assert!(pos.y < 19.0, "Box should be falling, y = {}", pos.y);
    }

    #[test]
    fn test_catch_up_is_capped() {
        let mut w = world();
        let report = w.step(5.0, 1.0 / 60.0, 3).unwrap();
        assert_eq!(report.sub_steps, 3);
        assert!((report.simulated - 0.05).abs() < 1e-6);
        assert!(w.accumulator() < 1.0 / 60.0, "Excess time must be dropped");
    }

    #[test]
    fn test_partial_sub_step_carries_over() {
        let mut w = world();
        let fixed = 1.0 / 60.0;
        let first = w.step(0.010, fixed, 3).unwrap();
        assert_eq!(first.sub_steps, 0);
        let second = w.step(0.010, fixed, 3).unwrap();
        assert_eq!(second.sub_steps, 1);
        assert!((w.accumulator() - (0.020 - fixed)).abs() < 1e-5);
    }

    #[test]
    fn test_bad_delta_is_step_failure() {
        let mut w = world();
        assert!(matches!(
            w.step(f32::NAN, 1.0 / 60.0, 3),
            Err(SimError::WorldStepFailure(_))
        ));
        assert!(matches!(
            w.step(-1.0, 1.0 / 60.0, 3),
            Err(SimError::WorldStepFailure(_))
        ));
    }

    #[test]
    fn test_discarded_soft_body_is_emptied_and_never_stepped() {
        let mut w = world();
        let soft = w.create_soft_body().unwrap();
        w.append_node(soft, Vec3::new(0.0, 5.0, 0.0), 1.0).unwrap();
        w.discard_soft_body(soft).unwrap();

        assert_eq!(w.soft_node_count(soft), 0);
        assert!(w.read_soft_node_state(soft, 0).is_none());
        assert!(matches!(w.add_soft_body(SoftHandle(7)), Err(SimError::UnknownHandle(_))));

        let next = w.create_soft_body().unwrap();
        assert_ne!(next, soft, "Discarded handles are not reused");
        w.step(0.1, 1.0 / 60.0, 3).unwrap();
        assert_eq!(w.soft_node_count(soft), 0);
    }

    #[test]
    fn test_failed_step_drops_frame_time() {
        let mut w = world();
        let soft = w.create_soft_body().unwrap();
        w.append_node(soft, Vec3::splat(f32::NAN), 1.0).unwrap();
        w.add_soft_body(soft).unwrap();

        assert!(matches!(
            w.step(0.05, 1.0 / 60.0, 3),
            Err(SimError::WorldStepFailure(_))
        ));
        assert_eq!(w.accumulator(), 0.0, "Failed frame time must not carry over");

        let report = w.step(0.0, 1.0 / 60.0, 3).unwrap();
        assert_eq!(report.sub_steps, 0);
    }

    #[test]
    fn test_closest_rigid_surface_wins() {
        let mut w = world();
        w.create_static_body(&BodyShape::cuboid(Vec3::splat(2.0)), Vec3::ZERO, Quat::IDENTITY)
            .unwrap();
        w.step(1.0 / 60.0, 1.0 / 60.0, 1).unwrap();

        let contacts = RapierContacts {
            query: &w.query_pipeline,
            bodies: &w.rigid_body_set,
            colliders: &w.collider_set,
        };
        let surface = contacts.push_out(Vec3::new(0.0, 0.9, 0.2)).unwrap();
        assert!((surface - Vec3::new(0.0, 1.0, 0.2)).length() < 1e-4, "Got {:?}", surface);
        assert!(contacts.push_out(Vec3::new(0.0, 3.0, 0.0)).is_none());
    }

    #[test]
    fn test_invalid_dynamic_bodies_rejected() {
        let mut w = world();
        let shape = BodyShape::cuboid(Vec3::ONE);
        assert!(w.create_dynamic_body(0.0, &shape, Vec3::ZERO, Quat::IDENTITY).is_err());
        assert!(w.create_dynamic_body(-2.0, &shape, Vec3::ZERO, Quat::IDENTITY).is_err());
        assert!(w
            .create_dynamic_body(1.0, &BodyShape::plane(Vec3::Y), Vec3::ZERO, Quat::IDENTITY)
            .is_err());
        assert_eq!(w.rigid_body_count(), 0);
    }

    #[test]
    fn test_unknown_handles() {
        let mut w = world();
        assert!(w.read_transform(RigidHandle(7)).is_none());
        assert!(w.read_soft_node_state(SoftHandle(0), 0).is_none());
        assert!(w.append_node(SoftHandle(3), Vec3::ZERO, 1.0).is_err());
        assert!(w.set_rigid_deactivation(RigidHandle(0), false).is_err());
    }

    #[test]
    fn test_soft_body_only_moves_once_added() {
        let mut w = world();
        let soft = w.create_soft_body().unwrap();
        w.append_node(soft, Vec3::new(0.0, 5.0, 0.0), 1.0).unwrap();

        w.step(1.0 / 60.0, 1.0 / 60.0, 3).unwrap();
        assert_eq!(w.read_soft_node_state(soft, 0).unwrap().0.y, 5.0);

        w.add_soft_body(soft).unwrap();
        w.step(1.0 / 60.0, 1.0 / 60.0, 3).unwrap();
        assert!(w.read_soft_node_state(soft, 0).unwrap().0.y < 5.0);
    }

    #[test]
    fn test_soft_node_pushed_out_of_ground() {
        let mut w = world();
        w.create_static_body(&BodyShape::plane(Vec3::Y), Vec3::ZERO, Quat::IDENTITY)
            .unwrap();
        let soft = w.create_soft_body().unwrap();
        w.append_node(soft, Vec3::new(0.0, 0.5, 0.0), 1.0).unwrap();
        w.set_soft_deactivation(soft, false).unwrap();
        w.add_soft_body(soft).unwrap();

        for _ in 0..120 {
            w.step(1.0 / 60.0, 1.0 / 60.0, 3).unwrap();
        }
        let (pos, _) = w.read_soft_node_state(soft, 0).unwrap();
        assert!(pos.y > -1e-3, "Node fell through the ground: y = {}", pos.y);
        assert!(pos.y < 0.1, "Node should rest on the ground: y = {}", pos.y);
    }
}
