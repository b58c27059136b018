//! In-memory [`PhysicsWorld`] that records what it was asked to do.
//!
//! Dynamic bodies and added soft bodies sink at `fall_speed` units per
//! simulated second, which is enough motion to observe syncing.

use bevy::math::{Quat, Vec3};
use studio_core::{BodyShape, SimError, SimResult};

use crate::world::{
    CollisionFlags, PhysicsWorld, RigidHandle, SoftHandle, SoftMaterial, SolverIterations,
    StepReport,
};

#[derive(Debug, Clone)]
pub(crate) struct MockRigid {
    pub mass: f32,
    pub shape: BodyShape,
    pub position: Vec3,
    pub rotation: Quat,
    pub is_static: bool,
    pub deactivation: bool,
    pub has_motion_state: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockSoft {
    pub nodes: Vec<(Vec3, f32)>,
    pub faces: Vec<[u32; 3]>,
    pub tetrahedra: Vec<[u32; 4]>,
    pub links: Vec<[u32; 2]>,
    pub iterations: SolverIterations,
    pub flags: CollisionFlags,
    pub friction: f32,
    pub damping: f32,
    pub pressure: f32,
    pub material: SoftMaterial,
    pub margin: f32,
    pub deactivation: Option<bool>,
    pub added: bool,
    pub discarded: bool,
}

#[derive(Debug, Default)]
pub(crate) struct RecordingWorld {
    rigid: Vec<MockRigid>,
    soft: Vec<MockSoft>,
    /// `(dt, fixed_sub_step, max_sub_steps)` of every `step` call.
    pub step_calls: Vec<(f32, f32, u32)>,
    pub reports: Vec<StepReport>,
    pub fail_next_step: bool,
    /// Make every `set_pressure` call fail.
    pub fail_set_pressure: bool,
    pub fall_speed: f32,
    accumulator: f32,
}

impl RecordingWorld {
    pub fn new() -> Self {
        Self {
            fall_speed: 1.0,
            ..Default::default()
        }
    }

    pub fn rigid(&self, handle: RigidHandle) -> Option<&MockRigid> {
        self.rigid.get(handle.index())
    }

    pub fn soft(&self, handle: SoftHandle) -> Option<&MockSoft> {
        self.soft.get(handle.index())
    }

    pub fn rigid_count(&self) -> usize {
        self.rigid.len()
    }

    pub fn soft_count(&self) -> usize {
        self.soft.len()
    }

    /// Total simulated seconds over all steps.
    pub fn simulated(&self) -> f32 {
        self.reports.iter().map(|r| r.simulated).sum()
    }

    /// Make `read_transform` return `None` for this body from now on.
    pub fn drop_motion_state(&mut self, handle: RigidHandle) {
        if let Some(body) = self.rigid.get_mut(handle.index()) {
            body.has_motion_state = false;
        }
    }

    fn soft_mut(&mut self, body: SoftHandle) -> SimResult<&mut MockSoft> {
        self.soft
            .get_mut(body.index())
            .ok_or_else(|| SimError::UnknownHandle(format!("soft body {}", body.index())))
    }

    fn push_rigid(&mut self, body: MockRigid) -> SimResult<RigidHandle> {
        body.shape.validate()?;
        self.rigid.push(body);
        Ok(RigidHandle(self.rigid.len() as u32 - 1))
    }
}

impl PhysicsWorld for RecordingWorld {
    fn create_static_body(
        &mut self,
        shape: &BodyShape,
        position: Vec3,
        rotation: Quat,
    ) -> SimResult<RigidHandle> {
        self.push_rigid(MockRigid {
            mass: 0.0,
            shape: *shape,
            position,
            rotation,
            is_static: true,
            deactivation: true,
            has_motion_state: true,
        })
    }

    fn create_dynamic_body(
        &mut self,
        mass: f32,
        shape: &BodyShape,
        position: Vec3,
        rotation: Quat,
    ) -> SimResult<RigidHandle> {
        if mass <= 0.0 {
            return Err(SimError::InvalidParameter(format!("mass {}", mass)));
        }
        self.push_rigid(MockRigid {
            mass,
            shape: *shape,
            position,
            rotation,
            is_static: false,
            deactivation: true,
            has_motion_state: true,
        })
    }

    fn set_rigid_deactivation(&mut self, body: RigidHandle, enabled: bool) -> SimResult<()> {
        let rigid = self
            .rigid
            .get_mut(body.index())
            .ok_or_else(|| SimError::UnknownHandle(format!("rigid body {}", body.id())))?;
        rigid.deactivation = enabled;
        Ok(())
    }

    fn read_transform(&self, body: RigidHandle) -> Option<(Vec3, Quat)> {
        self.rigid
            .get(body.index())
            .filter(|b| b.has_motion_state)
            .map(|b| (b.position, b.rotation))
    }

    fn step(&mut self, dt: f32, fixed_sub_step: f32, max_sub_steps: u32) -> SimResult<StepReport> {
        self.step_calls.push((dt, fixed_sub_step, max_sub_steps));
        if self.fail_next_step {
            self.fail_next_step = false;
            return Err(SimError::WorldStepFailure("scripted failure".to_string()));
        }

        self.accumulator += dt;
        let mut sub_steps = 0;
        while self.accumulator >= fixed_sub_step && sub_steps < max_sub_steps {
            self.accumulator -= fixed_sub_step;
            sub_steps += 1;
        }
        self.accumulator %= fixed_sub_step;

        let report = StepReport {
            sub_steps,
            simulated: sub_steps as f32 * fixed_sub_step,
        };
        let drop = Vec3::Y * self.fall_speed * report.simulated;
        for body in self.rigid.iter_mut().filter(|b| !b.is_static) {
            body.position -= drop;
        }
        for soft in self.soft.iter_mut().filter(|s| s.added) {
            for (position, _) in soft.nodes.iter_mut() {
                *position -= drop;
            }
        }
        self.reports.push(report);
        Ok(report)
    }

    fn create_soft_body(&mut self) -> SimResult<SoftHandle> {
        self.soft.push(MockSoft::default());
        Ok(SoftHandle(self.soft.len() as u32 - 1))
    }

    fn append_node(&mut self, body: SoftHandle, position: Vec3, mass: f32) -> SimResult<u32> {
        let soft = self.soft_mut(body)?;
        soft.nodes.push((position, mass));
        Ok(soft.nodes.len() as u32 - 1)
    }

    fn append_face(&mut self, body: SoftHandle, nodes: [u32; 3]) -> SimResult<()> {
        self.soft_mut(body)?.faces.push(nodes);
        Ok(())
    }

    fn append_tetrahedron(&mut self, body: SoftHandle, nodes: [u32; 4]) -> SimResult<()> {
        self.soft_mut(body)?.tetrahedra.push(nodes);
        Ok(())
    }

    fn append_link(&mut self, body: SoftHandle, nodes: [u32; 2]) -> SimResult<()> {
        self.soft_mut(body)?.links.push(nodes);
        Ok(())
    }

    fn set_solver_iterations(
        &mut self,
        body: SoftHandle,
        iterations: SolverIterations,
    ) -> SimResult<()> {
        self.soft_mut(body)?.iterations = iterations;
        Ok(())
    }

    fn set_collision_flags(&mut self, body: SoftHandle, flags: CollisionFlags) -> SimResult<()> {
        self.soft_mut(body)?.flags = flags;
        Ok(())
    }

    fn set_friction(&mut self, body: SoftHandle, friction: f32) -> SimResult<()> {
        self.soft_mut(body)?.friction = friction;
        Ok(())
    }

    fn set_damping(&mut self, body: SoftHandle, damping: f32) -> SimResult<()> {
        self.soft_mut(body)?.damping = damping;
        Ok(())
    }

    fn set_pressure(&mut self, body: SoftHandle, pressure: f32) -> SimResult<()> {
        if self.fail_set_pressure {
            return Err(SimError::InvalidParameter(format!("pressure {}", pressure)));
        }
        self.soft_mut(body)?.pressure = pressure;
        Ok(())
    }

    fn set_material(&mut self, body: SoftHandle, material: SoftMaterial) -> SimResult<()> {
        self.soft_mut(body)?.material = material;
        Ok(())
    }

    fn set_collision_margin(&mut self, body: SoftHandle, margin: f32) -> SimResult<()> {
        self.soft_mut(body)?.margin = margin;
        Ok(())
    }

    fn set_soft_deactivation(&mut self, body: SoftHandle, enabled: bool) -> SimResult<()> {
        self.soft_mut(body)?.deactivation = Some(enabled);
        Ok(())
    }

    fn add_soft_body(&mut self, body: SoftHandle) -> SimResult<()> {
        self.soft_mut(body)?.added = true;
        Ok(())
    }

    fn discard_soft_body(&mut self, body: SoftHandle) -> SimResult<()> {
        let soft = self.soft_mut(body)?;
        *soft = MockSoft {
            discarded: true,
            ..Default::default()
        };
        Ok(())
    }

    fn read_soft_node_state(&self, body: SoftHandle, node: u32) -> Option<(Vec3, Vec3)> {
        let soft = self.soft.get(body.index())?;
        soft.nodes.get(node as usize).map(|(p, _)| (*p, Vec3::Y))
    }

    fn soft_node_count(&self, body: SoftHandle) -> usize {
        self.soft.get(body.index()).map_or(0, |s| s.nodes.len())
    }
}
