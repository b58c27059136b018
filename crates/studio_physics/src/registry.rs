//! Records of every body the simulation built.
//!
//! The registry only stores handles. The physics world owns the bodies and
//! the render list owns their buffers.

use crate::rigid_body::RigidBodyRecord;
use crate::soft_body::SoftBodyRecord;

#[derive(Debug, Default)]
pub struct BodyRegistry {
    rigid_bodies: Vec<RigidBodyRecord>,
    /// Indices into `rigid_bodies` of the dynamic bodies, in creation order.
    needs_sync: Vec<usize>,
    soft_bodies: Vec<SoftBodyRecord>,
}

impl BodyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a rigid body. Only dynamic bodies are queued for per-frame sync.
    pub fn insert_rigid(&mut self, record: RigidBodyRecord) {
        if !record.is_static() {
            self.needs_sync.push(self.rigid_bodies.len());
        }
        self.rigid_bodies.push(record);
    }

    pub fn insert_soft(&mut self, record: SoftBodyRecord) {
        self.soft_bodies.push(record);
    }

    pub fn rigid_bodies(&self) -> &[RigidBodyRecord] {
        &self.rigid_bodies
    }

    /// Dynamic bodies whose visuals follow the physics world.
    pub fn needs_sync(&self) -> impl Iterator<Item = &RigidBodyRecord> + '_ {
        self.needs_sync.iter().map(|&i| &self.rigid_bodies[i])
    }

    pub fn needs_sync_count(&self) -> usize {
        self.needs_sync.len()
    }

    pub fn soft_bodies(&self) -> &[SoftBodyRecord] {
        &self.soft_bodies
    }

    pub fn soft_node_total(&self) -> usize {
        self.soft_bodies.iter().map(|s| s.node_count).sum()
    }

    pub fn clear(&mut self) {
        self.rigid_bodies.clear();
        self.needs_sync.clear();
        self.soft_bodies.clear();
    }
}
