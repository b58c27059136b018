//! Render list shared between the simulation and the renderer.
//!
//! Every body in the scene owns one entry here. Rigid bodies expose a
//! transform, soft bodies expose position/normal/index buffers. The stepper is
//! the only writer; after each write it sets the entry's dirty flag, and the
//! renderer clears it once the data has been uploaded.

use bevy::math::{Quat, Vec3};

use crate::shape::BodyShape;
use crate::tetra_mesh::{IndexBuffer, VertexBuffer};

/// Index of an entry in a [`RenderList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderableId(u32);

impl RenderableId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Position and orientation of a rigid visual.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualTransform {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl VisualTransform {
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }
}

impl Default for VisualTransform {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Quat::IDENTITY)
    }
}

/// Renderable view of a rigid body.
#[derive(Debug, Clone)]
pub struct RigidVisual {
    pub shape: BodyShape,
    transform: VisualTransform,
    dirty: bool,
}

impl RigidVisual {
    pub fn transform(&self) -> VisualTransform {
        self.transform
    }

    /// Overwrite the transform and flag it for upload.
    pub fn set_transform(&mut self, transform: VisualTransform) {
        self.transform = transform;
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

/// Renderable view of a soft body: vertex buffers in node order.
#[derive(Debug, Clone)]
pub struct SoftVisual {
    vertices: VertexBuffer,
    indices: IndexBuffer,
    dirty: bool,
}

impl SoftVisual {
    pub fn positions(&self) -> &[Vec3] {
        &self.vertices.positions
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.vertices.normals
    }

    pub fn indices(&self) -> &IndexBuffer {
        &self.indices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Write one vertex. Does not touch the dirty flag; call
    /// [`SoftVisual::mark_dirty`] once the whole buffer is written.
    pub fn write_vertex(&mut self, index: usize, position: Vec3, normal: Vec3) {
        if let (Some(p), Some(n)) = (
            self.vertices.positions.get_mut(index),
            self.vertices.normals.get_mut(index),
        ) {
            *p = position;
            *n = normal;
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

/// One entry of the render list.
#[derive(Debug, Clone)]
pub enum Renderable {
    Rigid(RigidVisual),
    Soft(SoftVisual),
}

impl Renderable {
    pub fn is_dirty(&self) -> bool {
        match self {
            Renderable::Rigid(r) => r.is_dirty(),
            Renderable::Soft(s) => s.is_dirty(),
        }
    }

    pub fn clear_dirty(&mut self) {
        match self {
            Renderable::Rigid(r) => r.clear_dirty(),
            Renderable::Soft(s) => s.clear_dirty(),
        }
    }
}

/// Ordered list of everything the renderer draws.
#[derive(Debug, Clone, Default)]
pub struct RenderList {
    entries: Vec<Renderable>,
}

impl RenderList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rigid visual. It starts clean: its first transform is the
    /// construction transform, which the renderer picks up when it spawns it.
    pub fn push_rigid(&mut self, shape: BodyShape, transform: VisualTransform) -> RenderableId {
        self.push(Renderable::Rigid(RigidVisual {
            shape,
            transform,
            dirty: false,
        }))
    }

    /// Add a soft visual, taking ownership of the mesh buffers.
    pub fn push_soft(&mut self, vertices: VertexBuffer, indices: IndexBuffer) -> RenderableId {
        self.push(Renderable::Soft(SoftVisual {
            vertices,
            indices,
            dirty: false,
        }))
    }

    fn push(&mut self, renderable: Renderable) -> RenderableId {
        let id = RenderableId(self.entries.len() as u32);
        self.entries.push(renderable);
        id
    }

    pub fn get(&self, id: RenderableId) -> Option<&Renderable> {
        self.entries.get(id.index())
    }

    pub fn get_mut(&mut self, id: RenderableId) -> Option<&mut Renderable> {
        self.entries.get_mut(id.index())
    }

    pub fn rigid(&self, id: RenderableId) -> Option<&RigidVisual> {
        match self.get(id)? {
            Renderable::Rigid(r) => Some(r),
            Renderable::Soft(_) => None,
        }
    }

    pub fn rigid_mut(&mut self, id: RenderableId) -> Option<&mut RigidVisual> {
        match self.get_mut(id)? {
            Renderable::Rigid(r) => Some(r),
            Renderable::Soft(_) => None,
        }
    }

    pub fn soft(&self, id: RenderableId) -> Option<&SoftVisual> {
        match self.get(id)? {
            Renderable::Soft(s) => Some(s),
            Renderable::Rigid(_) => None,
        }
    }

    pub fn soft_mut(&mut self, id: RenderableId) -> Option<&mut SoftVisual> {
        match self.get_mut(id)? {
            Renderable::Soft(s) => Some(s),
            Renderable::Rigid(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (RenderableId, &Renderable)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, r)| (RenderableId(i as u32), r))
    }

    pub fn dirty_count(&self) -> usize {
        self.entries.iter().filter(|r| r.is_dirty()).count()
    }

    pub fn clear_all_dirty(&mut self) {
        for entry in &mut self.entries {
            entry.clear_dirty();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soft_buffers() -> (VertexBuffer, IndexBuffer) {
        (
            VertexBuffer {
                positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                normals: vec![Vec3::ZERO; 3],
            },
            IndexBuffer {
                triangles: vec![[0, 1, 2]],
            },
        )
    }

    #[test]
    fn test_new_entries_start_clean() {
        let mut list = RenderList::new();
        let rigid = list.push_rigid(BodyShape::ball(1.0), VisualTransform::default());
        let (v, i) = soft_buffers();
        let soft = list.push_soft(v, i);

        assert_eq!(list.len(), 2);
        assert_eq!(list.dirty_count(), 0);
        assert!(list.rigid(rigid).is_some());
        assert!(list.soft(soft).is_some());
        assert!(list.soft(rigid).is_none(), "Rigid id must not resolve to a soft visual");
    }

    #[test]
    fn test_set_transform_marks_dirty() {
        let mut list = RenderList::new();
        let id = list.push_rigid(BodyShape::ball(1.0), VisualTransform::default());

        let moved = VisualTransform::new(Vec3::new(0.0, 2.0, 0.0), Quat::IDENTITY);
        list.rigid_mut(id).unwrap().set_transform(moved);
        assert!(list.rigid(id).unwrap().is_dirty());
        assert_eq!(list.rigid(id).unwrap().transform(), moved);

        list.clear_all_dirty();
        assert_eq!(list.dirty_count(), 0);
    }

    #[test]
    fn test_soft_write_then_mark() {
        let mut list = RenderList::new();
        let (v, i) = soft_buffers();
        let id = list.push_soft(v, i);

        let soft = list.soft_mut(id).unwrap();
        soft.write_vertex(1, Vec3::new(3.0, 0.0, 0.0), Vec3::Z);
        soft.write_vertex(99, Vec3::ONE, Vec3::Z);
        assert!(!soft.is_dirty());
        soft.mark_dirty();

        let soft = list.soft(id).unwrap();
        assert!(soft.is_dirty());
        assert_eq!(soft.positions()[1], Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(soft.normals()[1], Vec3::Z);
        assert_eq!(soft.vertex_count(), 3);
    }
}
