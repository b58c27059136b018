//! Position-based soft body solver used by [`crate::RapierWorld`].
//!
//! Rapier only simulates rigid bodies, so soft bodies are handled here:
//!
//! 1. Position Verlet integration of every node (gravity + pressure, damped)
//! 2. `position` passes over links, tetrahedron volumes and rigid contacts
//! 3. `drift` passes over links only
//! 4. Tangential friction on nodes that touched a rigid surface
//!
//! Stiffness values are per-step targets in `0..=1`; they are converted to a
//! per-pass factor so the result does not depend on the pass count.

use bevy::math::Vec3;
use studio_core::{tetrahedron_volume, SimError, SimResult};

use crate::world::{CollisionFlags, SoftMaterial, SolverIterations};

/// Node displacement per sub-step under which a body counts as idle.
const SLEEP_DISPLACEMENT: f32 = 1e-4;

/// Idle sub-steps before a body may go to sleep.
const SLEEP_STEPS: u32 = 60;

/// Rigid geometry that soft nodes collide with.
pub(crate) trait ContactQuery {
    /// Closest surface point if `point` is inside a solid, `None` otherwise.
    fn push_out(&self, point: Vec3) -> Option<Vec3>;
}

#[derive(Debug, Clone)]
pub(crate) struct SoftNode {
    pub position: Vec3,
    pub previous: Vec3,
    pub normal: Vec3,
    pub inv_mass: f32,
}

#[derive(Debug, Clone, Copy)]
struct SoftLink {
    nodes: [usize; 2],
    rest_length: f32,
}

#[derive(Debug, Clone, Copy)]
struct SoftTetra {
    nodes: [usize; 4],
    rest_volume: f32,
}

/// Solver parameters of one soft body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SoftParams {
    pub iterations: SolverIterations,
    pub flags: CollisionFlags,
    pub friction: f32,
    pub damping: f32,
    pub pressure: f32,
    pub material: SoftMaterial,
    pub margin: f32,
    pub deactivation: bool,
}

impl Default for SoftParams {
    fn default() -> Self {
        Self {
            iterations: SolverIterations::default(),
            flags: CollisionFlags::default(),
            friction: 0.2,
            damping: 0.0,
            pressure: 0.0,
            material: SoftMaterial::default(),
            margin: 0.05,
            deactivation: true,
        }
    }
}

/// Node/face/link/tetrahedron soup of one soft body.
#[derive(Debug, Clone, Default)]
pub(crate) struct SoftBody {
    pub nodes: Vec<SoftNode>,
    faces: Vec<[usize; 3]>,
    links: Vec<SoftLink>,
    tetras: Vec<SoftTetra>,
    pub params: SoftParams,
    active: bool,
    sleeping: bool,
    idle_steps: u32,
}

/// Per-pass factor that reaches `stiffness` after `passes` passes.
fn pass_stiffness(stiffness: f32, passes: u32) -> f32 {
    let k = stiffness.clamp(0.0, 1.0);
    if passes <= 1 {
        return k;
    }
    1.0 - (1.0 - k).powf(1.0 / passes as f32)
}

impl SoftBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn activate(&mut self) {
        self.active = true;
        self.sleeping = false;
        self.idle_steps = 0;
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    pub fn append_node(&mut self, position: Vec3, mass: f32) -> u32 {
        let inv_mass = if mass > 0.0 { 1.0 / mass } else { 0.0 };
        self.nodes.push(SoftNode {
            position,
            previous: position,
            normal: Vec3::ZERO,
            inv_mass,
        });
        (self.nodes.len() - 1) as u32
    }

    fn check_nodes(&self, nodes: &[u32]) -> SimResult<()> {
        match nodes.iter().find(|&&n| n as usize >= self.nodes.len()) {
            Some(n) => Err(SimError::UnknownHandle(format!(
                "node {} (soft body has {} nodes)",
                n,
                self.nodes.len()
            ))),
            None => Ok(()),
        }
    }

    pub fn append_face(&mut self, nodes: [u32; 3]) -> SimResult<()> {
        self.check_nodes(&nodes)?;
        self.faces.push(nodes.map(|n| n as usize));
        Ok(())
    }

    /// Rest length is taken from the current node positions.
    pub fn append_link(&mut self, nodes: [u32; 2]) -> SimResult<()> {
        self.check_nodes(&nodes)?;
        let [a, b] = nodes.map(|n| n as usize);
        let rest_length = self.nodes[a].position.distance(self.nodes[b].position);
        self.links.push(SoftLink {
            nodes: [a, b],
            rest_length,
        });
        Ok(())
    }

    /// Rest volume is taken from the current node positions.
    pub fn append_tetrahedron(&mut self, nodes: [u32; 4]) -> SimResult<()> {
        self.check_nodes(&nodes)?;
        let idx = nodes.map(|n| n as usize);
        let rest_volume = self.tetra_volume(idx);
        self.tetras.push(SoftTetra {
            nodes: idx,
            rest_volume,
        });
        Ok(())
    }

    fn tetra_volume(&self, [a, b, c, d]: [usize; 4]) -> f32 {
        tetrahedron_volume(
            self.nodes[a].position,
            self.nodes[b].position,
            self.nodes[c].position,
            self.nodes[d].position,
        )
    }

    pub fn node_state(&self, node: u32) -> Option<(Vec3, Vec3)> {
        self.nodes
            .get(node as usize)
            .map(|n| (n.position, n.normal))
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn tetra_count(&self) -> usize {
        self.tetras.len()
    }

    /// Enclosed volume.
    ///
    /// The cell split mixes tetrahedron orientations, so each signed volume
    /// is oriented by the sign of its rest volume. An inverted tetrahedron
    /// counts as negative.
    pub fn volume(&self) -> f32 {
        self.tetras
            .iter()
            .map(|t| self.tetra_volume(t.nodes) * t.rest_volume.signum())
            .sum()
    }

    pub fn center(&self) -> Vec3 {
        if self.nodes.is_empty() {
            return Vec3::ZERO;
        }
        self.nodes.iter().map(|n| n.position).sum::<Vec3>() / self.nodes.len() as f32
    }

    /// Bounding box of the nodes.
    pub fn aabb(&self) -> (Vec3, Vec3) {
        self.nodes.iter().fold(
            (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
            |(min, max), n| (min.min(n.position), max.max(n.position)),
        )
    }

    /// Area-weighted vertex normals from the surface faces.
    pub fn update_normals(&mut self) {
        for node in &mut self.nodes {
            node.normal = Vec3::ZERO;
        }
        for &[a, b, c] in &self.faces {
            let (pa, pb, pc) = (
                self.nodes[a].position,
                self.nodes[b].position,
                self.nodes[c].position,
            );
            let normal = (pb - pa).cross(pc - pa);
            self.nodes[a].normal += normal;
            self.nodes[b].normal += normal;
            self.nodes[c].normal += normal;
        }
        for node in &mut self.nodes {
            node.normal = node.normal.normalize_or_zero();
        }
    }

    /// One fixed sub-step of length `h`.
    pub fn step(&mut self, gravity: Vec3, h: f32, contacts: Option<&dyn ContactQuery>) -> SimResult<()> {
        if !self.active || self.sleeping {
            return Ok(());
        }

        self.integrate(gravity, h);

        let passes = self.params.iterations.position.max(1);
        let link_k = pass_stiffness(self.params.material.linear, passes);
        let volume_k = pass_stiffness(self.params.material.volume, passes);

        let mut touching: Vec<Option<Vec3>> = vec![None; self.nodes.len()];
        for _ in 0..passes {
            self.solve_links(link_k);
            self.solve_volumes(volume_k);
            if let Some(query) = contacts {
                self.solve_contacts(query, &mut touching);
            }
        }
        for _ in 0..self.params.iterations.drift {
            self.solve_links(link_k);
        }
        self.apply_friction(&touching);

        if let Some(i) = self.nodes.iter().position(|n| !n.position.is_finite()) {
            return Err(SimError::WorldStepFailure(format!(
                "soft body node {} diverged",
                i
            )));
        }

        self.update_sleep();
        Ok(())
    }

    fn integrate(&mut self, gravity: Vec3, h: f32) {
        let mut forces = vec![Vec3::ZERO; self.nodes.len()];
        if self.params.pressure != 0.0 {
            for &[a, b, c] in &self.faces {
                let (pa, pb, pc) = (
                    self.nodes[a].position,
                    self.nodes[b].position,
                    self.nodes[c].position,
                );
                // Half the cross product is the area vector; a third goes to each corner.
                let share = (pb - pa).cross(pc - pa) * (self.params.pressure / 6.0);
                forces[a] += share;
                forces[b] += share;
                forces[c] += share;
            }
        }

        let keep = 1.0 - self.params.damping.clamp(0.0, 1.0);
        for (node, force) in self.nodes.iter_mut().zip(forces) {
            if node.inv_mass == 0.0 {
                node.previous = node.position;
                continue;
            }
            let velocity = (node.position - node.previous) * keep;
            let accel = gravity + force * node.inv_mass;
            node.previous = node.position;
            node.position += velocity + accel * h * h;
        }
    }

    fn solve_links(&mut self, k: f32) {
        for link in &self.links {
            let [a, b] = link.nodes;
            let (wa, wb) = (self.nodes[a].inv_mass, self.nodes[b].inv_mass);
            let w = wa + wb;
            if w == 0.0 {
                continue;
            }
            let delta = self.nodes[b].position - self.nodes[a].position;
            let length = delta.length();
            if length < 1e-9 {
                continue;
            }
            let correction = delta * ((length - link.rest_length) / (length * w) * k);
            self.nodes[a].position += correction * wa;
            self.nodes[b].position -= correction * wb;
        }
    }

    fn solve_volumes(&mut self, k: f32) {
        if k == 0.0 {
            return;
        }
        for tet in &self.tetras {
            let [i0, i1, i2, i3] = tet.nodes;
            let (p0, p1, p2, p3) = (
                self.nodes[i0].position,
                self.nodes[i1].position,
                self.nodes[i2].position,
                self.nodes[i3].position,
            );
            let g1 = (p2 - p0).cross(p3 - p0) / 6.0;
            let g2 = (p3 - p0).cross(p1 - p0) / 6.0;
            let g3 = (p1 - p0).cross(p2 - p0) / 6.0;
            let g0 = -(g1 + g2 + g3);

            let grads = [g0, g1, g2, g3];
            let weights = tet.nodes.map(|i| self.nodes[i].inv_mass);
            let denom: f32 = grads
                .iter()
                .zip(weights)
                .map(|(g, w)| w * g.length_squared())
                .sum();
            if denom < 1e-12 {
                continue;
            }

            let c = tetrahedron_volume(p0, p1, p2, p3) - tet.rest_volume;
            let s = -k * c / denom;
            for ((&i, g), w) in tet.nodes.iter().zip(grads).zip(weights) {
                self.nodes[i].position += g * (s * w);
            }
        }
    }

    /// Moves penetrating nodes to the surface, remembering the contact normal.
    fn solve_contacts(&mut self, query: &dyn ContactQuery, touching: &mut [Option<Vec3>]) {
        for (node, touch) in self.nodes.iter_mut().zip(touching.iter_mut()) {
            if node.inv_mass == 0.0 {
                continue;
            }
            if let Some(surface) = query.push_out(node.position) {
                let normal = (surface - node.position).normalize_or(Vec3::Y);
                node.position = surface;
                *touch = Some(normal);
            }
        }
    }

    /// Removes part of the tangential motion of nodes that touched a surface.
    fn apply_friction(&mut self, touching: &[Option<Vec3>]) {
        let friction = self.params.friction.clamp(0.0, 1.0);
        if friction == 0.0 {
            return;
        }
        for (node, touch) in self.nodes.iter_mut().zip(touching) {
            let Some(normal) = *touch else {
                continue;
            };
            let displacement = node.position - node.previous;
            let tangential = displacement - normal * displacement.dot(normal);
            node.position -= tangential * friction;
        }
    }

    fn update_sleep(&mut self) {
        if !self.params.deactivation {
            self.idle_steps = 0;
            return;
        }
        let max_motion = self
            .nodes
            .iter()
            .map(|n| n.position.distance_squared(n.previous))
            .fold(0.0f32, f32::max)
            .sqrt();
        if max_motion < SLEEP_DISPLACEMENT {
            self.idle_steps += 1;
            if self.idle_steps >= SLEEP_STEPS {
                self.sleeping = true;
            }
        } else {
            self.idle_steps = 0;
        }
    }
}

/// Node-sphere contacts between every pair of soft bodies that allow them.
pub(crate) fn solve_soft_soft(bodies: &mut [SoftBody]) {
    for i in 0..bodies.len() {
        let (head, tail) = bodies.split_at_mut(i + 1);
        let a = &mut head[i];
        if !a.active || !a.params.flags.soft_soft {
            continue;
        }
        for b in tail.iter_mut() {
            if !b.active || !b.params.flags.soft_soft {
                continue;
            }
            collide_pair(a, b);
        }
    }
}

fn collide_pair(a: &mut SoftBody, b: &mut SoftBody) {
    let radius = a.params.margin + b.params.margin;
    let (a_min, a_max) = a.aabb();
    let (b_min, b_max) = b.aabb();
    let reach = Vec3::splat(radius);
    if (a_min - reach).cmpgt(b_max).any() || (b_min - reach).cmpgt(a_max).any() {
        return;
    }

    let mut touched = false;
    for na in &mut a.nodes {
        for nb in &mut b.nodes {
            let w = na.inv_mass + nb.inv_mass;
            if w == 0.0 {
                continue;
            }
            let delta = nb.position - na.position;
            let dist = delta.length();
            if dist >= radius || dist < 1e-9 {
                continue;
            }
            let push = delta * ((radius - dist) / (dist * w));
            na.position -= push * na.inv_mass;
            nb.position += push * nb.inv_mass;
            touched = true;
        }
    }
    if touched {
        a.sleeping = false;
        b.sleeping = false;
        a.idle_steps = 0;
        b.idle_steps = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::UVec3;
    use studio_core::{generate_tetra_mesh, GridSpec};

    /// Infinite floor at a fixed height.
    struct GroundPlane {
        height: f32,
    }

    impl ContactQuery for GroundPlane {
        fn push_out(&self, point: Vec3) -> Option<Vec3> {
            (point.y < self.height).then(|| Vec3::new(point.x, self.height, point.z))
        }
    }

    fn build(spec: &GridSpec, total_mass: f32, params: SoftParams) -> SoftBody {
        let mesh = generate_tetra_mesh(spec).unwrap();
        let mut body = SoftBody::new();
        let node_mass = total_mass / mesh.vertices.len() as f32;
        for &p in &mesh.vertices.positions {
            body.append_node(p, node_mass);
        }
        for &tri in &mesh.indices.triangles {
            body.append_face(tri).unwrap();
        }
        for &tet in &mesh.tetras.tetrahedra {
            body.append_tetrahedron(tet).unwrap();
        }
        for &link in &mesh.tetras.links {
            body.append_link(link).unwrap();
        }
        body.params = params;
        body.activate();
        body
    }

    fn small_box(offset: Vec3) -> GridSpec {
        GridSpec::new(Vec3::ONE, UVec3::new(3, 3, 3)).with_offset(offset)
    }

    #[test]
    fn test_pass_stiffness_compounds_to_target() {
        let per_pass = pass_stiffness(0.5, 4);
        let remaining = (1.0 - per_pass).powi(4);
        assert!((remaining - 0.5).abs() < 1e-5);
        assert_eq!(pass_stiffness(1.0, 10), 1.0);
        assert_eq!(pass_stiffness(0.3, 1), 0.3);
    }

    #[test]
    fn test_rest_volume_matches_box() {
        let body = build(&small_box(Vec3::ZERO), 1.0, SoftParams::default());
        assert!((body.volume() - 1.0).abs() < 1e-5);
        assert_eq!(body.tetra_count(), 40);
        assert_eq!(body.link_count(), 240);
    }

    #[test]
    fn test_volume_counts_mixed_orientation_tetrahedra() {
        let body = build(
            &GridSpec::new(Vec3::new(2.0, 1.0, 3.0), UVec3::new(2, 2, 2)),
            1.0,
            SoftParams::default(),
        );
        let signs: Vec<f32> = body.tetras.iter().map(|t| t.rest_volume.signum()).collect();
        assert!(signs.contains(&1.0) && signs.contains(&-1.0));
        assert!((body.volume() - 6.0).abs() < 1e-4, "Got {}", body.volume());
    }

    #[test]
    fn test_inverted_tetrahedron_reduces_volume() {
        let mut body = SoftBody::new();
        for p in [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z] {
            body.append_node(p, 1.0);
        }
        body.append_tetrahedron([0, 1, 2, 3]).unwrap();
        let rest = body.volume();
        assert!((rest - 1.0 / 6.0).abs() < 1e-6);

        body.nodes[3].position = -Vec3::Z;
        assert!((body.volume() + rest).abs() < 1e-6, "Got {}", body.volume());
    }

    #[test]
    fn test_free_fall_matches_gravity() {
        let params = SoftParams {
            flags: CollisionFlags::NONE,
            deactivation: false,
            ..Default::default()
        };
        let mut body = build(&small_box(Vec3::new(0.0, 10.0, 0.0)), 1.0, params);
        let h = 1.0 / 60.0;
        for _ in 0..60 {
            body.step(Vec3::new(0.0, -9.82, 0.0), h, None).unwrap();
        }
        // Verlet with zero initial velocity: y = y0 - g*h^2*n(n+1)/2
        let expected = 10.0 - 9.82 * h * h * (60.0 * 61.0) / 2.0;
        assert!(
            (body.center().y - expected).abs() < 0.05,
            "Expected center y ~{}, got {}",
            expected,
            body.center().y
        );
    }

    #[test]
    fn test_body_rests_on_ground_and_keeps_volume() {
        let params = SoftParams {
            deactivation: false,
            ..Default::default()
        };
        let mut body = build(&small_box(Vec3::new(0.0, 2.0, 0.0)), 1.0, params);
        let ground = GroundPlane { height: 0.0 };
        for _ in 0..240 {
            body.step(Vec3::new(0.0, -9.82, 0.0), 1.0 / 60.0, Some(&ground)).unwrap();
        }
        let (min, _) = body.aabb();
        assert!(min.y > -0.05, "Body sank through the ground: min y {}", min.y);
        assert!(
            (body.center().y - 0.5).abs() < 0.2,
            "Body should rest with center near 0.5, got {}",
            body.center().y
        );
        assert!(
            (body.volume() - 1.0).abs() < 0.25,
            "Volume drifted to {}",
            body.volume()
        );
    }

    #[test]
    fn test_normals_point_outward() {
        let mut body = build(&small_box(Vec3::ZERO), 1.0, SoftParams::default());
        body.update_normals();
        // Corner node 0 sits at (-0.5, -0.5, -0.5)
        let (_, normal) = body.node_state(0).unwrap();
        let expected = Vec3::splat(-1.0).normalize();
        assert!((normal - expected).length() < 1e-4, "Got normal {:?}", normal);
        // Center node has no faces
        let (_, center_normal) = body.node_state(13).unwrap();
        assert_eq!(center_normal, Vec3::ZERO);
    }

    #[test]
    fn test_pressure_inflates_unconstrained_box() {
        let params = SoftParams {
            pressure: 50.0,
            material: SoftMaterial::uniform(0.0),
            flags: CollisionFlags::NONE,
            deactivation: false,
            ..Default::default()
        };
        let mut body = build(&small_box(Vec3::ZERO), 1.0, params);
        for _ in 0..10 {
            body.step(Vec3::ZERO, 1.0 / 60.0, None).unwrap();
        }
        assert!(body.volume() > 1.0, "Pressure should grow the box, got {}", body.volume());
    }

    #[test]
    fn test_idle_body_falls_asleep_only_when_allowed() {
        let mut awake = build(
            &small_box(Vec3::ZERO),
            1.0,
            SoftParams {
                deactivation: false,
                ..Default::default()
            },
        );
        let mut sleepy = build(&small_box(Vec3::ZERO), 1.0, SoftParams::default());
        for _ in 0..(SLEEP_STEPS + 5) {
            awake.step(Vec3::ZERO, 1.0 / 60.0, None).unwrap();
            sleepy.step(Vec3::ZERO, 1.0 / 60.0, None).unwrap();
        }
        assert!(!awake.is_sleeping());
        assert!(sleepy.is_sleeping());
    }

    #[test]
    fn test_soft_bodies_push_apart() {
        let params = SoftParams {
            margin: 0.1,
            ..Default::default()
        };
        let mut bodies = vec![
            build(&small_box(Vec3::ZERO), 1.0, params),
            build(&small_box(Vec3::new(1.05, 0.0, 0.0)), 1.0, params),
        ];
        solve_soft_soft(&mut bodies);

        let right_of_left = bodies[0].aabb().1.x;
        let left_of_right = bodies[1].aabb().0.x;
        assert!(
            left_of_right - right_of_left > 0.05,
            "Expected a gap after contact, got {}",
            left_of_right - right_of_left
        );
    }

    #[test]
    fn test_out_of_range_indices_rejected() {
        let mut body = SoftBody::new();
        body.append_node(Vec3::ZERO, 1.0);
        assert!(body.append_link([0, 3]).is_err());
        assert!(body.append_face([0, 0, 1]).is_err());
        assert_eq!(body.link_count(), 0);
    }
}
