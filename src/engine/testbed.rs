//! A minimal reference engine.
//!
//! Dynamic bodies integrate gravity and rest on the ground plane at y = 0;
//! contacts are begin/end transitions between overlapping bounding
//! spheres; rays hit spheres exactly and cuboids as axis-aligned boxes.
//! Enough to exercise every channel end-to-end. It is not a real solver
//! and does not try to be one.

use std::collections::BTreeMap;

use glam::{Quat, Vec3};

use super::{CharacterState, PhysicsEngine, RaycastHit};
use crate::protocol::{
    BodyDesc, BodyKind, BodyRecord, ColliderShape, ContactEvent, ContactPhase, ControllerTuning,
};
use crate::subject::SubjectId;

const GROUND_EPSILON: f32 = 1e-3;

#[derive(Debug, Clone)]
struct Body {
    shape: ColliderShape,
    kind: BodyKind,
    position: Vec3,
    orientation: Quat,
    velocity: Vec3,
    tuning: ControllerTuning,
}

impl Body {
    /// Distance from center to the lowest point of the collider.
    fn support(&self) -> f32 {
        match self.shape {
            ColliderShape::Sphere { radius } => radius,
            ColliderShape::Capsule {
                radius,
                half_height,
            } => radius + half_height,
            ColliderShape::Cuboid { half_extents } => half_extents.y,
        }
    }

    fn probe_radius(&self) -> f32 {
        match self.shape {
            ColliderShape::Sphere { radius } | ColliderShape::Capsule { radius, .. } => radius,
            ColliderShape::Cuboid { half_extents } => half_extents.x.max(half_extents.z),
        }
    }

    fn moves(&self) -> bool {
        matches!(self.kind, BodyKind::Dynamic | BodyKind::Character)
    }

    fn on_ground(&self) -> bool {
        self.position.y - self.support() <= GROUND_EPSILON && self.velocity.y <= GROUND_EPSILON
    }
}

/// The built-in reference engine.
pub struct TestbedWorld {
    gravity: Vec3,
    bodies: BTreeMap<SubjectId, Body>,
    /// Pairs overlapping as of the last step, with their last contact
    /// geometry so an Ended event can repeat it.
    touching: BTreeMap<(SubjectId, SubjectId), (Vec3, Vec3)>,
}

impl TestbedWorld {
    pub fn new() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            bodies: BTreeMap::new(),
            touching: BTreeMap::new(),
        }
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    /// Pose of a body, for tests and demos.
    pub fn body_pose(&self, subject: SubjectId) -> Option<(Vec3, Quat)> {
        self.bodies
            .get(&subject)
            .map(|b| (b.position, b.orientation))
    }

    fn detect_contacts(&mut self, contacts: &mut dyn FnMut(ContactEvent)) {
        let mut current: BTreeMap<(SubjectId, SubjectId), (Vec3, Vec3)> = BTreeMap::new();

        let ids: Vec<SubjectId> = self.bodies.keys().copied().collect();
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                let (ba, bb) = (&self.bodies[&a], &self.bodies[&b]);
                if !ba.moves() && !bb.moves() {
                    continue;
                }
                let ra = ba.shape.bounding_radius();
                let rb = bb.shape.bounding_radius();
                let delta = bb.position - ba.position;
                let gap = delta.length() - (ra + rb);
                if gap < 0.0 {
                    let normal = delta.try_normalize().unwrap_or(Vec3::Y);
                    let point = ba.position + normal * ra;
                    let key = (a, b);
                    if !self.touching.contains_key(&key) {
                        let closing = (ba.velocity - bb.velocity).dot(normal).max(0.0);
                        contacts(ContactEvent {
                            phase: ContactPhase::Started,
                            a,
                            b,
                            point,
                            normal,
                            impulse: closing,
                            penetration: -gap,
                        });
                    }
                    current.insert(key, (point, normal));
                }
            }
        }

        for (&(a, b), &(point, normal)) in &self.touching {
            if !current.contains_key(&(a, b)) {
                contacts(ContactEvent {
                    phase: ContactPhase::Ended,
                    a,
                    b,
                    point,
                    normal,
                    impulse: 0.0,
                    penetration: 0.0,
                });
            }
        }

        self.touching = current;
    }
}

impl Default for TestbedWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsEngine for TestbedWorld {
    fn create_body(&mut self, subject: SubjectId, body: &BodyDesc) -> bool {
        if !subject.is_some() || self.bodies.contains_key(&subject) {
            return false;
        }
        self.bodies.insert(
            subject,
            Body {
                shape: body.shape,
                kind: body.kind,
                position: body.position,
                orientation: body.orientation,
                velocity: body.velocity.unwrap_or(Vec3::ZERO),
                tuning: body.controller.unwrap_or_default(),
            },
        );
        true
    }

    fn destroy_body(&mut self, subject: SubjectId) -> bool {
        let existed = self.bodies.remove(&subject).is_some();
        if existed {
            self.touching.retain(|&(a, b), _| a != subject && b != subject);
        }
        existed
    }

    fn set_transform(&mut self, subject: SubjectId, position: Vec3, orientation: Quat) -> bool {
        match self.bodies.get_mut(&subject) {
            Some(body) => {
                body.position = position;
                body.orientation = orientation;
                true
            }
            None => false,
        }
    }

    fn move_character(&mut self, subject: SubjectId, displacement: Vec3) -> bool {
        match self.bodies.get_mut(&subject) {
            Some(body) if body.kind == BodyKind::Character => {
                body.position += displacement;
                let support = body.support();
                if body.position.y < support {
                    body.position.y = support;
                }
                true
            }
            _ => false,
        }
    }

    fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    fn step(&mut self, dt: f32, contacts: &mut dyn FnMut(ContactEvent)) {
        for body in self.bodies.values_mut() {
            if !body.moves() {
                continue;
            }
            body.velocity += self.gravity * dt;
            body.position += body.velocity * dt;

            let support = body.support();
            if body.position.y < support {
                body.position.y = support;
                if body.velocity.y < 0.0 {
                    body.velocity.y = 0.0;
                }
            }
        }

        self.detect_contacts(contacts);
    }

    fn cast_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RaycastHit> {
        let mut best: Option<RaycastHit> = None;
        for (&subject, body) in &self.bodies {
            let hit = match body.shape {
                ColliderShape::Cuboid { half_extents } => {
                    ray_aabb(origin, direction, body.position, half_extents, max_distance)
                }
                _ => ray_sphere(
                    origin,
                    direction,
                    body.position,
                    body.shape.bounding_radius(),
                    max_distance,
                ),
            };
            if let Some((distance, point, normal)) = hit {
                if best.map_or(true, |b| distance < b.distance) {
                    best = Some(RaycastHit {
                        subject,
                        distance,
                        point,
                        normal,
                    });
                }
            }
        }
        best
    }

    fn character(&self, subject: SubjectId) -> Option<CharacterState> {
        let body = self.bodies.get(&subject)?;
        if body.kind != BodyKind::Character {
            return None;
        }
        Some(CharacterState {
            position: body.position,
            velocity: body.velocity,
            grounded: body.on_ground(),
            radius: body.probe_radius(),
            tuning: body.tuning,
        })
    }

    fn each_body(&self, visit: &mut dyn FnMut(BodyRecord)) {
        for (&subject, body) in &self.bodies {
            visit(BodyRecord {
                subject,
                position: body.position,
                orientation: body.orientation,
                vertical_speed: body.velocity.y,
            });
        }
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }
}

fn ray_sphere(
    origin: Vec3,
    direction: Vec3,
    center: Vec3,
    radius: f32,
    max_distance: f32,
) -> Option<(f32, Vec3, Vec3)> {
    let to_center = center - origin;
    let along = to_center.dot(direction);
    let closest_sq = to_center.length_squared() - along * along;
    let radius_sq = radius * radius;
    if closest_sq > radius_sq {
        return None;
    }
    let half_chord = (radius_sq - closest_sq).sqrt();
    let distance = along - half_chord;
    if distance < 0.0 || distance > max_distance {
        return None;
    }
    let point = origin + direction * distance;
    let normal = (point - center).try_normalize().unwrap_or(-direction);
    Some((distance, point, normal))
}

/// Cuboids are treated as axis-aligned for ray tests; the testbed never
/// rotates them.
fn ray_aabb(
    origin: Vec3,
    direction: Vec3,
    center: Vec3,
    half_extents: Vec3,
    max_distance: f32,
) -> Option<(f32, Vec3, Vec3)> {
    let min = center - half_extents;
    let max = center + half_extents;

    let mut t_entry = 0.0f32;
    let mut t_exit = max_distance;
    let mut entry_axis = 0;
    let mut entry_sign = 1.0f32;

    for axis in 0..3 {
        let o = origin[axis];
        let d = direction[axis];
        if d.abs() < 1e-9 {
            if o < min[axis] || o > max[axis] {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let mut t0 = (min[axis] - o) * inv;
        let mut t1 = (max[axis] - o) * inv;
        let mut sign = -1.0;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
            sign = 1.0;
        }
        if t0 > t_entry {
            t_entry = t0;
            entry_axis = axis;
            entry_sign = sign;
        }
        t_exit = t_exit.min(t1);
        if t_entry > t_exit {
            return None;
        }
    }

    let point = origin + direction * t_entry;
    let mut normal = Vec3::ZERO;
    normal[entry_axis] = entry_sign;
    Some((t_entry, point, normal))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sphere(radius: f32) -> BodyDesc {
        BodyDesc::new(ColliderShape::Sphere { radius })
    }

    #[test]
    fn gravity_pulls_dynamic_bodies_down() {
        let mut world = TestbedWorld::new();
        assert!(world.create_body(
            SubjectId(1),
            &sphere(1.0).with_position(Vec3::new(0.0, 5.0, 0.0))
        ));

        world.step(1.0 / 60.0, &mut |_| {});
        let (position, _) = world.body_pose(SubjectId(1)).unwrap();
        assert!(position.y < 5.0);
    }

    #[test]
    fn bodies_rest_on_the_ground_plane() {
        let mut world = TestbedWorld::new();
        world.create_body(
            SubjectId(1),
            &sphere(0.5).with_position(Vec3::new(0.0, 0.6, 0.0)),
        );
        for _ in 0..240 {
            world.step(1.0 / 60.0, &mut |_| {});
        }
        let (position, _) = world.body_pose(SubjectId(1)).unwrap();
        assert!((position.y - 0.5).abs() < 1e-3);
    }

    #[test]
    fn contacts_begin_and_end() {
        let mut world = TestbedWorld::new();
        world.create_body(SubjectId(1), &sphere(1.0).with_position(Vec3::ZERO));
        world.create_body(
            SubjectId(2),
            &sphere(1.0)
                .with_position(Vec3::new(1.5, 0.0, 0.0))
                .with_kind(BodyKind::Kinematic),
        );
        // Keep them from falling: zero gravity isolates the overlap test.
        world.set_gravity(Vec3::ZERO);

        let mut events = Vec::new();
        world.step(1.0 / 60.0, &mut |e| events.push(e));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phase, ContactPhase::Started);
        assert!(events[0].penetration > 0.0);

        // Still overlapping: no repeat event.
        events.clear();
        world.step(1.0 / 60.0, &mut |e| events.push(e));
        assert!(events.is_empty());

        world.set_transform(SubjectId(2), Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY);
        world.step(1.0 / 60.0, &mut |e| events.push(e));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phase, ContactPhase::Ended);
    }

    #[test]
    fn raycast_finds_nearest_sphere() {
        let mut world = TestbedWorld::new();
        world.create_body(
            SubjectId(1),
            &sphere(1.0)
                .with_position(Vec3::new(0.0, 0.0, -5.0))
                .with_kind(BodyKind::Static),
        );
        world.create_body(
            SubjectId(2),
            &sphere(1.0)
                .with_position(Vec3::new(0.0, 0.0, -8.0))
                .with_kind(BodyKind::Static),
        );

        let hit = world.cast_ray(Vec3::ZERO, Vec3::NEG_Z, 10.0).unwrap();
        assert_eq!(hit.subject, SubjectId(1));
        assert!((hit.distance - 4.0).abs() < 1e-4);
        assert!(hit.normal.abs_diff_eq(Vec3::Z, 1e-4));
    }

    #[test]
    fn raycast_hits_cuboid_face() {
        let mut world = TestbedWorld::new();
        world.create_body(
            SubjectId(1),
            &BodyDesc::new(ColliderShape::Cuboid {
                half_extents: Vec3::ONE,
            })
            .with_position(Vec3::new(0.0, 0.0, -4.0))
            .with_kind(BodyKind::Static),
        );

        let hit = world.cast_ray(Vec3::ZERO, Vec3::NEG_Z, 10.0).unwrap();
        assert!((hit.distance - 3.0).abs() < 1e-4);
        assert!(hit.normal.abs_diff_eq(Vec3::Z, 1e-4));
    }
}
