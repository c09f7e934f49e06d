//! Command records, main thread -> physics worker.

use glam::{Quat, Vec3};

use super::{get_f32, get_quat, get_vec3, put_f32, put_quat, put_vec3, RayQuery};
use crate::channel::ring::Record;
use crate::subject::SubjectId;

/// Words per command slot. Sized for the largest variant (CreateBody)
/// with headroom; unused words stay zero.
pub const COMMAND_SLOT_WORDS: usize = 24;

const TAG_CREATE_BODY: u32 = 1;
const TAG_DESTROY_BODY: u32 = 2;
const TAG_MOVE_PLAYER: u32 = 3;
const TAG_SET_TRANSFORM: u32 = 4;
const TAG_SET_GRAVITY: u32 = 5;
const TAG_WEAPON_RAYCAST: u32 = 6;
const TAG_INTERACTION_RAYCAST: u32 = 7;

const SHAPE_SPHERE: u32 = 0;
const SHAPE_CAPSULE: u32 = 1;
const SHAPE_CUBOID: u32 = 2;

const FLAG_CONTROLLER: u32 = 1;
const FLAG_VELOCITY: u32 = 2;

/// Collider shape for a created body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColliderShape {
    Sphere { radius: f32 },
    Capsule { radius: f32, half_height: f32 },
    Cuboid { half_extents: Vec3 },
}

impl ColliderShape {
    fn encode(&self, words: &mut [u32]) {
        match *self {
            ColliderShape::Sphere { radius } => {
                words[2] = SHAPE_SPHERE;
                put_f32(words, 3, radius);
            }
            ColliderShape::Capsule {
                radius,
                half_height,
            } => {
                words[2] = SHAPE_CAPSULE;
                put_f32(words, 3, radius);
                put_f32(words, 4, half_height);
            }
            ColliderShape::Cuboid { half_extents } => {
                words[2] = SHAPE_CUBOID;
                put_vec3(words, 3, half_extents);
            }
        }
    }

    fn decode(words: &[u32]) -> Option<Self> {
        match words[2] {
            SHAPE_SPHERE => Some(ColliderShape::Sphere {
                radius: get_f32(words, 3),
            }),
            SHAPE_CAPSULE => Some(ColliderShape::Capsule {
                radius: get_f32(words, 3),
                half_height: get_f32(words, 4),
            }),
            SHAPE_CUBOID => Some(ColliderShape::Cuboid {
                half_extents: get_vec3(words, 3),
            }),
            _ => None,
        }
    }

    /// A conservative bounding radius, used by probe raycasts.
    pub fn bounding_radius(&self) -> f32 {
        match *self {
            ColliderShape::Sphere { radius } => radius,
            ColliderShape::Capsule {
                radius,
                half_height,
            } => radius + half_height,
            ColliderShape::Cuboid { half_extents } => half_extents.length(),
        }
    }
}

/// How the simulation integrates a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BodyKind {
    Static = 0,
    Dynamic = 1,
    Kinematic = 2,
    /// Dynamic body driven by the character controller; eligible for
    /// controller transition events.
    Character = 3,
}

impl BodyKind {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(BodyKind::Static),
            1 => Some(BodyKind::Dynamic),
            2 => Some(BodyKind::Kinematic),
            3 => Some(BodyKind::Character),
            _ => None,
        }
    }
}

/// Character controller tuning carried by a create command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerTuning {
    /// Steepest walkable slope, degrees.
    pub max_slope_deg: f32,
    /// Largest vertical step the controller climbs implicitly.
    pub step_height: f32,
    /// Downward probe distance used for ground and slope detection.
    pub ground_snap: f32,
    /// Fraction of ground acceleration available while airborne.
    pub air_control: f32,
}

impl Default for ControllerTuning {
    fn default() -> Self {
        Self {
            max_slope_deg: 45.0,
            step_height: 0.35,
            ground_snap: 0.2,
            air_control: 0.3,
        }
    }
}

/// Everything needed to create one body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyDesc {
    pub shape: ColliderShape,
    pub position: Vec3,
    pub orientation: Quat,
    pub kind: BodyKind,
    pub controller: Option<ControllerTuning>,
    pub velocity: Option<Vec3>,
}

impl BodyDesc {
    /// A dynamic body with identity orientation at the origin.
    pub fn new(shape: ColliderShape) -> Self {
        Self {
            shape,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            kind: BodyKind::Dynamic,
            controller: None,
            velocity: None,
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_kind(mut self, kind: BodyKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_controller(mut self, tuning: ControllerTuning) -> Self {
        self.kind = BodyKind::Character;
        self.controller = Some(tuning);
        self
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = Some(velocity);
        self
    }
}

/// One decoded command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BodyCommand {
    CreateBody {
        subject: SubjectId,
        body: BodyDesc,
    },
    DestroyBody {
        subject: SubjectId,
    },
    MovePlayer {
        subject: SubjectId,
        displacement: Vec3,
    },
    SetTransform {
        subject: SubjectId,
        position: Vec3,
        orientation: Quat,
    },
    SetGravity {
        gravity: Vec3,
    },
    WeaponRaycast {
        source: SubjectId,
        ray: RayQuery,
    },
    InteractionRaycast {
        source: SubjectId,
        ray: RayQuery,
    },
}

impl BodyCommand {
    fn subject_word(&self) -> u32 {
        match *self {
            BodyCommand::CreateBody { subject, .. }
            | BodyCommand::DestroyBody { subject }
            | BodyCommand::MovePlayer { subject, .. }
            | BodyCommand::SetTransform { subject, .. } => subject.raw(),
            BodyCommand::WeaponRaycast { source, .. }
            | BodyCommand::InteractionRaycast { source, .. } => source.raw(),
            BodyCommand::SetGravity { .. } => 0,
        }
    }
}

fn encode_ray(words: &mut [u32], ray: &RayQuery) {
    put_vec3(words, 2, ray.origin);
    put_vec3(words, 5, ray.direction);
    put_f32(words, 8, ray.max_distance);
}

fn decode_ray(words: &[u32]) -> RayQuery {
    RayQuery {
        origin: get_vec3(words, 2),
        direction: get_vec3(words, 5),
        max_distance: get_f32(words, 8),
    }
}

impl Record for BodyCommand {
    const SLOT_WORDS: usize = COMMAND_SLOT_WORDS;

    fn encode(&self, out: &mut [u32]) {
        out[1] = self.subject_word();
        match self {
            BodyCommand::CreateBody { body, .. } => {
                out[0] = TAG_CREATE_BODY;
                body.shape.encode(out);
                put_vec3(out, 6, body.position);
                put_quat(out, 9, body.orientation);
                out[13] = body.kind as u32;
                let mut flags = 0;
                if let Some(tuning) = &body.controller {
                    flags |= FLAG_CONTROLLER;
                    put_f32(out, 15, tuning.max_slope_deg);
                    put_f32(out, 16, tuning.step_height);
                    put_f32(out, 17, tuning.ground_snap);
                    put_f32(out, 18, tuning.air_control);
                }
                if let Some(velocity) = body.velocity {
                    flags |= FLAG_VELOCITY;
                    put_vec3(out, 19, velocity);
                }
                out[14] = flags;
            }
            BodyCommand::DestroyBody { .. } => {
                out[0] = TAG_DESTROY_BODY;
            }
            BodyCommand::MovePlayer { displacement, .. } => {
                out[0] = TAG_MOVE_PLAYER;
                put_vec3(out, 2, *displacement);
            }
            BodyCommand::SetTransform {
                position,
                orientation,
                ..
            } => {
                out[0] = TAG_SET_TRANSFORM;
                put_vec3(out, 2, *position);
                put_quat(out, 5, *orientation);
            }
            BodyCommand::SetGravity { gravity } => {
                out[0] = TAG_SET_GRAVITY;
                put_vec3(out, 2, *gravity);
            }
            BodyCommand::WeaponRaycast { ray, .. } => {
                out[0] = TAG_WEAPON_RAYCAST;
                encode_ray(out, ray);
            }
            BodyCommand::InteractionRaycast { ray, .. } => {
                out[0] = TAG_INTERACTION_RAYCAST;
                encode_ray(out, ray);
            }
        }
    }

    fn decode(words: &[u32]) -> Option<Self> {
        let subject = SubjectId(words[1]);
        match words[0] {
            TAG_CREATE_BODY => {
                let shape = ColliderShape::decode(words)?;
                let flags = words[14];
                Some(BodyCommand::CreateBody {
                    subject,
                    body: BodyDesc {
                        shape,
                        position: get_vec3(words, 6),
                        orientation: get_quat(words, 9),
                        kind: BodyKind::from_u32(words[13])?,
                        controller: (flags & FLAG_CONTROLLER != 0).then(|| ControllerTuning {
                            max_slope_deg: get_f32(words, 15),
                            step_height: get_f32(words, 16),
                            ground_snap: get_f32(words, 17),
                            air_control: get_f32(words, 18),
                        }),
                        velocity: (flags & FLAG_VELOCITY != 0).then(|| get_vec3(words, 19)),
                    },
                })
            }
            TAG_DESTROY_BODY => Some(BodyCommand::DestroyBody { subject }),
            TAG_MOVE_PLAYER => Some(BodyCommand::MovePlayer {
                subject,
                displacement: get_vec3(words, 2),
            }),
            TAG_SET_TRANSFORM => Some(BodyCommand::SetTransform {
                subject,
                position: get_vec3(words, 2),
                orientation: get_quat(words, 5),
            }),
            TAG_SET_GRAVITY => Some(BodyCommand::SetGravity {
                gravity: get_vec3(words, 2),
            }),
            TAG_WEAPON_RAYCAST => Some(BodyCommand::WeaponRaycast {
                source: subject,
                ray: decode_ray(words),
            }),
            TAG_INTERACTION_RAYCAST => Some(BodyCommand::InteractionRaycast {
                source: subject,
                ray: decode_ray(words),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(command: BodyCommand) -> BodyCommand {
        let mut words = [0u32; COMMAND_SLOT_WORDS];
        command.encode(&mut words);
        BodyCommand::decode(&words).expect("decode failed")
    }

    #[test]
    fn create_body_round_trip_is_bit_exact() {
        let command = BodyCommand::CreateBody {
            subject: SubjectId(42),
            body: BodyDesc::new(ColliderShape::Capsule {
                radius: 0.4,
                half_height: 0.9,
            })
            .with_position(Vec3::new(1.5, -2.25, 3.0))
            .with_controller(ControllerTuning::default())
            .with_velocity(Vec3::new(0.0, -9.81, 0.1)),
        };
        assert_eq!(round_trip(command), command);
    }

    #[test]
    fn raycast_round_trip_keeps_source() {
        let command = BodyCommand::WeaponRaycast {
            source: SubjectId(7),
            ray: RayQuery {
                origin: Vec3::ZERO,
                direction: Vec3::NEG_Z,
                max_distance: 10.0,
            },
        };
        assert_eq!(round_trip(command), command);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut words = [0u32; COMMAND_SLOT_WORDS];
        words[0] = 0xDEAD;
        assert!(BodyCommand::decode(&words).is_none());
    }
}
