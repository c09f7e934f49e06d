//! Wire records crossing the thread boundary.
//!
//! Every channel slot is an array of 32-bit words; float fields travel as
//! bit patterns (`f32::to_bits`) so a slot remains a single integer view.
//! Records decode exactly once, at the channel boundary, into the enums in
//! [`command`] and [`event`]; gameplay code never inspects raw tags.

pub mod command;
pub mod event;
pub mod settings;
pub mod snapshot;

pub use command::{BodyCommand, BodyDesc, BodyKind, ColliderShape, ControllerTuning};
pub use event::{ContactEvent, ContactPhase, ControllerEvent, ControllerTransition};
pub use settings::{settings_channel, EnvState, SettingsConsumer, SettingsHandle};
pub use snapshot::{BodyRecord, SnapshotReader, SnapshotWriter};

use glam::{Quat, Vec3};

use crate::subject::SubjectId;

/// A raycast request: origin, direction, and maximum range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayQuery {
    pub origin: Vec3,
    pub direction: Vec3,
    pub max_distance: f32,
}

/// A raycast hit as answered through a query slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub subject: SubjectId,
    pub distance: f32,
    pub point: Vec3,
}

// Word codec helpers shared by the record impls. Callers guarantee the
// slice is long enough; slots are fixed-size and zeroed before encode.

pub(crate) fn put_f32(words: &mut [u32], at: usize, value: f32) {
    words[at] = value.to_bits();
}

pub(crate) fn get_f32(words: &[u32], at: usize) -> f32 {
    f32::from_bits(words[at])
}

pub(crate) fn put_vec3(words: &mut [u32], at: usize, value: Vec3) {
    words[at] = value.x.to_bits();
    words[at + 1] = value.y.to_bits();
    words[at + 2] = value.z.to_bits();
}

pub(crate) fn get_vec3(words: &[u32], at: usize) -> Vec3 {
    Vec3::new(
        f32::from_bits(words[at]),
        f32::from_bits(words[at + 1]),
        f32::from_bits(words[at + 2]),
    )
}

pub(crate) fn put_quat(words: &mut [u32], at: usize, value: Quat) {
    words[at] = value.x.to_bits();
    words[at + 1] = value.y.to_bits();
    words[at + 2] = value.z.to_bits();
    words[at + 3] = value.w.to_bits();
}

pub(crate) fn get_quat(words: &[u32], at: usize) -> Quat {
    Quat::from_xyzw(
        f32::from_bits(words[at]),
        f32::from_bits(words[at + 1]),
        f32::from_bits(words[at + 2]),
        f32::from_bits(words[at + 3]),
    )
}
