//! Snapshot body records, physics worker -> main thread.

use glam::{Quat, Vec3};

use super::{get_f32, get_quat, get_vec3, put_f32, put_quat, put_vec3};
use crate::channel::ring::Record;
use crate::channel::triple::{TripleReader, TripleWriter};
use crate::subject::SubjectId;

/// Words per snapshot body record.
pub const BODY_RECORD_WORDS: usize = 9;

/// Pose of one live body as of a completed simulation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyRecord {
    pub subject: SubjectId,
    pub position: Vec3,
    pub orientation: Quat,
    /// Auxiliary scalar: vertical speed, for interpolation and grounding
    /// heuristics on the consumer side.
    pub vertical_speed: f32,
}

impl Record for BodyRecord {
    const SLOT_WORDS: usize = BODY_RECORD_WORDS;

    fn encode(&self, out: &mut [u32]) {
        out[0] = self.subject.raw();
        put_vec3(out, 1, self.position);
        put_quat(out, 4, self.orientation);
        put_f32(out, 8, self.vertical_speed);
    }

    fn decode(words: &[u32]) -> Option<Self> {
        Some(BodyRecord {
            subject: SubjectId(words[0]),
            position: get_vec3(words, 1),
            orientation: get_quat(words, 4),
            vertical_speed: get_f32(words, 8),
        })
    }
}

/// Physics-side snapshot endpoint.
pub type SnapshotWriter = TripleWriter<BodyRecord>;

/// Main-thread snapshot endpoint.
pub type SnapshotReader = TripleReader<BodyRecord>;
