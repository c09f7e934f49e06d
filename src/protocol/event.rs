//! Event records, physics worker -> main thread.
//!
//! Two independent rings: collision contacts and character-controller
//! transitions. Both are lossy under sustained overload; the worker
//! counts drops and logs once per tick.

use glam::Vec3;

use super::{get_f32, get_vec3, put_f32, put_vec3};
use crate::channel::ring::Record;
use crate::subject::SubjectId;

/// Words per contact event slot.
pub const CONTACT_SLOT_WORDS: usize = 12;

/// Words per controller event slot.
pub const CONTROLLER_SLOT_WORDS: usize = 8;

/// What happened between two subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ContactPhase {
    Started = 1,
    Ended = 2,
    SensorEntered = 3,
    SensorExited = 4,
}

impl ContactPhase {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(ContactPhase::Started),
            2 => Some(ContactPhase::Ended),
            3 => Some(ContactPhase::SensorEntered),
            4 => Some(ContactPhase::SensorExited),
            _ => None,
        }
    }
}

/// One collision event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactEvent {
    pub phase: ContactPhase,
    pub a: SubjectId,
    pub b: SubjectId,
    pub point: Vec3,
    pub normal: Vec3,
    /// Impulse magnitude applied to resolve the contact.
    pub impulse: f32,
    /// Estimated penetration depth at detection time.
    pub penetration: f32,
}

impl Record for ContactEvent {
    const SLOT_WORDS: usize = CONTACT_SLOT_WORDS;

    fn encode(&self, out: &mut [u32]) {
        out[0] = self.phase as u32;
        out[1] = self.a.raw();
        out[2] = self.b.raw();
        put_vec3(out, 3, self.point);
        put_vec3(out, 6, self.normal);
        put_f32(out, 9, self.impulse);
        put_f32(out, 10, self.penetration);
    }

    fn decode(words: &[u32]) -> Option<Self> {
        Some(ContactEvent {
            phase: ContactPhase::from_u32(words[0])?,
            a: SubjectId(words[1]),
            b: SubjectId(words[2]),
            point: get_vec3(words, 3),
            normal: get_vec3(words, 6),
            impulse: get_f32(words, 9),
            penetration: get_f32(words, 10),
        })
    }
}

/// A character-controller state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ControllerTransition {
    /// Touched down. Value: vertical speed at impact.
    Grounded = 1,
    /// Left the ground. Value: vertical speed at departure.
    Airborne = 2,
    /// Ran into a wall while airborne. Context: wall normal. Value:
    /// horizontal speed at contact.
    WallContact = 3,
    /// Implicitly climbed a step while grounded. Value: step height.
    StepClimbed = 4,
    /// Hit a ceiling while ascending. Context: hit point. Value: upward
    /// speed at impact.
    CeilingHit = 5,
    /// Started sliding on a too-steep slope. Context: surface normal.
    /// Value: slope angle in degrees.
    SlideStart = 6,
    /// Stopped sliding. Value: slope angle in degrees.
    SlideStop = 7,
}

impl ControllerTransition {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(ControllerTransition::Grounded),
            2 => Some(ControllerTransition::Airborne),
            3 => Some(ControllerTransition::WallContact),
            4 => Some(ControllerTransition::StepClimbed),
            5 => Some(ControllerTransition::CeilingHit),
            6 => Some(ControllerTransition::SlideStart),
            7 => Some(ControllerTransition::SlideStop),
            _ => None,
        }
    }
}

/// One controller event. `context` and `value` are interpreted per
/// [`ControllerTransition`] variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerEvent {
    pub kind: ControllerTransition,
    pub subject: SubjectId,
    pub context: Vec3,
    pub value: f32,
}

impl Record for ControllerEvent {
    const SLOT_WORDS: usize = CONTROLLER_SLOT_WORDS;

    fn encode(&self, out: &mut [u32]) {
        out[0] = self.kind as u32;
        out[1] = self.subject.raw();
        put_vec3(out, 2, self.context);
        put_f32(out, 5, self.value);
    }

    fn decode(words: &[u32]) -> Option<Self> {
        Some(ControllerEvent {
            kind: ControllerTransition::from_u32(words[0])?,
            subject: SubjectId(words[1]),
            context: get_vec3(words, 2),
            value: get_f32(words, 5),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_round_trip_is_bit_exact() {
        let event = ContactEvent {
            phase: ContactPhase::Started,
            a: SubjectId(3),
            b: SubjectId(9),
            point: Vec3::new(0.25, 1.0, -4.5),
            normal: Vec3::Y,
            impulse: 12.75,
            penetration: 0.015,
        };
        let mut words = [0u32; CONTACT_SLOT_WORDS];
        event.encode(&mut words);
        assert_eq!(ContactEvent::decode(&words), Some(event));
    }

    #[test]
    fn controller_round_trip_is_bit_exact() {
        let event = ControllerEvent {
            kind: ControllerTransition::StepClimbed,
            subject: SubjectId(5),
            context: Vec3::new(1.0, 0.3, 2.0),
            value: 0.3,
        };
        let mut words = [0u32; CONTROLLER_SLOT_WORDS];
        event.encode(&mut words);
        assert_eq!(ControllerEvent::decode(&words), Some(event));
    }

    #[test]
    fn zero_tag_is_rejected() {
        let words = [0u32; CONTACT_SLOT_WORDS];
        assert!(ContactEvent::decode(&words).is_none());
    }
}
