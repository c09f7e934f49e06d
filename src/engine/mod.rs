//! The physics engine seam.
//!
//! The link does not compute contacts or resolve collisions itself; it
//! drives an engine behind [`PhysicsEngine`]: creating and destroying
//! bodies from drained commands, stepping it once per fixed tick, casting
//! its rays, and iterating its bodies for the snapshot. [`TestbedWorld`]
//! is a small built-in implementation for tests and demos; real games
//! plug in their own.

pub mod testbed;

pub use testbed::TestbedWorld;

use glam::{Quat, Vec3};

use crate::protocol::{BodyDesc, BodyRecord, ContactEvent, ControllerTuning};
use crate::subject::SubjectId;

/// An engine-side ray hit. Unlike the wire [`crate::protocol::RayHit`],
/// this carries the surface normal, which the controller transition scan
/// needs for wall and slope tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub subject: SubjectId,
    pub distance: f32,
    pub point: Vec3,
    pub normal: Vec3,
}

/// Controller-relevant state of one character body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharacterState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub grounded: bool,
    /// Probe radius for wall/ceiling/ground ray tests.
    pub radius: f32,
    pub tuning: ControllerTuning,
}

/// The external simulation the worker drives.
///
/// All methods are called from the worker thread only. Subject ids are
/// opaque to the engine; it keeps its own table.
pub trait PhysicsEngine {
    /// Create a body. Returns `false` (and does nothing) if the id is
    /// already taken.
    fn create_body(&mut self, subject: SubjectId, body: &BodyDesc) -> bool;

    /// Destroy a body. Returns `false` if the id was unknown.
    fn destroy_body(&mut self, subject: SubjectId) -> bool;

    /// Teleport a body. Returns `false` if the id was unknown.
    fn set_transform(&mut self, subject: SubjectId, position: Vec3, orientation: Quat) -> bool;

    /// Displace a character body by a movement vector for this tick.
    /// Returns `false` if the id was unknown or not a character.
    fn move_character(&mut self, subject: SubjectId, displacement: Vec3) -> bool;

    /// Replace the global gravity vector.
    fn set_gravity(&mut self, gravity: Vec3);

    /// Advance the simulation by `dt` seconds, reporting every contact
    /// transition through `contacts`.
    fn step(&mut self, dt: f32, contacts: &mut dyn FnMut(ContactEvent));

    /// Nearest hit along a ray, if any. `direction` is unit length.
    fn cast_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RaycastHit>;

    /// Controller state of a character body, `None` for other kinds.
    fn character(&self, subject: SubjectId) -> Option<CharacterState>;

    /// Visit every live body for snapshotting.
    fn each_body(&self, visit: &mut dyn FnMut(BodyRecord));

    /// Number of live bodies.
    fn body_count(&self) -> usize;
}
