//! Character-controller transition detection.
//!
//! Runs once per tick per controlled body, comparing the engine's current
//! character state against what the previous tick saw and emitting one
//! event per detected transition. Emission is edge-triggered throughout:
//! a held wall slide or a long ceiling scrape produces one event at onset,
//! not one per tick.

use glam::Vec3;

use crate::engine::{CharacterState, PhysicsEngine};
use crate::protocol::{ControllerEvent, ControllerTransition};
use crate::subject::SubjectId;

/// Step heights outside this open interval are ignored: below it is slope
/// noise, above it the controller cannot have climbed implicitly.
const STEP_MIN: f32 = 0.05;
const STEP_MAX: f32 = 0.5;

/// Horizontal speed below which no wall probe is cast.
const MIN_WALL_SPEED: f32 = 0.1;

/// Extra probe length beyond the character radius for wall/ceiling rays.
const PROBE_SKIN: f32 = 0.1;

/// Per-body cache of the previous tick, owned by the worker context.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ControllerMemory {
    prev_position: Vec3,
    grounded: bool,
    sliding: bool,
    wall: bool,
    ceiling: bool,
}

impl ControllerMemory {
    pub(crate) fn new(position: Vec3) -> Self {
        Self {
            prev_position: position,
            // Characters start "grounded" so one spawned in the air emits
            // Airborne on its first scan.
            grounded: true,
            sliding: false,
            wall: false,
            ceiling: false,
        }
    }
}

/// Evaluate all transition rules for one character this tick.
pub(crate) fn scan<E: PhysicsEngine + ?Sized>(
    engine: &E,
    subject: SubjectId,
    state: &CharacterState,
    memory: &mut ControllerMemory,
    emit: &mut dyn FnMut(ControllerEvent),
) {
    let position = state.position;
    let velocity = state.velocity;

    // Ground state, edge-triggered on the grounded flag flip.
    if state.grounded != memory.grounded {
        emit(ControllerEvent {
            kind: if state.grounded {
                ControllerTransition::Grounded
            } else {
                ControllerTransition::Airborne
            },
            subject,
            context: position,
            value: velocity.y,
        });
    }

    // Wall contact: horizontal-velocity probe, only while airborne and
    // actually moving.
    let horizontal = Vec3::new(velocity.x, 0.0, velocity.z);
    let mut wall = false;
    if !state.grounded && horizontal.length() > MIN_WALL_SPEED {
        if let Some(direction) = horizontal.try_normalize() {
            if let Some(hit) = engine.cast_ray(position, direction, state.radius + PROBE_SKIN) {
                wall = true;
                if !memory.wall {
                    emit(ControllerEvent {
                        kind: ControllerTransition::WallContact,
                        subject,
                        context: hit.normal,
                        value: horizontal.length(),
                    });
                }
            }
        }
    }
    memory.wall = wall;

    // Step climbed: grounded both ticks with a vertical delta in the
    // step window.
    if state.grounded && memory.grounded {
        let rise = position.y - memory.prev_position.y;
        if rise > STEP_MIN && rise < STEP_MAX {
            emit(ControllerEvent {
                kind: ControllerTransition::StepClimbed,
                subject,
                context: position,
                value: rise,
            });
        }
    }

    // Ceiling: upward probe only while ascending.
    let mut ceiling = false;
    if velocity.y > 0.0 {
        if let Some(hit) = engine.cast_ray(position, Vec3::Y, state.radius + PROBE_SKIN) {
            ceiling = true;
            if !memory.ceiling {
                emit(ControllerEvent {
                    kind: ControllerTransition::CeilingHit,
                    subject,
                    context: hit.point,
                    value: velocity.y,
                });
            }
        }
    }
    memory.ceiling = ceiling;

    // Slide state: slope angle from a downward probe against the walkable
    // limit, edge-triggered in both directions.
    let mut sliding = false;
    let mut slope_context = Vec3::Y;
    let mut slope_angle = 0.0;
    if let Some(hit) = engine.cast_ray(
        position,
        Vec3::NEG_Y,
        state.radius + state.tuning.ground_snap,
    ) {
        slope_angle = hit.normal.y.clamp(-1.0, 1.0).acos().to_degrees();
        slope_context = hit.normal;
        sliding = slope_angle > state.tuning.max_slope_deg;
    }
    if sliding != memory.sliding {
        emit(ControllerEvent {
            kind: if sliding {
                ControllerTransition::SlideStart
            } else {
                ControllerTransition::SlideStop
            },
            subject,
            context: slope_context,
            value: slope_angle,
        });
    }
    memory.sliding = sliding;

    memory.prev_position = position;
    memory.grounded = state.grounded;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RaycastHit;
    use crate::protocol::{BodyDesc, BodyRecord, ContactEvent, ControllerTuning};
    use glam::Quat;

    /// Scripted engine: fixed character state plus canned ray answers per
    /// direction.
    struct Scripted {
        state: CharacterState,
        up_hit: Option<RaycastHit>,
        down_hit: Option<RaycastHit>,
        side_hit: Option<RaycastHit>,
    }

    impl Scripted {
        fn new() -> Self {
            Self {
                state: CharacterState {
                    position: Vec3::new(0.0, 1.0, 0.0),
                    velocity: Vec3::ZERO,
                    grounded: true,
                    radius: 0.4,
                    tuning: ControllerTuning::default(),
                },
                up_hit: None,
                down_hit: Some(flat_ground()),
                side_hit: None,
            }
        }
    }

    fn flat_ground() -> RaycastHit {
        RaycastHit {
            subject: SubjectId(99),
            distance: 0.5,
            point: Vec3::ZERO,
            normal: Vec3::Y,
        }
    }

    impl PhysicsEngine for Scripted {
        fn create_body(&mut self, _: SubjectId, _: &BodyDesc) -> bool {
            false
        }
        fn destroy_body(&mut self, _: SubjectId) -> bool {
            false
        }
        fn set_transform(&mut self, _: SubjectId, _: Vec3, _: Quat) -> bool {
            false
        }
        fn move_character(&mut self, _: SubjectId, _: Vec3) -> bool {
            false
        }
        fn set_gravity(&mut self, _: Vec3) {}
        fn step(&mut self, _: f32, _: &mut dyn FnMut(ContactEvent)) {}

        fn cast_ray(&self, _: Vec3, direction: Vec3, _: f32) -> Option<RaycastHit> {
            if direction.y > 0.5 {
                self.up_hit
            } else if direction.y < -0.5 {
                self.down_hit
            } else {
                self.side_hit
            }
        }

        fn character(&self, _: SubjectId) -> Option<CharacterState> {
            Some(self.state)
        }
        fn each_body(&self, _: &mut dyn FnMut(BodyRecord)) {}
        fn body_count(&self) -> usize {
            1
        }
    }

    fn run(engine: &Scripted, memory: &mut ControllerMemory) -> Vec<ControllerEvent> {
        let mut events = Vec::new();
        scan(engine, SubjectId(1), &engine.state, memory, &mut |e| {
            events.push(e)
        });
        events
    }

    fn settle(engine: &Scripted) -> ControllerMemory {
        // One scan from a matching baseline leaves the memory in steady state.
        let mut memory = ControllerMemory::new(engine.state.position);
        memory.grounded = engine.state.grounded;
        let _ = run(engine, &mut memory);
        memory
    }

    #[test]
    fn grounded_flip_is_edge_triggered() {
        let mut engine = Scripted::new();
        let mut memory = settle(&engine);

        engine.state.grounded = false;
        engine.state.velocity = Vec3::new(0.0, -2.0, 0.0);
        let events = run(&engine, &mut memory);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ControllerTransition::Airborne);
        assert_eq!(events[0].value, -2.0);

        // No repeat while state holds.
        assert!(run(&engine, &mut memory).is_empty());

        engine.state.grounded = true;
        engine.state.velocity = Vec3::ZERO;
        let events = run(&engine, &mut memory);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ControllerTransition::Grounded);
    }

    #[test]
    fn wall_contact_requires_airborne_motion() {
        let mut engine = Scripted::new();
        engine.side_hit = Some(RaycastHit {
            subject: SubjectId(50),
            distance: 0.3,
            point: Vec3::new(0.4, 1.0, 0.0),
            normal: Vec3::NEG_X,
        });
        let mut memory = settle(&engine);

        // Grounded: probe never fires.
        engine.state.velocity = Vec3::new(3.0, 0.0, 0.0);
        assert!(run(&engine, &mut memory).is_empty());

        // Airborne and moving: one event at onset, silent afterwards.
        engine.state.grounded = false;
        let events = run(&engine, &mut memory);
        assert!(events
            .iter()
            .any(|e| e.kind == ControllerTransition::WallContact && e.context == Vec3::NEG_X));
        assert!(run(&engine, &mut memory).is_empty());
    }

    #[test]
    fn step_climb_window_is_open_interval() {
        let mut engine = Scripted::new();
        let mut memory = settle(&engine);

        // Rise within (0.05, 0.5): event with the delta as value.
        engine.state.position.y += 0.3;
        let events = run(&engine, &mut memory);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ControllerTransition::StepClimbed);
        assert!((events[0].value - 0.3).abs() < 1e-5);

        // Tiny rise: slope noise, ignored.
        engine.state.position.y += 0.01;
        assert!(run(&engine, &mut memory).is_empty());

        // Huge rise: not a step.
        engine.state.position.y += 1.0;
        assert!(run(&engine, &mut memory).is_empty());
    }

    #[test]
    fn ceiling_hit_only_while_ascending() {
        let mut engine = Scripted::new();
        engine.up_hit = Some(RaycastHit {
            subject: SubjectId(60),
            distance: 0.45,
            point: Vec3::new(0.0, 1.45, 0.0),
            normal: Vec3::NEG_Y,
        });
        let mut memory = settle(&engine);

        // Not ascending: nothing.
        assert!(run(&engine, &mut memory).is_empty());

        engine.state.grounded = false;
        engine.state.velocity = Vec3::new(0.0, 4.0, 0.0);
        let events = run(&engine, &mut memory);
        assert!(events
            .iter()
            .any(|e| e.kind == ControllerTransition::CeilingHit && e.value == 4.0));
    }

    #[test]
    fn slide_edges_on_slope_threshold() {
        let mut engine = Scripted::new();
        let mut memory = settle(&engine);

        // 60 degree slope normal, above the default 45 degree limit.
        let steep = Vec3::new(60f32.to_radians().sin(), 60f32.to_radians().cos(), 0.0);
        engine.down_hit = Some(RaycastHit {
            normal: steep,
            ..flat_ground()
        });
        let events = run(&engine, &mut memory);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ControllerTransition::SlideStart);
        assert!((events[0].value - 60.0).abs() < 0.1);

        // Holding the slope: no repeat.
        assert!(run(&engine, &mut memory).is_empty());

        // Back to flat: SlideStop.
        engine.down_hit = Some(flat_ground());
        let events = run(&engine, &mut memory);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ControllerTransition::SlideStop);
    }
}
