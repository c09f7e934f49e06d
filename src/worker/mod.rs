//! The physics-side driver: per-step pipeline, fixed-step clock, and the
//! worker thread entry point.
//!
//! Per fixed step, in order: settings sync, full command drain (a burst of
//! creates/destroys lands atomically within one step), engine step with
//! the contact sink, controller transition scan, snapshot publish, then
//! one aggregated overflow log for the tick. No channel operation blocks;
//! the only wait state is the step clock's accumulator.

mod transitions;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::channel::{QueryResponder, RingConsumer, RingProducer};
use crate::config::LinkConfig;
use crate::engine::PhysicsEngine;
use crate::error::LinkResult;
use crate::protocol::{
    BodyCommand, BodyKind, BodyRecord, ContactEvent, ControllerEvent, EnvState, RayHit, RayQuery,
    SettingsConsumer, SnapshotWriter,
};
use crate::subject::SubjectId;

use transitions::ControllerMemory;

/// The physics thread's half of every channel, handed over once at spawn.
pub struct WorkerEndpoints {
    pub commands: RingConsumer<BodyCommand>,
    pub contacts: RingProducer<ContactEvent>,
    pub controller_events: RingProducer<ControllerEvent>,
    pub snapshot: SnapshotWriter,
    pub weapon_results: QueryResponder,
    pub interaction_results: QueryResponder,
    pub settings: SettingsConsumer,
}

/// What one step did, for diagnostics and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    /// Commands drained and applied this step.
    pub commands: usize,
    /// Bodies written into the published snapshot.
    pub bodies_published: u32,
    /// Contact events lost to a full ring this step.
    pub contacts_dropped: u32,
    /// Controller events lost to a full ring this step.
    pub controller_events_dropped: u32,
}

/// Explicit per-thread state of the physics worker. Owns the engine, the
/// physics-side endpoints, and the transient caches; nothing here is
/// shared or ambient.
pub struct WorkerContext<E: PhysicsEngine> {
    engine: E,
    endpoints: WorkerEndpoints,
    env: EnvState,
    controllers: HashMap<SubjectId, ControllerMemory>,
    command_scratch: Vec<BodyCommand>,
    snapshot_scratch: Vec<BodyRecord>,
    tick: u64,
}

impl<E: PhysicsEngine> WorkerContext<E> {
    pub fn new(endpoints: WorkerEndpoints, engine: E) -> Self {
        Self {
            engine,
            endpoints,
            env: EnvState::default(),
            controllers: HashMap::new(),
            command_scratch: Vec::new(),
            snapshot_scratch: Vec::new(),
            tick: 0,
        }
    }

    /// Current environment state as applied by settings syncs.
    pub fn env(&self) -> &EnvState {
        &self.env
    }

    /// Completed steps so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run one fixed simulation step of `dt` seconds.
    pub fn step(&mut self, dt: f32) -> StepReport {
        let mut report = StepReport::default();

        self.endpoints.settings.sync(&mut self.env);
        let dt = dt * self.env.time_scale;

        // Drain the entire backlog before advancing the simulation, so a
        // burst of commands is never applied across two steps.
        let mut commands = std::mem::take(&mut self.command_scratch);
        commands.clear();
        self.endpoints
            .commands
            .drain(|command| commands.push(command));
        report.commands = commands.len();
        for command in commands.drain(..) {
            self.apply_command(command);
        }
        self.command_scratch = commands;

        {
            let contacts = &mut self.endpoints.contacts;
            let dropped = &mut report.contacts_dropped;
            self.engine.step(dt, &mut |event| {
                if contacts.try_enqueue(&event).is_err() {
                    *dropped += 1;
                }
            });
        }

        {
            let events = &mut self.endpoints.controller_events;
            let dropped = &mut report.controller_events_dropped;
            let engine = &self.engine;
            for (&subject, memory) in self.controllers.iter_mut() {
                if let Some(state) = engine.character(subject) {
                    transitions::scan(engine, subject, &state, memory, &mut |event| {
                        if events.try_enqueue(&event).is_err() {
                            *dropped += 1;
                        }
                    });
                }
            }
        }

        let records = &mut self.snapshot_scratch;
        records.clear();
        records.reserve(self.engine.body_count());
        self.engine.each_body(&mut |record| records.push(record));
        report.bodies_published = self.endpoints.snapshot.publish(records);

        // One line per overflowing tick, never one per dropped event.
        if report.contacts_dropped > 0 {
            log::warn!(
                "tick {}: contact ring full, dropped {} events",
                self.tick,
                report.contacts_dropped
            );
        }
        if report.controller_events_dropped > 0 {
            log::warn!(
                "tick {}: controller ring full, dropped {} events",
                self.tick,
                report.controller_events_dropped
            );
        }

        self.tick += 1;
        report
    }

    fn apply_command(&mut self, command: BodyCommand) {
        match command {
            BodyCommand::CreateBody { subject, body } => {
                if self.engine.create_body(subject, &body) {
                    if body.kind == BodyKind::Character {
                        self.controllers
                            .insert(subject, ControllerMemory::new(body.position));
                    }
                } else {
                    log::debug!("create ignored, subject {subject} already exists");
                }
            }
            BodyCommand::DestroyBody { subject } => {
                if !self.engine.destroy_body(subject) {
                    log::debug!("destroy ignored, unknown subject {subject}");
                }
                self.controllers.remove(&subject);
            }
            BodyCommand::MovePlayer {
                subject,
                displacement,
            } => {
                if !self.engine.move_character(subject, displacement) {
                    log::debug!("move ignored, subject {subject} is not a character");
                }
            }
            BodyCommand::SetTransform {
                subject,
                position,
                orientation,
            } => {
                if !self.engine.set_transform(subject, position, orientation) {
                    log::debug!("set_transform ignored, unknown subject {subject}");
                }
            }
            BodyCommand::SetGravity { gravity } => {
                self.engine.set_gravity(gravity);
            }
            BodyCommand::WeaponRaycast { source, ray } => {
                let hit = self.cast(&ray);
                self.endpoints.weapon_results.respond(source, hit);
            }
            BodyCommand::InteractionRaycast { source, ray } => {
                let hit = self.cast(&ray);
                self.endpoints.interaction_results.respond(source, hit);
            }
        }
    }

    /// Raycasts are answered against the world as of the last completed
    /// step (requests drain before the engine advances).
    fn cast(&self, ray: &RayQuery) -> Option<RayHit> {
        let direction = ray.direction.try_normalize()?;
        self.engine
            .cast_ray(ray.origin, direction, ray.max_distance)
            .map(|hit| RayHit {
                subject: hit.subject,
                distance: hit.distance,
                point: hit.point,
            })
    }
}

/// Fixed-step accumulator decoupling wall-clock scheduling from step size.
pub struct StepClock {
    step: Duration,
    accumulator: Duration,
    last: Instant,
    /// Steps granted per poll at most; beyond this the backlog is shed so
    /// a long stall cannot trigger a step spiral.
    max_catchup: u32,
}

impl StepClock {
    pub fn new(step_hz: u32) -> Self {
        Self {
            step: Duration::from_secs_f64(1.0 / step_hz.max(1) as f64),
            accumulator: Duration::ZERO,
            last: Instant::now(),
            max_catchup: 5,
        }
    }

    /// Seconds per step.
    pub fn step_seconds(&self) -> f32 {
        self.step.as_secs_f32()
    }

    /// Number of fixed steps due since the last poll.
    pub fn due_steps(&mut self) -> u32 {
        let now = Instant::now();
        self.accumulator += now - self.last;
        self.last = now;

        let mut due = 0;
        while self.accumulator >= self.step && due < self.max_catchup {
            self.accumulator -= self.step;
            due += 1;
        }
        if due == self.max_catchup && self.accumulator >= self.step {
            log::debug!(
                "step clock shedding {:?} of backlog",
                self.accumulator
            );
            self.accumulator = Duration::ZERO;
        }
        due
    }

    /// Time until the next step is due.
    pub fn idle_time(&self) -> Duration {
        self.step.saturating_sub(self.accumulator)
    }
}

/// Worker lifecycle as reported through the status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum WorkerStatus {
    Booting = 0,
    Ready = 1,
    Failed = 2,
    Stopped = 3,
}

impl WorkerStatus {
    fn from_u32(value: u32) -> Self {
        match value {
            1 => WorkerStatus::Ready,
            2 => WorkerStatus::Failed,
            3 => WorkerStatus::Stopped,
            _ => WorkerStatus::Booting,
        }
    }
}

/// Handle to a spawned worker thread.
pub struct WorkerHandle {
    thread: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    status: Arc<AtomicU32>,
}

impl WorkerHandle {
    /// Current lifecycle status. Initialization failures surface here,
    /// distinct from the steady-state channels.
    pub fn status(&self) -> WorkerStatus {
        WorkerStatus::from_u32(self.status.load(Ordering::Acquire))
    }

    /// Block until the worker leaves `Booting` (bounded by `timeout`).
    pub fn wait_ready(&self, timeout: Duration) -> WorkerStatus {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.status();
            if status != WorkerStatus::Booting || Instant::now() >= deadline {
                return status;
            }
            thread::sleep(Duration::from_micros(200));
        }
    }

    /// Signal shutdown and join the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn the physics worker thread.
///
/// `init` runs on the worker thread; if it fails, the error is logged
/// there and the handle's status becomes [`WorkerStatus::Failed`]. There
/// is no cross-thread error channel.
pub fn spawn_worker<E, F>(
    endpoints: WorkerEndpoints,
    config: &LinkConfig,
    init: F,
) -> LinkResult<WorkerHandle>
where
    E: PhysicsEngine + Send + 'static,
    F: FnOnce() -> LinkResult<E> + Send + 'static,
{
    let shutdown = Arc::new(AtomicBool::new(false));
    let status = Arc::new(AtomicU32::new(WorkerStatus::Booting as u32));
    let step_hz = config.step_hz;

    let thread = {
        let shutdown = Arc::clone(&shutdown);
        let status = Arc::clone(&status);
        thread::Builder::new()
            .name("physlink-worker".to_string())
            .spawn(move || {
                let engine = match init() {
                    Ok(engine) => engine,
                    Err(error) => {
                        log::error!("physics worker initialization failed: {error}");
                        status.store(WorkerStatus::Failed as u32, Ordering::Release);
                        return;
                    }
                };

                let mut context = WorkerContext::new(endpoints, engine);
                let mut clock = StepClock::new(step_hz);
                let dt = clock.step_seconds();
                status.store(WorkerStatus::Ready as u32, Ordering::Release);

                while !shutdown.load(Ordering::Acquire) {
                    for _ in 0..clock.due_steps() {
                        context.step(dt);
                    }
                    thread::sleep(clock.idle_time().min(Duration::from_millis(2)));
                }
                status.store(WorkerStatus::Stopped as u32, Ordering::Release);
            })?
    };

    Ok(WorkerHandle {
        thread: Some(thread),
        shutdown,
        status,
    })
}
