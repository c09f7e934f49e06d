//! physlink: lock-free shared-memory channels between a fixed-step
//! physics worker thread and a game main thread.
//!
//! One [`link::allocate`] call carves a shared region into seven channels:
//! an SPSC command ring (main -> physics), a triple-buffered body snapshot
//! and two SPSC event rings (physics -> main), two single-slot raycast
//! result channels, and a dirty-flag coalescing channel for environment
//! settings. Neither thread ever blocks on the other: rings drop on
//! overflow, the triple buffer overwrites its oldest non-current slot, and
//! every cross-thread decision field goes through atomics under a strict
//! write-then-publish / observe-then-read discipline.

pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod frontend;
pub mod link;
pub mod protocol;
pub mod region;
pub mod subject;
pub mod worker;

pub use config::LinkConfig;
pub use error::{ChannelFull, LinkError, LinkResult};
pub use frontend::GameBridge;
pub use link::allocate;
pub use subject::{SubjectAllocator, SubjectId, SubjectTable};
pub use worker::{
    spawn_worker, StepClock, StepReport, WorkerContext, WorkerEndpoints, WorkerHandle,
    WorkerStatus,
};
