//! Shared memory backing: the mapped region and the per-link arena that
//! carves it into channel bands.

pub mod arena;
pub mod backend;

pub use arena::{Band, ChannelKind, RegionArena, ARENA_MAGIC, LAYOUT_VERSION, MAX_CHANNELS};
pub use backend::{create_shared_memory, SharedMemoryBackend};
