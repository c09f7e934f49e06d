//! Shared channel header layouts.
//!
//! Every channel band starts with a `#[repr(C)]` header whose fields are
//! mutated exclusively through atomics; payload words follow the header
//! and are plain memory governed by the write-then-publish /
//! observe-then-read protocol of each channel. Cursors owned by different
//! threads sit on their own cache lines (`CachePadded`), so a producer
//! bumping `head` never invalidates the consumer's line holding `tail`.
//!
//! Binding discipline: a freshly mapped band is all zeroes. The first bind
//! stores every channel-specific field, then the magic last with Release
//! ordering. A non-zero magic that is not the expected constant, or a
//! version that is not [`LAYOUT_VERSION`], is a schema mismatch and fatal
//! for that channel.

use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_utils::CachePadded;

use crate::error::{LinkError, LinkResult};
pub use crate::region::LAYOUT_VERSION;

/// "RING": SPSC ring buffer channels (commands, events).
pub const RING_MAGIC: u32 = 0x5249_4E47;
/// "TRIP": triple-buffer snapshot channel.
pub const TRIPLE_MAGIC: u32 = 0x5452_4950;
/// "QRYS": single-slot raycast result channels.
pub const QUERY_MAGIC: u32 = 0x5152_5953;
/// "DIRT": dirty-flag coalescing settings channel.
pub const DIRTY_MAGIC: u32 = 0x4449_5254;

/// Header of an SPSC ring channel. Slots follow immediately.
#[repr(C)]
pub struct RingHeader {
    pub magic: AtomicU32,
    pub version: AtomicU32,
    /// Slot count, power of two, fixed after bind.
    pub capacity: AtomicU32,
    /// Words per slot, fixed after bind.
    pub slot_words: AtomicU32,
    /// Diagnostic only: bumped once per non-empty drain. Never consulted
    /// for emptiness or fullness; head/tail alone decide those.
    pub generation: AtomicU32,
    /// Diagnostic: records rejected because the ring was full.
    pub dropped: AtomicU32,
    /// Next write slot. Producer-owned; the Release store publishing it is
    /// the barrier that makes the slot contents visible.
    pub head: CachePadded<AtomicU32>,
    /// Next read slot. Consumer-owned.
    pub tail: CachePadded<AtomicU32>,
}

/// Header of the triple-buffer snapshot channel. Three slots follow, each
/// `1 + max_records * record_words` words (count word first).
#[repr(C)]
pub struct TripleHeader {
    pub magic: AtomicU32,
    pub version: AtomicU32,
    pub max_records: AtomicU32,
    pub record_words: AtomicU32,
    /// Bumped after each publish; readers use it for staleness only.
    pub generation: AtomicU32,
    /// Diagnostic: publishes that truncated the body list.
    pub truncated: AtomicU32,
    /// Slot index (0..3) of the newest complete snapshot. Producer-owned;
    /// stored with Release only after the slot is fully written.
    pub write_index: CachePadded<AtomicU32>,
}

/// Header (and entire band) of a single-slot query result channel.
///
/// The payload fields are plain words: the responder writes them before
/// the Release bump of `generation`, and the poller reads them only after
/// observing a new generation with Acquire.
#[repr(C)]
pub struct QueryHeader {
    pub magic: AtomicU32,
    pub version: AtomicU32,
    /// Correlation id copied from the request.
    pub source_id: u32,
    /// Hit subject id; 0 means no hit.
    pub hit_id: u32,
    /// f32 bits.
    pub distance_bits: u32,
    /// Hit point, f32 bits per component.
    pub point_bits: [u32; 3],
    /// Bumped by the responder on every answer.
    pub generation: CachePadded<AtomicU32>,
}

/// Header of the dirty-flag settings channel. The field bank follows.
#[repr(C)]
pub struct DirtyHeader {
    pub magic: AtomicU32,
    pub version: AtomicU32,
    /// Pending-field bitmask. `fetch_or` is the publish point, `swap(0)`
    /// the claim-and-clear consume point.
    pub flags: AtomicU32,
    pub reserved: u32,
}

/// Header size of `H` in 32-bit words.
pub(crate) const fn header_words<H>() -> usize {
    std::mem::size_of::<H>() / 4
}

/// Validate-or-initialize the magic/version prefix of a channel header.
///
/// `init` runs only for a fresh (zero-magic) band and must store every
/// channel-specific header field with Relaxed ordering; this function then
/// stores the magic last with Release. Returns `true` if the band was
/// freshly initialized.
pub(crate) fn bind_prefix(
    channel: &'static str,
    expected_magic: u32,
    magic: &AtomicU32,
    version: &AtomicU32,
    init: impl FnOnce(),
) -> LinkResult<bool> {
    match magic.load(Ordering::Acquire) {
        0 => {
            version.store(LAYOUT_VERSION, Ordering::Relaxed);
            init();
            magic.store(expected_magic, Ordering::Release);
            Ok(true)
        }
        found if found == expected_magic => {
            let found_version = version.load(Ordering::Acquire);
            if found_version != LAYOUT_VERSION {
                return Err(LinkError::SchemaMismatch {
                    channel,
                    expected: expected_magic,
                    expected_version: LAYOUT_VERSION,
                    found,
                    found_version,
                });
            }
            Ok(false)
        }
        found => Err(LinkError::SchemaMismatch {
            channel,
            expected: expected_magic,
            expected_version: LAYOUT_VERSION,
            found,
            found_version: version.load(Ordering::Acquire),
        }),
    }
}
