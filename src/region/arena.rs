//! Region arena: one shared mapping per link, carved into channel bands.
//!
//! The arena owns the backing region and a global header holding the link
//! magic, the layout version, and a directory of carved bands. Carving
//! happens only during startup, under a mutex; after that the arena is
//! immutable and every access goes through the per-channel protocols.

use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{LinkError, LinkResult};
use crate::region::backend::{create_shared_memory, SharedMemoryBackend};

/// "PLNK": identifies a region initialized by this crate.
pub const ARENA_MAGIC: u32 = 0x504C_4E4B;

/// Bumped whenever any shared byte layout changes. A mismatch is a
/// build-version error, never recoverable at runtime.
pub const LAYOUT_VERSION: u32 = 1;

/// Directory capacity. A link uses seven channels; one spare slot.
pub const MAX_CHANNELS: usize = 8;

/// Bands start on 128-byte boundaries so cache-padded headers keep their
/// alignment and adjacent bands never share a prefetch pair.
const BAND_ALIGN: usize = 128;

/// Channel kinds recorded in the arena directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ChannelKind {
    Commands = 1,
    ContactEvents = 2,
    ControllerEvents = 3,
    Snapshot = 4,
    WeaponResults = 5,
    InteractionResults = 6,
    Settings = 7,
}

/// One directory entry. Written once at carve time, before the worker
/// thread exists, so plain fields suffice.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ChannelDirEntry {
    /// `ChannelKind` as u32; 0 if the entry is unused.
    pub kind: u32,
    /// Byte offset of the band from the start of the region.
    pub offset: u32,
    /// Band length in 32-bit words.
    pub words: u32,
    pub reserved: u32,
}

/// Global header at the start of the region.
#[repr(C)]
pub struct ArenaHeader {
    /// Written last during init with Release ordering.
    pub magic: AtomicU32,
    pub version: AtomicU32,
    pub channel_count: AtomicU32,
    pub reserved: u32,
    pub entries: [ChannelDirEntry; MAX_CHANNELS],
}

/// Owns the backing region and carves channel bands out of it.
pub struct RegionArena {
    shm: Arc<dyn SharedMemoryBackend>,
    header: NonNull<ArenaHeader>,
    /// Next free byte offset; locked only during startup carve-out.
    carve: Mutex<usize>,
}

// SAFETY: the raw pointer targets the owned mapping; the carve mutex
// serializes the only mutation (directory writes), and header counters are
// atomic.
unsafe impl Send for RegionArena {}
unsafe impl Sync for RegionArena {}

impl RegionArena {
    /// Map a fresh region of `size` bytes and initialize the global header.
    pub fn new(size: usize) -> LinkResult<Self> {
        let header_size = std::mem::size_of::<ArenaHeader>();
        if size < header_size {
            return Err(LinkError::Memory(format!(
                "Region of {size} bytes cannot fit the {header_size}-byte arena header"
            )));
        }

        let shm: Arc<dyn SharedMemoryBackend> = Arc::from(create_shared_memory(size)?);

        let header_ptr = shm.as_ptr() as *mut ArenaHeader;
        if !(header_ptr as usize).is_multiple_of(BAND_ALIGN) {
            return Err(LinkError::Memory(
                "Region base not 128-byte aligned".to_string(),
            ));
        }

        // SAFETY: header_ptr is non-null (mapping succeeded), aligned
        // (checked above) and the region is large enough (checked above).
        // The mapping is zero-filled, so only the non-zero fields need
        // stores; magic goes last so a concurrent binder never sees a
        // half-initialized header.
        unsafe {
            (*header_ptr).version.store(LAYOUT_VERSION, Ordering::Relaxed);
            (*header_ptr).channel_count.store(0, Ordering::Relaxed);
            (*header_ptr).magic.store(ARENA_MAGIC, Ordering::Release);
        }

        Ok(Self {
            shm,
            // SAFETY: verified non-null above.
            header: unsafe { NonNull::new_unchecked(header_ptr) },
            carve: Mutex::new(align_up(header_size, BAND_ALIGN)),
        })
    }

    /// Carve a `words`-word band for `kind` out of the region.
    ///
    /// Fails if the directory is full or the region has no room left.
    pub fn carve(&self, kind: ChannelKind, words: usize) -> LinkResult<Band> {
        let bytes = words
            .checked_mul(4)
            .ok_or_else(|| LinkError::Memory("Band size overflow".to_string()))?;

        let mut next = self.carve.lock();
        let offset = align_up(*next, BAND_ALIGN);
        let end = offset
            .checked_add(bytes)
            .ok_or_else(|| LinkError::Memory("Band offset overflow".to_string()))?;
        if end > self.shm.size() {
            return Err(LinkError::Memory(format!(
                "Region exhausted: {kind:?} needs {bytes} bytes at offset {offset}, region is {} bytes",
                self.shm.size()
            )));
        }

        // SAFETY: the arena header lives for as long as `self`; the mutex
        // guard serializes directory mutation.
        let header = self.header.as_ptr();
        let index = unsafe { (*header).channel_count.load(Ordering::Relaxed) } as usize;
        if index >= MAX_CHANNELS {
            return Err(LinkError::Memory(format!(
                "Channel directory full ({MAX_CHANNELS} entries)"
            )));
        }

        // SAFETY: index < MAX_CHANNELS; entry writes happen before the
        // count store below and only under the carve lock.
        unsafe {
            std::ptr::addr_of_mut!((*header).entries[index]).write(ChannelDirEntry {
                kind: kind as u32,
                offset: offset as u32,
                words: words as u32,
                reserved: 0,
            });
            (*header).channel_count.store(index as u32 + 1, Ordering::Release);
        }

        *next = end;

        // SAFETY: offset + bytes <= region size (checked above); offset is
        // 128-byte aligned, so in particular u32-aligned.
        let base = unsafe { NonNull::new_unchecked(self.shm.as_ptr().add(offset) as *mut u32) };

        Ok(Band {
            _shm: Arc::clone(&self.shm),
            base,
            words,
        })
    }

    /// Total bytes handed out so far, including alignment padding.
    pub fn used_bytes(&self) -> usize {
        *self.carve.lock()
    }

    /// Bytes still available for carving.
    pub fn available_bytes(&self) -> usize {
        self.shm.size().saturating_sub(self.used_bytes())
    }

    /// Number of carved channels.
    pub fn channel_count(&self) -> u32 {
        // SAFETY: header outlives self.
        unsafe { self.header.as_ref() }
            .channel_count
            .load(Ordering::Acquire)
    }
}

impl fmt::Debug for RegionArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionArena")
            .field("size", &self.shm.size())
            .field("used", &self.used_bytes())
            .field("channels", &self.channel_count())
            .finish()
    }
}

/// A carved channel band: a raw word range plus a handle keeping the
/// backing mapping alive. Cloned once per endpoint at startup.
#[derive(Clone)]
pub struct Band {
    _shm: Arc<dyn SharedMemoryBackend>,
    base: NonNull<u32>,
    words: usize,
}

// SAFETY: the band points into the shared mapping, which lives as long as
// the Arc; concurrent access is governed by the channel protocols.
unsafe impl Send for Band {}
unsafe impl Sync for Band {}

impl Band {
    /// First word of the band.
    pub(crate) fn base(&self) -> NonNull<u32> {
        self.base
    }

    /// Band length in 32-bit words.
    pub fn words(&self) -> usize {
        self.words
    }
}

impl fmt::Debug for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Band")
            .field("base", &format_args!("{:p}", self.base.as_ptr()))
            .field("words", &self.words)
            .finish()
    }
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carves_aligned_disjoint_bands() {
        let arena = RegionArena::new(64 * 1024).unwrap();
        let a = arena.carve(ChannelKind::Commands, 100).unwrap();
        let b = arena.carve(ChannelKind::Snapshot, 200).unwrap();

        assert!(((a.base().as_ptr() as usize) % 128) == 0);
        assert!(((b.base().as_ptr() as usize) % 128) == 0);

        let a_end = a.base().as_ptr() as usize + a.words() * 4;
        assert!(b.base().as_ptr() as usize >= a_end);
        assert_eq!(arena.channel_count(), 2);
    }

    #[test]
    fn exhaustion_is_reported() {
        let arena = RegionArena::new(4096).unwrap();
        assert!(arena.carve(ChannelKind::Commands, 1 << 20).is_err());
    }

    #[test]
    fn directory_capacity_enforced() {
        let arena = RegionArena::new(1 << 20).unwrap();
        for _ in 0..MAX_CHANNELS {
            arena.carve(ChannelKind::Settings, 16).unwrap();
        }
        assert!(arena.carve(ChannelKind::Settings, 16).is_err());
    }
}
