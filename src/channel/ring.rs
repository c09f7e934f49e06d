//! Generic single-producer/single-consumer ring channel.
//!
//! Strictly SPSC: exactly one thread holds the [`RingProducer`] and exactly
//! one (different) thread holds the [`RingConsumer`] for a band's lifetime,
//! so plain atomic load/store on `head`/`tail` suffices, with no CAS anywhere.
//! A full ring drops the new record and tells the caller so
//! ([`ChannelFull`]); neither side ever blocks.

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use crate::channel::layout::{bind_prefix, header_words, RingHeader, RING_MAGIC};
use crate::error::{ChannelFull, LinkError, LinkResult};
use crate::region::Band;

/// Fixed-size wire record carried by a ring or snapshot slot.
///
/// Records are arrays of 32-bit words; float fields travel as
/// `f32::to_bits` words so a slot stays a single integer view.
pub trait Record: Sized {
    /// Words per slot, fixed for the channel's lifetime.
    const SLOT_WORDS: usize;

    /// Encode into a zeroed slice of exactly `SLOT_WORDS` words.
    fn encode(&self, out: &mut [u32]);

    /// Decode a slot. `None` on an unknown tag; the consumer skips the
    /// slot and counts the failure, it is not fatal.
    fn decode(words: &[u32]) -> Option<Self>;
}

/// Everything both endpoints need to address the band.
#[derive(Clone)]
struct RingShared {
    _band: Band,
    header: NonNull<RingHeader>,
    slots: NonNull<u32>,
    capacity: u32,
    mask: u32,
    slot_words: u32,
    slot_area_words: usize,
}

// SAFETY: endpoints move to their owning thread once; the band's backing
// mapping outlives them via the Arc inside `Band`.
unsafe impl Send for RingShared {}

fn bind_ring(
    band: &Band,
    channel: &'static str,
    capacity: u32,
    slot_words: u32,
) -> LinkResult<RingShared> {
    if capacity < 2 || !capacity.is_power_of_two() {
        return Err(LinkError::Config(format!(
            "{channel}: ring capacity must be a power of two >= 2, got {capacity}"
        )));
    }
    if slot_words == 0 {
        return Err(LinkError::Config(format!(
            "{channel}: slot_words must be non-zero"
        )));
    }

    let hw = header_words::<RingHeader>();
    let slot_area_words = capacity as usize * slot_words as usize;
    let needed = hw + slot_area_words;
    if band.words() < needed {
        return Err(LinkError::Memory(format!(
            "{channel}: band of {} words cannot hold header + {capacity}x{slot_words} slots ({needed} words)",
            band.words()
        )));
    }

    let header = band.base().cast::<RingHeader>();
    // SAFETY: band base is 128-byte aligned and the band covers the header
    // (checked above); all header access below is atomic.
    let h = unsafe { header.as_ref() };

    let fresh = bind_prefix(channel, RING_MAGIC, &h.magic, &h.version, || {
        h.capacity.store(capacity, Ordering::Relaxed);
        h.slot_words.store(slot_words, Ordering::Relaxed);
        // head/tail/generation/dropped are already zero in a fresh band.
    })?;

    if !fresh {
        let found_capacity = h.capacity.load(Ordering::Acquire);
        let found_slot_words = h.slot_words.load(Ordering::Acquire);
        if found_capacity != capacity || found_slot_words != slot_words {
            return Err(LinkError::Memory(format!(
                "{channel}: existing ring is {found_capacity}x{found_slot_words} words, \
                 requested {capacity}x{slot_words}"
            )));
        }
    }

    // SAFETY: hw words past base stays inside the band (checked above).
    let slots = unsafe { NonNull::new_unchecked(band.base().as_ptr().add(hw)) };

    Ok(RingShared {
        _band: band.clone(),
        header,
        slots,
        capacity,
        mask: capacity - 1,
        slot_words,
        slot_area_words,
    })
}

/// Bind both endpoints of a ring channel over `band`.
///
/// Called once at startup on the allocating thread; the producer and
/// consumer halves are then handed to their owning threads.
pub fn ring_channel<R: Record>(
    band: &Band,
    channel: &'static str,
    capacity: u32,
) -> LinkResult<(RingProducer<R>, RingConsumer<R>)> {
    let shared = bind_ring(band, channel, capacity, R::SLOT_WORDS as u32)?;
    Ok((
        RingProducer {
            shared: shared.clone(),
            channel,
            poisoned: false,
            _marker: PhantomData,
        },
        RingConsumer {
            shared,
            channel,
            poisoned: false,
            decode_failures: 0,
            _marker: PhantomData,
        },
    ))
}

/// Producer half of a ring channel.
pub struct RingProducer<R: Record> {
    shared: RingShared,
    channel: &'static str,
    poisoned: bool,
    _marker: PhantomData<fn(&R)>,
}

impl<R: Record> RingProducer<R> {
    /// Enqueue one record, or report that the ring is full.
    ///
    /// On `Err(ChannelFull)` nothing was written and no cursor moved; the
    /// record is simply lost and the caller decides whether to log, count,
    /// or retry on a later tick.
    pub fn try_enqueue(&mut self, record: &R) -> Result<(), ChannelFull> {
        if self.poisoned {
            return Err(ChannelFull);
        }
        // SAFETY: header pointer is valid for the band's lifetime.
        let header = unsafe { self.shared.header.as_ref() };

        let head = header.head.load(Ordering::Relaxed);
        let next = (head.wrapping_add(1)) & self.shared.mask;
        if next == header.tail.load(Ordering::Acquire) {
            header.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(ChannelFull);
        }

        let sw = self.shared.slot_words as usize;
        let offset = head as usize * sw;
        if head >= self.shared.capacity || offset + sw > self.shared.slot_area_words {
            self.poison(head);
            return Err(ChannelFull);
        }

        // SAFETY: offset bounds-checked above; the slot is exclusively
        // owned by this producer until the head store publishes it.
        let slot =
            unsafe { std::slice::from_raw_parts_mut(self.shared.slots.as_ptr().add(offset), sw) };
        slot.fill(0);
        record.encode(slot);

        // Publish barrier: slot contents must be visible before the new head.
        header.head.store(next, Ordering::Release);
        Ok(())
    }

    /// Records currently queued (approximate from the producer side).
    pub fn queued(&self) -> u32 {
        // SAFETY: header pointer is valid for the band's lifetime.
        let header = unsafe { self.shared.header.as_ref() };
        let head = header.head.load(Ordering::Relaxed);
        let tail = header.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) & self.shared.mask
    }

    /// Drain the diagnostic drop counter (records rejected since the last
    /// call). Lets the driving loop log overflow once per tick instead of
    /// once per record.
    pub fn take_dropped(&self) -> u32 {
        // SAFETY: header pointer is valid for the band's lifetime.
        unsafe { self.shared.header.as_ref() }
            .dropped
            .swap(0, Ordering::Relaxed)
    }

    fn poison(&mut self, head: u32) {
        if !self.poisoned {
            log::error!(
                "{} ring disabled: computed slot offset out of bounds (head {head}, capacity {})",
                self.channel,
                self.shared.capacity
            );
            self.poisoned = true;
        }
    }
}

/// Consumer half of a ring channel.
pub struct RingConsumer<R: Record> {
    shared: RingShared,
    channel: &'static str,
    poisoned: bool,
    decode_failures: u32,
    _marker: PhantomData<fn(&R)>,
}

impl<R: Record> RingConsumer<R> {
    /// Drain every record published so far, in FIFO order.
    ///
    /// Loads `head` once, visits each slot up to it, then stores the final
    /// `tail` and bumps the diagnostic generation. Bounded by the ring
    /// capacity; never blocks.
    pub fn drain(&mut self, mut visit: impl FnMut(R)) -> usize {
        if self.poisoned {
            return 0;
        }
        // SAFETY: header pointer is valid for the band's lifetime.
        let header = unsafe { self.shared.header.as_ref() };

        let head = header.head.load(Ordering::Acquire);
        let mut tail = header.tail.load(Ordering::Relaxed);
        if tail == head {
            return 0;
        }

        let sw = self.shared.slot_words as usize;
        let mut visited = 0usize;
        while tail != head {
            let offset = tail as usize * sw;
            if tail >= self.shared.capacity || offset + sw > self.shared.slot_area_words {
                if !self.poisoned {
                    log::error!(
                        "{} ring disabled: computed slot offset out of bounds (tail {tail}, capacity {})",
                        self.channel,
                        self.shared.capacity
                    );
                    self.poisoned = true;
                }
                break;
            }

            // SAFETY: offset bounds-checked above; the slot was published
            // by the Release head store we observed with Acquire, and the
            // producer will not touch it again until we advance tail.
            let slot =
                unsafe { std::slice::from_raw_parts(self.shared.slots.as_ptr().add(offset), sw) };
            match R::decode(slot) {
                Some(record) => visit(record),
                None => {
                    if self.decode_failures == 0 {
                        log::warn!(
                            "{} ring: unknown record tag {:#x}, slot skipped",
                            self.channel,
                            slot[0]
                        );
                    }
                    self.decode_failures += 1;
                }
            }

            tail = tail.wrapping_add(1) & self.shared.mask;
            visited += 1;
        }

        if visited > 0 {
            header.tail.store(tail, Ordering::Release);
            header.generation.fetch_add(1, Ordering::Relaxed);
        }
        visited
    }

    /// Whether any record is waiting.
    pub fn is_empty(&self) -> bool {
        // SAFETY: header pointer is valid for the band's lifetime.
        let header = unsafe { self.shared.header.as_ref() };
        header.tail.load(Ordering::Relaxed) == header.head.load(Ordering::Acquire)
    }

    /// Diagnostic generation: bumped once per non-empty drain.
    pub fn generation(&self) -> u32 {
        // SAFETY: header pointer is valid for the band's lifetime.
        unsafe { self.shared.header.as_ref() }
            .generation
            .load(Ordering::Relaxed)
    }

    /// Slots whose tag failed to decode (skipped, not fatal).
    pub fn decode_failures(&self) -> u32 {
        self.decode_failures
    }
}
