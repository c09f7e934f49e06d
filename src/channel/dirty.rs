//! Dirty-flag coalescing channel.
//!
//! A bitmask gate in front of a fixed bank of plain words. The writer
//! stores field words, then ORs the field's bit into `flags` (Release);
//! that OR is the publish point. The reader exchanges `flags` with zero
//! (Acquire), claiming and clearing every pending bit in one indivisible
//! step, then reads only the fields whose bit it claimed. Repeated writes
//! to one field between syncs coalesce into a single application.
//!
//! Field meanings, offsets, and clamping live in
//! [`crate::protocol::settings`]; this module only implements the gate.

use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use crate::channel::layout::{bind_prefix, header_words, DirtyHeader, DIRTY_MAGIC};
use crate::error::{LinkError, LinkResult};
use crate::region::Band;

#[derive(Clone)]
struct DirtyShared {
    _band: Band,
    header: NonNull<DirtyHeader>,
    bank: NonNull<u32>,
    bank_words: usize,
}

// SAFETY: endpoints move to their owning thread once; the backing mapping
// outlives them via the Arc inside `Band`.
unsafe impl Send for DirtyShared {}

fn bind_dirty(band: &Band, channel: &'static str, bank_words: usize) -> LinkResult<DirtyShared> {
    let hw = header_words::<DirtyHeader>();
    if band.words() < hw + bank_words {
        return Err(LinkError::Memory(format!(
            "{channel}: band of {} words cannot hold header + {bank_words} field words",
            band.words()
        )));
    }

    let header = band.base().cast::<DirtyHeader>();
    // SAFETY: band base is 128-byte aligned and covers the header.
    let h = unsafe { header.as_ref() };
    bind_prefix(channel, DIRTY_MAGIC, &h.magic, &h.version, || {})?;

    // SAFETY: hw words past base stays inside the band (checked above).
    let bank = unsafe { NonNull::new_unchecked(band.base().as_ptr().add(hw)) };

    Ok(DirtyShared {
        _band: band.clone(),
        header,
        bank,
        bank_words,
    })
}

/// Bind both endpoints of a dirty-flag channel over `band`.
pub fn dirty_channel(
    band: &Band,
    channel: &'static str,
    bank_words: usize,
) -> LinkResult<(DirtyProducer, DirtyConsumer)> {
    let shared = bind_dirty(band, channel, bank_words)?;
    Ok((
        DirtyProducer {
            shared: shared.clone(),
            channel,
            poisoned: false,
        },
        DirtyConsumer {
            shared,
            channel,
            poisoned: false,
        },
    ))
}

/// Writer half. Exactly one thread holds this, so plain stores into the
/// field bank are safe; the atomic OR publishes them.
pub struct DirtyProducer {
    shared: DirtyShared,
    channel: &'static str,
    poisoned: bool,
}

impl DirtyProducer {
    /// Store one field word. Not visible to the consumer until the
    /// corresponding bit is published.
    pub fn write_word(&mut self, index: usize, value: u32) {
        if self.poisoned {
            return;
        }
        if index >= self.shared.bank_words {
            self.poison(index);
            return;
        }
        // SAFETY: index bounds-checked; this producer is the only writer
        // of the bank, and readers only look after claiming the bit.
        unsafe {
            self.shared.bank.as_ptr().add(index).write(value);
        }
    }

    /// Store an `f32` field word as its bit pattern.
    pub fn write_f32(&mut self, index: usize, value: f32) {
        self.write_word(index, value.to_bits());
    }

    /// Publish: OR `bits` into the flag word. Release makes every field
    /// store above visible to a consumer that claims these bits.
    pub fn publish(&mut self, bits: u32) {
        if self.poisoned {
            return;
        }
        // SAFETY: header pointer is valid for the band's lifetime.
        unsafe { self.shared.header.as_ref() }
            .flags
            .fetch_or(bits, Ordering::Release);
    }

    fn poison(&mut self, index: usize) {
        if !self.poisoned {
            log::error!(
                "{} channel disabled: field word {index} out of bounds (bank is {} words)",
                self.channel,
                self.shared.bank_words
            );
            self.poisoned = true;
        }
    }
}

/// Reader half.
pub struct DirtyConsumer {
    shared: DirtyShared,
    channel: &'static str,
    poisoned: bool,
}

impl DirtyConsumer {
    /// Claim and clear all pending bits in one step. Returns the claimed
    /// mask (0 when nothing changed). Acquire orders the writer's field
    /// stores before any subsequent `read_word`.
    pub fn claim(&mut self) -> u32 {
        if self.poisoned {
            return 0;
        }
        // SAFETY: header pointer is valid for the band's lifetime.
        unsafe { self.shared.header.as_ref() }
            .flags
            .swap(0, Ordering::Acquire)
    }

    /// Read one field word. Only meaningful for fields whose bit was just
    /// claimed.
    pub fn read_word(&mut self, index: usize) -> u32 {
        if self.poisoned {
            return 0;
        }
        if index >= self.shared.bank_words {
            if !self.poisoned {
                log::error!(
                    "{} channel disabled: field word {index} out of bounds (bank is {} words)",
                    self.channel,
                    self.shared.bank_words
                );
                self.poisoned = true;
            }
            return 0;
        }
        // SAFETY: index bounds-checked; claim() provided the Acquire edge.
        unsafe { self.shared.bank.as_ptr().add(index).read() }
    }

    /// Read an `f32` field word from its bit pattern.
    pub fn read_f32(&mut self, index: usize) -> f32 {
        f32::from_bits(self.read_word(index))
    }
}
