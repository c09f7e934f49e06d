//! Triple-buffered publish channel for the high-frequency state snapshot.
//!
//! Three rotating slots: the producer always writes the slot *after* the
//! currently published one and flips `write_index` only when the slot is
//! complete. A reader that loads `write_index` once is therefore never
//! looking at the slot the very next publish will target; that is the
//! reason for three slots instead of two.

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use crate::channel::layout::{bind_prefix, header_words, TripleHeader, TRIPLE_MAGIC};
use crate::channel::ring::Record;
use crate::error::{LinkError, LinkResult};
use crate::region::Band;

#[derive(Clone)]
struct TripleShared {
    _band: Band,
    header: NonNull<TripleHeader>,
    slots: NonNull<u32>,
    max_records: u32,
    record_words: u32,
    /// Words per slot: 1 count word + `max_records * record_words`.
    slot_words: usize,
}

// SAFETY: endpoints move to their owning thread once; the backing mapping
// outlives them via the Arc inside `Band`.
unsafe impl Send for TripleShared {}

fn bind_triple(
    band: &Band,
    channel: &'static str,
    max_records: u32,
    record_words: u32,
) -> LinkResult<TripleShared> {
    if max_records == 0 || record_words == 0 {
        return Err(LinkError::Config(format!(
            "{channel}: max_records and record_words must be non-zero"
        )));
    }

    let hw = header_words::<TripleHeader>();
    let slot_words = 1 + max_records as usize * record_words as usize;
    let needed = hw + 3 * slot_words;
    if band.words() < needed {
        return Err(LinkError::Memory(format!(
            "{channel}: band of {} words cannot hold header + 3 slots of {slot_words} words",
            band.words()
        )));
    }

    let header = band.base().cast::<TripleHeader>();
    // SAFETY: band base is 128-byte aligned and covers the header.
    let h = unsafe { header.as_ref() };

    let fresh = bind_prefix(channel, TRIPLE_MAGIC, &h.magic, &h.version, || {
        h.max_records.store(max_records, Ordering::Relaxed);
        h.record_words.store(record_words, Ordering::Relaxed);
    })?;

    if !fresh {
        let found_max = h.max_records.load(Ordering::Acquire);
        let found_words = h.record_words.load(Ordering::Acquire);
        if found_max != max_records || found_words != record_words {
            return Err(LinkError::Memory(format!(
                "{channel}: existing snapshot channel is {found_max}x{found_words} words, \
                 requested {max_records}x{record_words}"
            )));
        }
    }

    // SAFETY: hw words past base stays inside the band (checked above).
    let slots = unsafe { NonNull::new_unchecked(band.base().as_ptr().add(hw)) };

    Ok(TripleShared {
        _band: band.clone(),
        header,
        slots,
        max_records,
        record_words,
        slot_words,
    })
}

/// Bind both endpoints of a triple-buffer channel over `band`.
pub fn triple_channel<R: Record>(
    band: &Band,
    channel: &'static str,
    max_records: u32,
) -> LinkResult<(TripleWriter<R>, TripleReader<R>)> {
    let shared = bind_triple(band, channel, max_records, R::SLOT_WORDS as u32)?;
    Ok((
        TripleWriter {
            shared: shared.clone(),
            _marker: PhantomData,
        },
        TripleReader {
            shared,
            last_generation: 0,
            _marker: PhantomData,
        },
    ))
}

/// Producer half: publishes complete record sets.
pub struct TripleWriter<R: Record> {
    shared: TripleShared,
    _marker: PhantomData<fn(&R)>,
}

impl<R: Record> TripleWriter<R> {
    /// Publish `records` as the newest snapshot.
    ///
    /// Writes the next slot in rotation, then flips `write_index` with
    /// Release and bumps the generation. Anything beyond the channel's
    /// record ceiling is silently truncated (a fixed, documented capacity,
    /// not a growth point); the `truncated` counter records that it
    /// happened. Returns the number of records written.
    pub fn publish(&mut self, records: &[R]) -> u32 {
        // SAFETY: header pointer is valid for the band's lifetime.
        let header = unsafe { self.shared.header.as_ref() };

        let current = header.write_index.load(Ordering::Relaxed);
        let next = (current + 1) % 3;

        let count = records.len().min(self.shared.max_records as usize);
        if count < records.len() {
            header.truncated.fetch_add(1, Ordering::Relaxed);
        }

        let rw = self.shared.record_words as usize;
        let slot_base = next as usize * self.shared.slot_words;

        // SAFETY: slot_base + slot_words <= 3 * slot_words, verified to fit
        // the band at bind time. This slot is not the published one and not
        // the one the previous publish targeted, so no reader is in it.
        unsafe {
            let slot = self.shared.slots.as_ptr().add(slot_base);
            slot.write(count as u32);
            for (i, record) in records.iter().take(count).enumerate() {
                let out = std::slice::from_raw_parts_mut(slot.add(1 + i * rw), rw);
                out.fill(0);
                record.encode(out);
            }
        }

        // Publish-after-write: the slot is complete before the flip.
        header.write_index.store(next, Ordering::Release);
        header.generation.fetch_add(1, Ordering::Release);
        count as u32
    }
}

/// Consumer half: reads the latest published snapshot.
pub struct TripleReader<R: Record> {
    shared: TripleShared,
    last_generation: u32,
    _marker: PhantomData<fn(&R)>,
}

impl<R: Record> TripleReader<R> {
    /// Decode the newest snapshot into `out` if one has been published
    /// since the last call. Returns the snapshot's generation, or `None`
    /// when nothing new exists (in which case `out` is untouched).
    pub fn read_latest(&mut self, out: &mut Vec<R>) -> Option<u32> {
        // SAFETY: header pointer is valid for the band's lifetime.
        let header = unsafe { self.shared.header.as_ref() };

        let generation = header.generation.load(Ordering::Acquire);
        if generation == self.last_generation {
            return None;
        }

        // One load; a publish racing past us targets a different slot.
        let index = header.write_index.load(Ordering::Acquire) % 3;
        let rw = self.shared.record_words as usize;
        let slot_base = index as usize * self.shared.slot_words;

        out.clear();
        // SAFETY: slot_base bounds follow from bind-time sizing; the
        // published slot is only rewritten two publishes from now, and the
        // Acquire load of write_index ordered the slot contents before us.
        unsafe {
            let slot = self.shared.slots.as_ptr().add(slot_base);
            let count = (slot.read() as usize).min(self.shared.max_records as usize);
            out.reserve(count);
            for i in 0..count {
                let words = std::slice::from_raw_parts(slot.add(1 + i * rw), rw);
                if let Some(record) = R::decode(words) {
                    out.push(record);
                }
            }
        }

        self.last_generation = generation;
        Some(generation)
    }

    /// Generation of the newest published snapshot (staleness probe).
    pub fn latest_generation(&self) -> u32 {
        // SAFETY: header pointer is valid for the band's lifetime.
        unsafe { self.shared.header.as_ref() }
            .generation
            .load(Ordering::Acquire)
    }
}
