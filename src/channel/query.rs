//! Single-slot request/response channel for one-shot raycast queries.
//!
//! Only the latest answer matters (a new query supersedes any in-flight
//! one), so one slot plus a generation counter replaces a queue. The
//! responder writes the payload with plain stores and bumps `generation`
//! with Release; the poller treats the payload as fresh only when the
//! generation changed since its cached value, and confirms the `source_id`
//! matches the request it is waiting for. The correlation check is
//! best-effort: the channel itself cannot detect a stale answer beyond it.

use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use glam::Vec3;

use crate::channel::layout::{bind_prefix, header_words, QueryHeader, QUERY_MAGIC};
use crate::error::{LinkError, LinkResult};
use crate::protocol::RayHit;
use crate::region::Band;
use crate::subject::SubjectId;

/// A decoded answer from a query slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayAnswer {
    /// Correlation id of the request this answers.
    pub source: SubjectId,
    /// `None` when the ray hit nothing within range.
    pub hit: Option<RayHit>,
}

#[derive(Clone)]
struct QueryShared {
    _band: Band,
    header: NonNull<QueryHeader>,
}

// SAFETY: endpoints move to their owning thread once; the backing mapping
// outlives them via the Arc inside `Band`.
unsafe impl Send for QueryShared {}

fn bind_query(band: &Band, channel: &'static str) -> LinkResult<QueryShared> {
    if band.words() < header_words::<QueryHeader>() {
        return Err(LinkError::Memory(format!(
            "{channel}: band of {} words cannot hold the query slot",
            band.words()
        )));
    }

    let header = band.base().cast::<QueryHeader>();
    // SAFETY: band base is 128-byte aligned and covers the header.
    let h = unsafe { header.as_ref() };
    bind_prefix(channel, QUERY_MAGIC, &h.magic, &h.version, || {})?;

    Ok(QueryShared {
        _band: band.clone(),
        header,
    })
}

/// Bind both endpoints of a query slot channel over `band`.
pub fn query_channel(band: &Band, channel: &'static str) -> LinkResult<(QueryResponder, QueryPoller)> {
    let shared = bind_query(band, channel)?;
    Ok((
        QueryResponder {
            shared: shared.clone(),
        },
        QueryPoller {
            shared,
            last_generation: 0,
        },
    ))
}

/// Physics-side endpoint: publishes one answer per processed request.
pub struct QueryResponder {
    shared: QueryShared,
}

impl QueryResponder {
    /// Publish an answer. Payload stores happen before the Release
    /// generation bump, which is the publish point.
    pub fn respond(&mut self, source: SubjectId, hit: Option<RayHit>) {
        let header = self.shared.header.as_ptr();
        // SAFETY: header is valid for the band's lifetime; this responder
        // is the only writer of the payload words, and the poller reads
        // them only after observing the generation bump below.
        unsafe {
            std::ptr::addr_of_mut!((*header).source_id).write(source.raw());
            match hit {
                Some(hit) => {
                    std::ptr::addr_of_mut!((*header).hit_id).write(hit.subject.raw());
                    std::ptr::addr_of_mut!((*header).distance_bits).write(hit.distance.to_bits());
                    std::ptr::addr_of_mut!((*header).point_bits).write([
                        hit.point.x.to_bits(),
                        hit.point.y.to_bits(),
                        hit.point.z.to_bits(),
                    ]);
                }
                None => {
                    std::ptr::addr_of_mut!((*header).hit_id).write(0);
                    std::ptr::addr_of_mut!((*header).distance_bits).write(0);
                    std::ptr::addr_of_mut!((*header).point_bits).write([0; 3]);
                }
            }
            (*header).generation.fetch_add(1, Ordering::Release);
        }
    }
}

/// Main-thread endpoint: polls for a fresh answer once per frame.
pub struct QueryPoller {
    shared: QueryShared,
    last_generation: u32,
}

impl QueryPoller {
    /// Return the answer if one arrived since the last poll.
    ///
    /// A `Some` only means "newer than what we saw"; whether it answers
    /// the request the caller cares about is decided by `source`.
    pub fn poll(&mut self) -> Option<RayAnswer> {
        let header = self.shared.header.as_ptr();
        // SAFETY: header is valid for the band's lifetime; Acquire on the
        // generation orders the responder's payload stores before our reads.
        unsafe {
            let generation = (*header).generation.load(Ordering::Acquire);
            if generation == self.last_generation {
                return None;
            }
            self.last_generation = generation;

            let source = SubjectId(std::ptr::addr_of!((*header).source_id).read());
            let hit_id = std::ptr::addr_of!((*header).hit_id).read();
            let hit = if hit_id != 0 {
                let bits = std::ptr::addr_of!((*header).point_bits).read();
                Some(RayHit {
                    subject: SubjectId(hit_id),
                    distance: f32::from_bits(std::ptr::addr_of!((*header).distance_bits).read()),
                    point: Vec3::new(
                        f32::from_bits(bits[0]),
                        f32::from_bits(bits[1]),
                        f32::from_bits(bits[2]),
                    ),
                })
            } else {
                None
            };

            Some(RayAnswer { source, hit })
        }
    }

    /// Last generation this poller observed.
    pub fn last_generation(&self) -> u32 {
        self.last_generation
    }

    /// Current generation on the channel (staleness probe without consuming).
    pub fn channel_generation(&self) -> u32 {
        // SAFETY: header is valid for the band's lifetime.
        unsafe { (*self.shared.header.as_ptr()).generation.load(Ordering::Acquire) }
    }
}
