// Triple-buffer, query-slot, dirty-flag, and schema binding tests.

use glam::{Quat, Vec3, Vec4};
use physlink::channel::{query_channel, ring_channel, triple_channel};
use physlink::protocol::snapshot::BODY_RECORD_WORDS;
use physlink::protocol::{settings_channel, BodyCommand, BodyRecord, EnvState, RayHit};
use physlink::region::{Band, ChannelKind, RegionArena};
use physlink::{LinkError, SubjectId};
use std::thread;

fn make_band(kind: ChannelKind, words: usize) -> Band {
    let arena = RegionArena::new(words * 4 + 4096).expect("region allocation failed");
    arena.carve(kind, words).expect("carve failed")
}

fn snapshot_band(max_records: usize) -> Band {
    make_band(
        ChannelKind::Snapshot,
        3 * (1 + max_records * BODY_RECORD_WORDS) + 256,
    )
}

fn body(seed: u32) -> BodyRecord {
    BodyRecord {
        subject: SubjectId(seed),
        position: Vec3::new(seed as f32, seed as f32 * 2.0, seed as f32 * 3.0),
        orientation: Quat::IDENTITY,
        vertical_speed: -(seed as f32),
    }
}

#[test]
fn triple_reader_sees_only_fresh_snapshots() {
    let band = snapshot_band(16);
    let (mut writer, mut reader) = triple_channel::<BodyRecord>(&band, "snapshot", 16).unwrap();

    let mut out = Vec::new();

    // Nothing published yet.
    assert!(reader.read_latest(&mut out).is_none());

    writer.publish(&[body(1), body(2)]);
    let generation = reader.read_latest(&mut out).expect("fresh snapshot");
    assert_eq!(generation, 1);
    assert_eq!(out, vec![body(1), body(2)]);

    // Same snapshot again: stale, buffer untouched.
    assert!(reader.read_latest(&mut out).is_none());
    assert_eq!(out, vec![body(1), body(2)]);

    // Two publishes back to back: the reader skips straight to the latest.
    writer.publish(&[body(3)]);
    writer.publish(&[body(4), body(5), body(6)]);
    let generation = reader.read_latest(&mut out).expect("fresh snapshot");
    assert_eq!(generation, 3);
    assert_eq!(out, vec![body(4), body(5), body(6)]);
}

#[test]
fn triple_truncates_at_record_ceiling() {
    let band = snapshot_band(4);
    let (mut writer, mut reader) = triple_channel::<BodyRecord>(&band, "snapshot", 4).unwrap();

    let bodies: Vec<BodyRecord> = (1..=9).map(body).collect();
    assert_eq!(writer.publish(&bodies), 4);

    let mut out = Vec::new();
    reader.read_latest(&mut out).unwrap();
    assert_eq!(out.len(), 4);
    assert_eq!(out, bodies[..4]);
}

#[test]
fn triple_buffer_never_tears() {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    let band = snapshot_band(8);
    let (mut writer, mut reader) = triple_channel::<BodyRecord>(&band, "snapshot", 8).unwrap();

    const PUBLISHES: u32 = 20_000;
    // The protocol guarantees the slot a reader is draining survives the
    // very next publish, not an unbounded lap, so the writer is paced the
    // way the real fixed-step loop paces it: never more than two publishes
    // past the last snapshot the reader finished with.
    const MAX_LEAD: u32 = 2;

    let consumed = Arc::new(AtomicU32::new(0));

    let writer_thread = {
        let consumed = Arc::clone(&consumed);
        thread::spawn(move || {
            for seed in 1..=PUBLISHES {
                while seed > consumed.load(Ordering::Acquire) + MAX_LEAD {
                    std::hint::spin_loop();
                }
                // Every record of a snapshot derives from one seed; any mix
                // of seeds within one read is a torn slot.
                let bodies: Vec<BodyRecord> = (0..5).map(|_| body(seed)).collect();
                writer.publish(&bodies);
            }
        })
    };

    let reader_thread = {
        let consumed = Arc::clone(&consumed);
        thread::spawn(move || {
            let mut out = Vec::new();
            let mut last_generation = 0;
            let mut fresh_reads = 0u32;
            while last_generation < PUBLISHES {
                if let Some(generation) = reader.read_latest(&mut out) {
                    assert!(generation > last_generation, "generation must be monotonic");
                    last_generation = generation;
                    fresh_reads += 1;

                    assert_eq!(out.len(), 5);
                    let seed = out[0].subject.raw();
                    for record in &out {
                        assert_eq!(
                            *record,
                            body(seed),
                            "snapshot mixes records from different publishes"
                        );
                    }
                    consumed.store(generation, Ordering::Release);
                } else {
                    std::hint::spin_loop();
                }
            }
            fresh_reads
        })
    };

    writer_thread.join().unwrap();
    assert!(reader_thread.join().unwrap() > 0);
}

#[test]
fn query_slot_reports_only_new_generations() {
    let band = make_band(ChannelKind::WeaponResults, 64);
    let (mut responder, mut poller) = query_channel(&band, "weapon-results").unwrap();

    // No answer yet.
    assert!(poller.poll().is_none());
    assert_eq!(poller.channel_generation(), 0);

    responder.respond(
        SubjectId(5),
        Some(RayHit {
            subject: SubjectId(9),
            distance: 4.0,
            point: Vec3::new(0.0, 0.0, -4.0),
        }),
    );

    let answer = poller.poll().expect("fresh answer");
    assert_eq!(answer.source, SubjectId(5));
    let hit = answer.hit.expect("hit payload");
    assert_eq!(hit.subject, SubjectId(9));
    assert_eq!(hit.distance, 4.0);
    assert_eq!(hit.point, Vec3::new(0.0, 0.0, -4.0));

    // Stale until the responder writes again.
    assert!(poller.poll().is_none());

    // A miss answer: hit_id 0 decodes to None.
    responder.respond(SubjectId(6), None);
    let answer = poller.poll().expect("fresh answer");
    assert_eq!(answer.source, SubjectId(6));
    assert!(answer.hit.is_none());

    // Two answers between polls: only the latest is observable.
    responder.respond(SubjectId(7), None);
    responder.respond(SubjectId(8), None);
    let answer = poller.poll().expect("fresh answer");
    assert_eq!(answer.source, SubjectId(8));
    assert!(poller.poll().is_none());
}

#[test]
fn dirty_sync_is_idempotent_and_atomic_per_field() {
    let band = make_band(ChannelKind::Settings, 64);
    let (mut handle, mut consumer) = settings_channel(&band).unwrap();

    let mut env = EnvState::default();
    let before = env;

    // Nothing published: sync applies nothing.
    assert_eq!(consumer.sync(&mut env), 0);
    assert_eq!(env, before);

    // A full vector write lands atomically with its flag.
    handle.set_fog_color(Vec3::new(0.9, 0.1, 0.2));
    handle.set_fog_density(0.5);
    let applied = consumer.sync(&mut env);
    assert_ne!(applied, 0);
    assert_eq!(env.fog_color, Vec3::new(0.9, 0.1, 0.2));
    assert_eq!(env.fog_density, 0.5);
    // Untouched fields keep their values.
    assert_eq!(env.sun_intensity, before.sun_intensity);

    // Second sync with no intervening writes: claimed mask is zero and
    // nothing changes.
    let snapshot = env;
    assert_eq!(consumer.sync(&mut env), 0);
    assert_eq!(env, snapshot);
}

#[test]
fn dirty_consumer_clamps_and_normalizes() {
    let band = make_band(ChannelKind::Settings, 64);
    let (mut handle, mut consumer) = settings_channel(&band).unwrap();
    let mut env = EnvState::default();

    handle.set_fog_density(42.0); // clamped to 1
    handle.set_sun_direction(Vec3::new(0.0, -10.0, 0.0)); // renormalized
    handle.set_shadow_map_size(3000); // snapped to nearest bucket
    handle.set_time_scale(-2.0); // clamped to 0
    handle.set_wind(Vec4::new(0.0, 0.0, 0.0, 1000.0)); // degenerate direction

    consumer.sync(&mut env);
    assert_eq!(env.fog_density, 1.0);
    assert_eq!(env.sun_direction, Vec3::NEG_Y);
    assert_eq!(env.shadow_map_size, 2048);
    assert_eq!(env.time_scale, 0.0);
    assert_eq!(env.wind, Vec4::new(0.0, -1.0, 0.0, 64.0));
}

#[test]
fn publish_all_bootstraps_a_fresh_consumer() {
    let band = make_band(ChannelKind::Settings, 64);
    let (mut handle, mut consumer) = settings_channel(&band).unwrap();

    let mut authored = EnvState::default();
    authored.fog_density = 0.25;
    // Exactly unit-length, so the consumer's renormalization is a no-op
    // and the equality below can be exact.
    authored.sun_direction = Vec3::NEG_Y;
    authored.sun_intensity = 3.0;
    authored.shadow_map_size = 1024;
    handle.publish_all(&authored);

    // Consumer starts from arbitrary local state and converges in one sync.
    let mut env = EnvState {
        fog_density: 0.9,
        sun_intensity: 9.0,
        shadow_map_size: 512,
        ..EnvState::default()
    };
    let applied = consumer.sync(&mut env);
    assert_ne!(applied, 0);
    assert_eq!(env, authored);
}

#[test]
fn coalescing_applies_only_the_last_write() {
    let band = make_band(ChannelKind::Settings, 64);
    let (mut handle, mut consumer) = settings_channel(&band).unwrap();
    let mut env = EnvState::default();

    for density in [0.1, 0.2, 0.3] {
        handle.set_fog_density(density);
    }
    consumer.sync(&mut env);
    assert_eq!(env.fog_density, 0.3);
}

#[test]
fn binding_a_band_under_the_wrong_schema_fails() {
    let band = make_band(ChannelKind::Commands, 4096);

    // Initialize as a ring...
    let _ring = ring_channel::<BodyCommand>(&band, "commands", 16).unwrap();

    // ...then try to bind the same band as a snapshot channel: the magic
    // does not match and the bind is fatal for that channel.
    let error = triple_channel::<BodyRecord>(&band, "snapshot", 4)
        .err()
        .expect("schema mismatch expected");
    assert!(matches!(error, LinkError::SchemaMismatch { .. }));

    // A query bind over the same band fails the same way.
    assert!(query_channel(&band, "weapon-results").is_err());
}
