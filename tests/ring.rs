// SPSC ring channel tests: FIFO order with bit-exact payload round-trips,
// full-buffer rejection, wrap-around, the diagnostic generation counter,
// and a threaded producer/consumer soak with spin loops.

use glam::Vec3;
use physlink::channel::ring_channel;
use physlink::protocol::command::COMMAND_SLOT_WORDS;
use physlink::protocol::{BodyCommand, BodyDesc, ColliderShape, ControllerTuning};
use physlink::region::{Band, ChannelKind, RegionArena};
use physlink::SubjectId;
use std::thread;

fn make_band(words: usize) -> Band {
    let arena = RegionArena::new(words * 4 + 4096).expect("region allocation failed");
    arena
        .carve(ChannelKind::Commands, words)
        .expect("carve failed")
}

fn command_band(capacity: usize) -> Band {
    // Generous: header words never exceed this slack.
    make_band(capacity * COMMAND_SLOT_WORDS + 256)
}

fn move_command(sequence: u32) -> BodyCommand {
    BodyCommand::MovePlayer {
        subject: SubjectId(sequence),
        displacement: Vec3::new(sequence as f32, -(sequence as f32) * 0.5, 0.25),
    }
}

#[test]
fn fifo_order_and_field_fidelity() {
    let band = command_band(16);
    let (mut producer, mut consumer) = ring_channel::<BodyCommand>(&band, "test", 16).unwrap();

    let sent: Vec<BodyCommand> = vec![
        BodyCommand::CreateBody {
            subject: SubjectId(1),
            body: BodyDesc::new(ColliderShape::Sphere { radius: 1.0 })
                .with_position(Vec3::new(0.0, 5.0, 0.0))
                .with_controller(ControllerTuning::default())
                .with_velocity(Vec3::new(0.125, -9.81, 3.5)),
        },
        move_command(2),
        BodyCommand::SetGravity {
            gravity: Vec3::new(0.0, -3.71, 0.0),
        },
        BodyCommand::DestroyBody {
            subject: SubjectId(1),
        },
    ];
    for command in &sent {
        producer.try_enqueue(command).expect("ring unexpectedly full");
    }

    let mut received = Vec::new();
    let drained = consumer.drain(|command| received.push(command));
    assert_eq!(drained, sent.len());
    assert_eq!(received, sent);
    assert_eq!(consumer.decode_failures(), 0);
}

#[test]
fn full_buffer_rejects_at_capacity_minus_one() {
    let capacity = 8u32;
    let band = command_band(capacity as usize);
    let (mut producer, mut consumer) =
        ring_channel::<BodyCommand>(&band, "test", capacity).unwrap();

    // One slot always stays empty to distinguish full from empty.
    for i in 0..capacity - 1 {
        producer
            .try_enqueue(&move_command(i))
            .unwrap_or_else(|_| panic!("enqueue {i} should fit"));
    }
    assert!(producer.try_enqueue(&move_command(99)).is_err());
    assert_eq!(producer.take_dropped(), 1);
    assert_eq!(producer.take_dropped(), 0);

    // No partial record became visible; exactly the accepted ones drain,
    // in order.
    let mut received = Vec::new();
    assert_eq!(consumer.drain(|c| received.push(c)), (capacity - 1) as usize);
    for (i, command) in received.iter().enumerate() {
        assert_eq!(*command, move_command(i as u32));
    }

    // Space reclaimed: enqueue works again.
    assert!(producer.try_enqueue(&move_command(100)).is_ok());
}

#[test]
fn wrap_around_preserves_order() {
    let band = command_band(4);
    let (mut producer, mut consumer) = ring_channel::<BodyCommand>(&band, "test", 4).unwrap();

    let mut expected = 0u32;
    for round in 0..100u32 {
        for i in 0..3 {
            producer.try_enqueue(&move_command(round * 3 + i)).unwrap();
        }
        consumer.drain(|command| {
            assert_eq!(command, move_command(expected));
            expected += 1;
        });
    }
    assert_eq!(expected, 300);
}

#[test]
fn generation_bumps_once_per_nonempty_drain() {
    let band = command_band(8);
    let (mut producer, mut consumer) = ring_channel::<BodyCommand>(&band, "test", 8).unwrap();

    assert_eq!(consumer.generation(), 0);

    // Empty drain: no bump.
    assert_eq!(consumer.drain(|_| {}), 0);
    assert_eq!(consumer.generation(), 0);

    // One batch of three: exactly one bump.
    for i in 0..3 {
        producer.try_enqueue(&move_command(i)).unwrap();
    }
    consumer.drain(|_| {});
    assert_eq!(consumer.generation(), 1);

    producer.try_enqueue(&move_command(3)).unwrap();
    consumer.drain(|_| {});
    assert_eq!(consumer.generation(), 2);
}

#[test]
fn generation_is_monotonic_across_batches() {
    let band = command_band(16);
    let (mut producer, mut consumer) = ring_channel::<BodyCommand>(&band, "test", 16).unwrap();

    let mut last = consumer.generation();
    for batch in 0..50u32 {
        for i in 0..(batch % 5 + 1) {
            producer.try_enqueue(&move_command(i)).unwrap();
        }
        consumer.drain(|_| {});
        let now = consumer.generation();
        assert!(now > last, "generation must strictly increase per batch");
        last = now;
    }
}

#[test]
fn rebind_validates_geometry() {
    let band = command_band(16);
    let (mut producer, _consumer) = ring_channel::<BodyCommand>(&band, "test", 16).unwrap();
    producer.try_enqueue(&move_command(1)).unwrap();

    // Re-binding with matching geometry attaches to the live state.
    let (_p2, mut c2) = ring_channel::<BodyCommand>(&band, "test", 16).unwrap();
    let mut seen = 0;
    c2.drain(|_| seen += 1);
    assert_eq!(seen, 1);

    // A different capacity is a fatal geometry mismatch.
    assert!(ring_channel::<BodyCommand>(&band, "test", 8).is_err());
}

#[test]
fn randomized_payloads_round_trip() {
    let band = command_band(64);
    let (mut producer, mut consumer) = ring_channel::<BodyCommand>(&band, "test", 64).unwrap();

    fastrand::seed(0x5EED);
    let sent: Vec<BodyCommand> = (0..48)
        .map(|i| BodyCommand::MovePlayer {
            subject: SubjectId(i + 1),
            displacement: Vec3::new(
                fastrand::f32() * 200.0 - 100.0,
                fastrand::f32() * 200.0 - 100.0,
                fastrand::f32() * 200.0 - 100.0,
            ),
        })
        .collect();

    for command in &sent {
        producer.try_enqueue(command).unwrap();
    }
    let mut received = Vec::new();
    consumer.drain(|c| received.push(c));
    assert_eq!(received, sent);
}

#[test]
fn spsc_threads_deliver_everything_in_order() {
    let band = command_band(32);
    let (mut producer, mut consumer) = ring_channel::<BodyCommand>(&band, "test", 32).unwrap();

    const TOTAL: u32 = 20_000;

    let producer_thread = thread::spawn(move || {
        for i in 0..TOTAL {
            let command = move_command(i);
            // Spin until the consumer frees a slot.
            while producer.try_enqueue(&command).is_err() {
                std::hint::spin_loop();
            }
        }
    });

    let consumer_thread = thread::spawn(move || {
        let mut next = 0u32;
        while next < TOTAL {
            let drained = consumer.drain(|command| {
                assert_eq!(command, move_command(next));
                next += 1;
            });
            if drained == 0 {
                std::hint::spin_loop();
            }
        }
        next
    });

    producer_thread.join().unwrap();
    assert_eq!(consumer_thread.join().unwrap(), TOTAL);
}
