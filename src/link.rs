//! Link allocation: size the region, carve every channel band, bind both
//! endpoint bundles.
//!
//! Called once at startup by the main thread. The worker half is then
//! handed to the spawned physics thread as the single initialization
//! message of the protocol; there is no renegotiation afterwards.

use crate::channel::layout::{header_words, DirtyHeader, QueryHeader, RingHeader, TripleHeader};
use crate::channel::{query_channel, ring_channel, triple_channel};
use crate::config::LinkConfig;
use crate::error::LinkResult;
use crate::frontend::GameBridge;
use crate::protocol::command::COMMAND_SLOT_WORDS;
use crate::protocol::event::{CONTACT_SLOT_WORDS, CONTROLLER_SLOT_WORDS};
use crate::protocol::settings::SETTINGS_BANK_WORDS;
use crate::protocol::snapshot::BODY_RECORD_WORDS;
use crate::protocol::{settings_channel, BodyCommand, ContactEvent, ControllerEvent};
use crate::region::{ChannelKind, RegionArena, MAX_CHANNELS};
use crate::worker::WorkerEndpoints;

fn ring_words(capacity: u32, slot_words: usize) -> usize {
    header_words::<RingHeader>() + capacity as usize * slot_words
}

fn triple_words(max_records: u32) -> usize {
    header_words::<TripleHeader>() + 3 * (1 + max_records as usize * BODY_RECORD_WORDS)
}

/// Allocate one link: a fresh shared region carved into all seven channel
/// bands, returning the main-thread bridge and the physics-thread
/// endpoints.
pub fn allocate(config: &LinkConfig) -> LinkResult<(GameBridge, WorkerEndpoints)> {
    config.validate()?;

    let band_words = [
        ring_words(config.command_capacity, COMMAND_SLOT_WORDS),
        ring_words(config.contact_capacity, CONTACT_SLOT_WORDS),
        ring_words(config.controller_capacity, CONTROLLER_SLOT_WORDS),
        triple_words(config.snapshot_max_bodies),
        header_words::<QueryHeader>(),
        header_words::<QueryHeader>(),
        header_words::<DirtyHeader>() + SETTINGS_BANK_WORDS,
    ];
    // Arena header plus per-band alignment slack.
    let total_bytes = band_words.iter().sum::<usize>() * 4 + (MAX_CHANNELS + 1) * 256;

    let arena = RegionArena::new(total_bytes)?;

    let commands_band = arena.carve(ChannelKind::Commands, band_words[0])?;
    let contacts_band = arena.carve(ChannelKind::ContactEvents, band_words[1])?;
    let controller_band = arena.carve(ChannelKind::ControllerEvents, band_words[2])?;
    let snapshot_band = arena.carve(ChannelKind::Snapshot, band_words[3])?;
    let weapon_band = arena.carve(ChannelKind::WeaponResults, band_words[4])?;
    let interaction_band = arena.carve(ChannelKind::InteractionResults, band_words[5])?;
    let settings_band = arena.carve(ChannelKind::Settings, band_words[6])?;

    let (command_producer, command_consumer) =
        ring_channel::<BodyCommand>(&commands_band, "commands", config.command_capacity)?;
    let (contact_producer, contact_consumer) =
        ring_channel::<ContactEvent>(&contacts_band, "contacts", config.contact_capacity)?;
    let (controller_producer, controller_consumer) = ring_channel::<ControllerEvent>(
        &controller_band,
        "controller-events",
        config.controller_capacity,
    )?;
    let (snapshot_writer, snapshot_reader) =
        triple_channel(&snapshot_band, "snapshot", config.snapshot_max_bodies)?;
    let (weapon_responder, weapon_poller) = query_channel(&weapon_band, "weapon-results")?;
    let (interaction_responder, interaction_poller) =
        query_channel(&interaction_band, "interaction-results")?;
    let (settings_handle, settings_consumer) = settings_channel(&settings_band)?;

    log::debug!(
        "link allocated: {} channels, {} of {} bytes used",
        arena.channel_count(),
        arena.used_bytes(),
        total_bytes
    );

    let bridge = GameBridge::new(
        command_producer,
        contact_consumer,
        controller_consumer,
        snapshot_reader,
        weapon_poller,
        interaction_poller,
        settings_handle,
    );

    let endpoints = WorkerEndpoints {
        commands: command_consumer,
        contacts: contact_producer,
        controller_events: controller_producer,
        snapshot: snapshot_writer,
        weapon_results: weapon_responder,
        interaction_results: interaction_responder,
        settings: settings_consumer,
    };

    Ok((bridge, endpoints))
}
