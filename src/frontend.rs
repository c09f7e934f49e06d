//! The main-thread side of the link.
//!
//! [`GameBridge`] bundles every main-thread endpoint: it enqueues
//! commands, reads the latest snapshot, drains both event rings into
//! typed values, polls the raycast result slots, and exposes the settings
//! setters. Gameplay code maps [`SubjectId`]s back to its own entities
//! through its own [`crate::subject::SubjectTable`].

use crate::channel::{QueryPoller, RayAnswer, RingConsumer, RingProducer};
use crate::error::ChannelFull;
use crate::protocol::{
    BodyCommand, BodyDesc, BodyRecord, ContactEvent, ControllerEvent, RayQuery, SettingsHandle,
    SnapshotReader,
};
use crate::subject::{SubjectAllocator, SubjectId};
use glam::{Quat, Vec3};

/// Main-thread endpoint bundle.
pub struct GameBridge {
    commands: RingProducer<BodyCommand>,
    contacts: RingConsumer<ContactEvent>,
    controller_events: RingConsumer<ControllerEvent>,
    snapshot: SnapshotReader,
    weapon_results: QueryPoller,
    interaction_results: QueryPoller,
    settings: SettingsHandle,
    subjects: SubjectAllocator,
    snapshot_bodies: Vec<BodyRecord>,
    snapshot_generation: u32,
    pending_weapon: Option<SubjectId>,
    pending_interaction: Option<SubjectId>,
    dropped_this_frame: u32,
}

impl GameBridge {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        commands: RingProducer<BodyCommand>,
        contacts: RingConsumer<ContactEvent>,
        controller_events: RingConsumer<ControllerEvent>,
        snapshot: SnapshotReader,
        weapon_results: QueryPoller,
        interaction_results: QueryPoller,
        settings: SettingsHandle,
    ) -> Self {
        Self {
            commands,
            contacts,
            controller_events,
            snapshot,
            weapon_results,
            interaction_results,
            settings,
            subjects: SubjectAllocator::new(),
            snapshot_bodies: Vec::new(),
            snapshot_generation: 0,
            pending_weapon: None,
            pending_interaction: None,
            dropped_this_frame: 0,
        }
    }

    fn send(&mut self, command: BodyCommand) -> Result<(), ChannelFull> {
        let result = self.commands.try_enqueue(&command);
        if result.is_err() {
            self.dropped_this_frame += 1;
        }
        result
    }

    /// Request a body. The returned id is valid immediately as a handle;
    /// the body exists once the worker drains the command. On a full ring
    /// the id is burned and the body never appears; gaps are acceptable.
    pub fn create_body(&mut self, body: BodyDesc) -> Result<SubjectId, ChannelFull> {
        let subject = self.subjects.allocate();
        self.send(BodyCommand::CreateBody { subject, body })?;
        Ok(subject)
    }

    pub fn destroy_body(&mut self, subject: SubjectId) -> Result<(), ChannelFull> {
        self.send(BodyCommand::DestroyBody { subject })
    }

    pub fn move_player(
        &mut self,
        subject: SubjectId,
        displacement: Vec3,
    ) -> Result<(), ChannelFull> {
        self.send(BodyCommand::MovePlayer {
            subject,
            displacement,
        })
    }

    pub fn set_transform(
        &mut self,
        subject: SubjectId,
        position: Vec3,
        orientation: Quat,
    ) -> Result<(), ChannelFull> {
        self.send(BodyCommand::SetTransform {
            subject,
            position,
            orientation,
        })
    }

    pub fn set_gravity(&mut self, gravity: Vec3) -> Result<(), ChannelFull> {
        self.send(BodyCommand::SetGravity { gravity })
    }

    /// Fire a weapon raycast. The allocated source id correlates the
    /// eventual answer; a newer request supersedes an unanswered one.
    pub fn cast_weapon_ray(&mut self, ray: RayQuery) -> Result<SubjectId, ChannelFull> {
        let source = self.subjects.allocate();
        self.send(BodyCommand::WeaponRaycast { source, ray })?;
        self.pending_weapon = Some(source);
        Ok(source)
    }

    pub fn cast_interaction_ray(&mut self, ray: RayQuery) -> Result<SubjectId, ChannelFull> {
        let source = self.subjects.allocate();
        self.send(BodyCommand::InteractionRaycast { source, ray })?;
        self.pending_interaction = Some(source);
        Ok(source)
    }

    /// A fresh weapon answer matching the outstanding request, if any.
    /// Answers to superseded requests are discarded.
    pub fn poll_weapon_hit(&mut self) -> Option<RayAnswer> {
        let answer = self.weapon_results.poll()?;
        match self.pending_weapon {
            Some(expected) if answer.source == expected => {
                self.pending_weapon = None;
                Some(answer)
            }
            _ => {
                log::debug!("discarded stale weapon raycast answer for {}", answer.source);
                None
            }
        }
    }

    pub fn poll_interaction_hit(&mut self) -> Option<RayAnswer> {
        let answer = self.interaction_results.poll()?;
        match self.pending_interaction {
            Some(expected) if answer.source == expected => {
                self.pending_interaction = None;
                Some(answer)
            }
            _ => {
                log::debug!(
                    "discarded stale interaction raycast answer for {}",
                    answer.source
                );
                None
            }
        }
    }

    /// Read the latest snapshot if one was published since the last read.
    /// Returns the snapshot generation and the decoded bodies.
    pub fn read_snapshot(&mut self) -> Option<(u32, &[BodyRecord])> {
        let generation = self.snapshot.read_latest(&mut self.snapshot_bodies)?;
        self.snapshot_generation = generation;
        Some((generation, &self.snapshot_bodies))
    }

    /// Bodies from the most recent snapshot read (possibly stale).
    pub fn latest_bodies(&self) -> &[BodyRecord] {
        &self.snapshot_bodies
    }

    /// Generation of the most recent snapshot read.
    pub fn snapshot_generation(&self) -> u32 {
        self.snapshot_generation
    }

    /// Drain all pending collision events in FIFO order.
    pub fn drain_contacts(&mut self, visit: impl FnMut(ContactEvent)) -> usize {
        self.contacts.drain(visit)
    }

    /// Drain all pending controller events in FIFO order.
    pub fn drain_controller_events(&mut self, visit: impl FnMut(ControllerEvent)) -> usize {
        self.controller_events.drain(visit)
    }

    /// The environment settings surface (dirty-flag channel producer).
    pub fn settings(&mut self) -> &mut SettingsHandle {
        &mut self.settings
    }

    /// End-of-frame bookkeeping: one aggregated warning if any command
    /// was dropped this frame, never one line per drop.
    pub fn finish_frame(&mut self) {
        if self.dropped_this_frame > 0 {
            log::warn!(
                "command ring full, dropped {} commands this frame",
                self.dropped_this_frame
            );
            self.dropped_this_frame = 0;
        }
    }

    /// Commands dropped since the last `finish_frame`.
    pub fn dropped_this_frame(&self) -> u32 {
        self.dropped_this_frame
    }
}
