//! Scripted racers standing in for remote peers and the physics engine.
//!
//! Each bot plays one participant. It receives encoded server messages like
//! a real peer would, keeps a [`ClientView`] and a [`PeerReplicator`], drives
//! its car down a straight track along +Z, and reports what the physics
//! engine would observe: checkpoint triggers, distances and random crashes.

use glam::{Quat, Vec3};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

use racerr_session::{
    CheckpointId, ClientMessage, ClientView, ConnectionId, EngineEvent, LocalView, MessageError,
    ParticipantId, PeerReplicator, ServerMessage, SmoothingParams, VehicleState,
    apply_server_message, deserialize_message,
};

/// Distance between consecutive checkpoints along the track.
pub const CHECKPOINT_SPACING: f32 = 200.0;

/// Chance per frame that a driving bot scrapes something.
const CRASH_CHANCE: f64 = 0.0005;

/// Z coordinate of each checkpoint trigger; the last is the finish line.
pub fn checkpoint_positions(count: u32) -> Vec<f32> {
    (1..=count).map(|k| k as f32 * CHECKPOINT_SPACING).collect()
}

/// One scripted peer.
pub struct Bot {
    /// Transport handle.
    pub connection: ConnectionId,
    /// Display name.
    pub name: String,
    participant: Option<ParticipantId>,
    replicator: Option<PeerReplicator>,
    smoothing: SmoothingParams,
    view: ClientView,
    rng: Xoshiro256StarStar,
    position: Option<Vec3>,
    speed: f32,
    next_checkpoint: usize,
    sequence: u64,
}

impl Bot {
    /// Creates a bot with a reproducible random stream.
    pub fn new(connection: ConnectionId, name: String, smoothing: SmoothingParams, seed: u64) -> Self {
        Self {
            connection,
            name,
            participant: None,
            replicator: None,
            smoothing,
            view: ClientView::new(),
            rng: Xoshiro256StarStar::seed_from_u64(seed),
            position: None,
            speed: 0.0,
            next_checkpoint: 0,
            sequence: 0,
        }
    }

    /// The bot's session view.
    pub fn view(&self) -> &ClientView {
        &self.view
    }

    /// Applies one encoded server message.
    pub fn receive(&mut self, payload: &[u8]) -> Result<(), MessageError> {
        let message: ServerMessage = deserialize_message(payload)?;
        if let ServerMessage::Welcome { participant } = message {
            self.participant = Some(participant);
            self.replicator = Some(PeerReplicator::new(participant, self.smoothing));
        }
        if let Some(replicator) = &mut self.replicator {
            replicator.apply_server_message(&message);
        }
        let view = std::mem::take(&mut self.view);
        self.view = apply_server_message(view, &message);
        Ok(())
    }

    /// Advances the bot's car by `dt` and returns what the engine saw.
    pub fn drive(&mut self, now: f64, dt: f32, checkpoints: &[f32]) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let (Some(participant), Some(replicator)) = (self.participant, self.replicator.as_mut())
        else {
            return events;
        };
        let Some(vehicle) = replicator.owned_vehicle() else {
            self.position = None;
            return events;
        };
        if self.view.view != LocalView::Racing {
            return events;
        }

        let mut position = match self.position {
            Some(position) => position,
            None => {
                self.next_checkpoint = 0;
                self.speed = self.rng.gen_range(22.0..32.0);
                replicator
                    .rendered_pose(vehicle)
                    .map_or(Vec3::ZERO, |pose| pose.position)
            }
        };
        self.speed = (self.speed + self.rng.gen_range(-0.5..0.5)).clamp(15.0, 40.0);
        position.z += self.speed * dt;
        self.position = Some(position);

        replicator.record_local_sample(
            vehicle,
            VehicleState {
                position,
                rotation: Quat::IDENTITY,
                linear_velocity: Vec3::new(0.0, 0.0, self.speed),
                timestamp: now,
            },
        );

        while let Some(&trigger_z) = checkpoints.get(self.next_checkpoint) {
            if position.z < trigger_z {
                break;
            }
            self.sequence += 1;
            events.push(EngineEvent::CheckpointPassed {
                participant,
                checkpoint: CheckpointId(self.next_checkpoint as u32),
                sequence: self.sequence,
            });
            self.next_checkpoint += 1;
        }
        if let Some(&trigger_z) = checkpoints.get(self.next_checkpoint) {
            events.push(EngineEvent::CheckpointDistance {
                participant,
                distance: trigger_z - position.z,
            });
        }
        if self.rng.gen_bool(CRASH_CHANCE) {
            events.push(EngineEvent::CollisionDamage {
                participant,
                amount: self.rng.gen_range(15..60),
            });
        }
        events
    }

    /// Runs the bot's network tick: proposals for its own car.
    pub fn network_tick(&mut self, now: f64) -> Vec<ClientMessage> {
        match &mut self.replicator {
            Some(replicator) => replicator.tick(now),
            None => Vec::new(),
        }
    }
}
