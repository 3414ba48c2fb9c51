//! The running race.
//!
//! Owns the [`RaceSessionData`] and the finish deadline. Each session tick
//! applies engine events, tightens the deadline once somebody finishes,
//! checks the empty and finished conditions (in that order), and publishes
//! the live clock and leaderboard.

use glam::Vec3;
use tracing::{debug, info, warn};

use crate::events::EngineEvent;
use crate::leaderboard::{LeaderboardRow, project};
use crate::participant::{ParticipantId, Roster};
use crate::progress::{CheckpointId, SequenceGuard};
use crate::protocol::ServerMessage;
use crate::session_data::{RaceSessionData, RaceSummary};
use crate::state_machine::{SessionContext, SessionState, StateKind, Transition};
use crate::vehicle::Pose;

/// State data of a race in progress.
#[derive(Debug)]
pub struct RaceState {
    data: RaceSessionData,
    finish_deadline: f64,
    passes: SequenceGuard,
}

impl RaceState {
    /// An empty race; populated on `enter`.
    pub fn new() -> Self {
        Self {
            data: RaceSessionData::new(0.0, Vec::<ParticipantId>::new()),
            finish_deadline: 0.0,
            passes: SequenceGuard::new(),
        }
    }

    /// Who is racing and how they left.
    pub fn data(&self) -> &RaceSessionData {
        &self.data
    }

    /// Session time at which the race is force-ended.
    pub fn finish_deadline(&self) -> f64 {
        self.finish_deadline
    }

    /// Seconds until the deadline. Negative once it has passed.
    pub fn remaining_race_time(&self, now: f64) -> f64 {
        self.finish_deadline - now
    }

    /// Seconds since the race started.
    pub fn current_race_duration(&self, now: f64) -> f64 {
        self.data.current_duration(now)
    }

    /// Live standings.
    pub fn leaderboard(&self, roster: &Roster) -> Option<Vec<LeaderboardRow>> {
        Some(project(&self.data, roster))
    }

    /// Drops a departed participant from the race and its subsets.
    pub fn remove_participant(&mut self, participant: ParticipantId) {
        if self.data.remove_player(participant) {
            info!("{:?} left the race", participant);
        }
        self.passes.forget(participant);
    }

    /// Records a checkpoint pass. Passing the finish line also finishes the
    /// participant and releases its vehicle. Passes from participants that
    /// are not actively racing, and checkpoints not on the track, are ignored.
    pub fn record_checkpoint_pass(
        &mut self,
        ctx: &mut SessionContext<'_>,
        participant: ParticipantId,
        checkpoint: CheckpointId,
    ) {
        if !self.data.is_racing(participant) {
            debug!("Ignoring checkpoint {:?} from {:?}: not racing", checkpoint, participant);
            return;
        }
        if !ctx.track.contains(checkpoint) {
            warn!("Checkpoint {:?} is not on the current track", checkpoint);
            return;
        }
        let Some(racer) = ctx.roster.get_mut(participant) else {
            return;
        };
        racer.progress.record_checkpoint(checkpoint);

        if checkpoint == ctx.track.finish_line() {
            racer.progress.mark_finished(ctx.now);
            self.data.mark_finished(participant);
            info!(
                "{:?} finished in {:.3}s",
                participant,
                self.data.current_duration(ctx.now)
            );
            ctx.release_vehicle(participant);
        }
    }

    fn apply_damage(&mut self, ctx: &mut SessionContext<'_>, participant: ParticipantId, amount: u32) {
        if !self.data.is_racing(participant) {
            return;
        }
        let Some(racer) = ctx.roster.get_mut(participant) else {
            return;
        };
        if !racer.apply_damage(amount) {
            return;
        }
        let vehicle = racer.vehicle;
        self.data.mark_dead(participant);
        info!("{:?} died", participant);
        // The wreck stays on track until the race ends.
        if let Some(vehicle) = vehicle {
            ctx.vehicles.set_control_enabled(vehicle, false);
        }
    }

    fn apply_event(&mut self, ctx: &mut SessionContext<'_>, event: EngineEvent) {
        match event {
            EngineEvent::CheckpointPassed {
                participant,
                checkpoint,
                sequence,
            } => {
                if !self.passes.accept(participant, sequence) {
                    debug!(
                        "Dropping stale pass #{} from {:?}",
                        sequence, participant
                    );
                    return;
                }
                self.record_checkpoint_pass(ctx, participant, checkpoint);
            }
            EngineEvent::CollisionDamage {
                participant,
                amount,
            } => self.apply_damage(ctx, participant, amount),
            EngineEvent::CheckpointDistance {
                participant,
                distance,
            } => {
                if !self.data.is_racing(participant) || !distance.is_finite() {
                    return;
                }
                if let Some(racer) = ctx.roster.get_mut(participant) {
                    racer.progress.distance_to_next = Some(distance.max(0.0));
                }
            }
        }
    }

    fn grid_slot(ctx: &SessionContext<'_>, index: usize) -> Pose {
        let origin = Vec3::from_array(ctx.config.grid_origin);
        let spacing = Vec3::from_array(ctx.config.grid_spacing);
        Pose::at(origin + spacing * index as f32)
    }
}

impl Default for RaceState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState for RaceState {
    fn kind(&self) -> StateKind {
        StateKind::Racing
    }

    fn enter(&mut self, ctx: &mut SessionContext<'_>) {
        let now = ctx.now;
        self.data = RaceSessionData::new(now, ctx.roster.ready_ids());
        self.finish_deadline = now + ctx.config.max_race_duration_secs;
        self.passes = SequenceGuard::new();

        let racers = self.data.players_in_race().to_vec();
        for (slot, id) in racers.iter().enumerate() {
            let Some(racer) = ctx.roster.get_mut(*id) else {
                continue;
            };
            racer.reset_for_race(now, ctx.config.max_health);
            if racer.vehicle.is_none() {
                let pose = Self::grid_slot(ctx, slot);
                ctx.spawn_vehicle(*id, pose);
            }
        }

        for id in &racers {
            if let Some(vehicle) = ctx.roster.get(*id).and_then(|p| p.vehicle) {
                ctx.vehicles.set_control_enabled(vehicle, true);
            }
        }

        ctx.replication.set_enabled(true);
        info!(
            "Race started with {} participants, deadline {:.3}",
            racers.len(),
            self.finish_deadline
        );
    }

    fn tick(&mut self, ctx: &mut SessionContext<'_>) -> Option<Transition> {
        let now = ctx.now;
        for event in std::mem::take(&mut ctx.events) {
            self.apply_event(ctx, event);
        }

        if !self.data.finished_players().is_empty() {
            let grace = now + ctx.config.grace_period_on_first_finish_secs;
            self.finish_deadline = self.finish_deadline.min(grace);
        }

        let rows = project(&self.data, ctx.roster);
        let transition = if self.data.is_empty() {
            Some(Transition::ToIdle)
        } else if self.data.all_done() || now >= self.finish_deadline {
            Some(Transition::ToIntermission(RaceSummary::capture(
                &self.data,
                now,
                rows.clone(),
            )))
        } else {
            None
        };

        ctx.outbox.broadcast(ServerMessage::RaceClock {
            elapsed: self.current_race_duration(now),
            remaining: self.remaining_race_time(now),
        });
        ctx.outbox.broadcast(ServerMessage::Leaderboard(rows));
        transition
    }

    fn exit(&mut self, ctx: &mut SessionContext<'_>) {
        for id in self.data.players_in_race().to_vec() {
            ctx.release_vehicle(id);
        }
        let leftovers: Vec<_> = ctx.vehicles.ids().collect();
        if !leftovers.is_empty() {
            debug!("Despawning {} vehicles outside the race", leftovers.len());
        }
        for vehicle in leftovers {
            ctx.despawn_vehicle(vehicle);
        }
        ctx.replication.set_enabled(false);
    }
}
