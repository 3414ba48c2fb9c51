//! The authoritative session state machine: Idle → Racing → Intermission.
//!
//! Each state implements [`SessionState`]. [`ServerStateMachine`] owns the
//! current state, ticks it, and performs the exit/enter handshake when a tick
//! asks for a [`Transition`]. Every transition is broadcast to peers.

use serde::{Deserialize, Serialize};
use tracing::info;

use racerr_config::RaceConfig;

use crate::events::EngineEvent;
use crate::idle_state::IdleState;
use crate::intermission_state::IntermissionState;
use crate::leaderboard::LeaderboardRow;
use crate::participant::{ParticipantId, Roster};
use crate::progress::TrackLayout;
use crate::protocol::{Outbox, ServerMessage};
use crate::race_state::RaceState;
use crate::replication::AuthorityReplicator;
use crate::session_data::RaceSummary;
use crate::vehicle::{Pose, VehicleId, VehicleWorld};

// ---------------------------------------------------------------------------
// StateKind
// ---------------------------------------------------------------------------

/// Which state the session is in. Sent to peers on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    /// No race; waiting for ready participants.
    Idle,
    /// A race is running.
    Racing,
    /// Results are on screen until the next race.
    Intermission,
}

// ---------------------------------------------------------------------------
// SessionContext
// ---------------------------------------------------------------------------

/// Everything a state may read or mutate during one call. Built fresh by the
/// server for every session tick.
pub struct SessionContext<'a> {
    /// Session time of this tick.
    pub now: f64,
    /// Race tuning.
    pub config: &'a RaceConfig,
    /// Current track.
    pub track: &'a TrackLayout,
    /// Connected participants.
    pub roster: &'a mut Roster,
    /// Authoritative vehicles.
    pub vehicles: &'a mut VehicleWorld,
    /// Replication gate and pending broadcasts.
    pub replication: &'a mut AuthorityReplicator,
    /// Engine events drained for this tick, sequence-ordered per participant.
    pub events: Vec<EngineEvent>,
    /// Messages for peers.
    pub outbox: &'a mut Outbox,
}

impl SessionContext<'_> {
    /// Spawns a vehicle for `owner`, links it to the participant, and tells
    /// peers about it. Control starts disabled.
    pub fn spawn_vehicle(&mut self, owner: ParticipantId, pose: Pose) -> VehicleId {
        let vehicle = self.vehicles.spawn(owner, pose);
        if let Some(participant) = self.roster.get_mut(owner) {
            participant.vehicle = Some(vehicle);
        }
        self.outbox.broadcast(ServerMessage::VehicleSpawned {
            vehicle,
            owner,
            spawn: pose,
        });
        vehicle
    }

    /// Despawns a vehicle, unlinks it from its owner, and tells peers.
    /// Absent vehicles are a no-op.
    pub fn despawn_vehicle(&mut self, vehicle: VehicleId) {
        self.replication.forget(vehicle);
        if let Some(owner) = self.vehicles.owner_of(vehicle)
            && let Some(participant) = self.roster.get_mut(owner)
            && participant.vehicle == Some(vehicle)
        {
            participant.vehicle = None;
        }
        if self.vehicles.despawn(vehicle) {
            self.outbox
                .broadcast(ServerMessage::VehicleDespawned { vehicle });
        }
    }

    /// Unlinks and despawns the participant's vehicle, if it has one.
    pub fn release_vehicle(&mut self, participant: ParticipantId) {
        let vehicle = self
            .roster
            .get_mut(participant)
            .and_then(|p| p.vehicle.take());
        if let Some(vehicle) = vehicle {
            self.despawn_vehicle(vehicle);
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// A request from a state's tick to move elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Back to waiting.
    ToIdle,
    /// Start a race.
    ToRacing,
    /// Show results of the race that just ended.
    ToIntermission(RaceSummary),
}

/// Lifecycle of one session state.
pub trait SessionState {
    /// Which state this is.
    fn kind(&self) -> StateKind;

    /// Called once when the machine switches to this state.
    fn enter(&mut self, ctx: &mut SessionContext<'_>);

    /// Called every session tick while current.
    fn tick(&mut self, ctx: &mut SessionContext<'_>) -> Option<Transition>;

    /// Called once when the machine leaves this state.
    fn exit(&mut self, ctx: &mut SessionContext<'_>);
}

/// The current state, tagged.
#[derive(Debug)]
pub enum ServerState {
    /// See [`IdleState`].
    Idle(IdleState),
    /// See [`RaceState`].
    Racing(RaceState),
    /// See [`IntermissionState`].
    Intermission(IntermissionState),
}

impl ServerState {
    fn as_state_mut(&mut self) -> &mut dyn SessionState {
        match self {
            Self::Idle(state) => state,
            Self::Racing(state) => state,
            Self::Intermission(state) => state,
        }
    }

    fn from_transition(transition: Transition) -> Self {
        match transition {
            Transition::ToIdle => Self::Idle(IdleState::new()),
            Transition::ToRacing => Self::Racing(RaceState::new()),
            Transition::ToIntermission(summary) => {
                Self::Intermission(IntermissionState::new(summary))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ServerStateMachine
// ---------------------------------------------------------------------------

/// Owns and drives the current [`ServerState`].
#[derive(Debug)]
pub struct ServerStateMachine {
    current: ServerState,
}

impl ServerStateMachine {
    /// Starts in Idle.
    pub fn new() -> Self {
        Self {
            current: ServerState::Idle(IdleState::new()),
        }
    }

    /// The current state's kind.
    pub fn kind(&self) -> StateKind {
        match &self.current {
            ServerState::Idle(_) => StateKind::Idle,
            ServerState::Racing(_) => StateKind::Racing,
            ServerState::Intermission(_) => StateKind::Intermission,
        }
    }

    /// The current state.
    pub fn state(&self) -> &ServerState {
        &self.current
    }

    /// The running race, if any.
    pub fn race(&self) -> Option<&RaceState> {
        match &self.current {
            ServerState::Racing(race) => Some(race),
            _ => None,
        }
    }

    /// The intermission in progress, if any.
    pub fn intermission(&self) -> Option<&IntermissionState> {
        match &self.current {
            ServerState::Intermission(intermission) => Some(intermission),
            _ => None,
        }
    }

    /// Runs one session tick of the current state and applies the
    /// transition it requests, if any.
    pub fn tick(&mut self, ctx: &mut SessionContext<'_>) {
        if let Some(transition) = self.current.as_state_mut().tick(ctx) {
            self.change_state(transition, ctx);
        }
    }

    /// Exits the current state, broadcasts the change, and enters the next.
    pub fn change_state(&mut self, transition: Transition, ctx: &mut SessionContext<'_>) {
        let from = self.kind();
        self.current.as_state_mut().exit(ctx);
        self.current = ServerState::from_transition(transition);

        let to = self.kind();
        info!("Session state {:?} -> {:?} at {:.3}", from, to, ctx.now);
        ctx.outbox.broadcast(ServerMessage::StateChanged {
            state: to,
            at: ctx.now,
        });
        self.current.as_state_mut().enter(ctx);
    }

    /// Absorbs a disconnect: a running race drops the participant from all
    /// of its lists. Vehicle cleanup is the caller's concern.
    pub fn on_participant_left(&mut self, participant: ParticipantId) {
        if let ServerState::Racing(race) = &mut self.current {
            race.remove_participant(participant);
        }
    }

    /// Current standings: live while racing, final during intermission.
    pub fn leaderboard(&self, roster: &Roster) -> Option<Vec<LeaderboardRow>> {
        match &self.current {
            ServerState::Idle(_) => None,
            ServerState::Racing(race) => race.leaderboard(roster),
            ServerState::Intermission(intermission) => {
                Some(intermission.summary().leaderboard.clone())
            }
        }
    }
}

impl Default for ServerStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[path = "state_machine_tests.rs"]
mod tests;
