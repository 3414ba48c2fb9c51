//! The authoritative session, assembled.
//!
//! [`RaceServer`] owns every component (membership, vehicle world,
//! replicator, state machine, event queue, outbox) and exposes the inbound
//! interfaces the transport and engine collaborators call. Two fixed-rate
//! schedules drive it: the network tick (replication) and the session tick
//! (state machine and leaderboard).

use tracing::{debug, info, warn};

use racerr_config::{Config, RaceConfig};

use crate::clock::{TickSchedule, clamp_frame_time};
use crate::events::{EngineEvent, EventQueue};
use crate::leaderboard::LeaderboardRow;
use crate::membership::{MembershipError, MembershipManager};
use crate::participant::{ConnectionId, ParticipantId, Roster};
use crate::progress::{CheckpointId, TrackError, TrackLayout};
use crate::protocol::{ClientMessage, Envelope, MessageError, Outbox, ServerMessage, deserialize_message};
use crate::replication::{AuthorityReplicator, ProposalRejected, VehicleStateUpdate};
use crate::state_machine::{ServerStateMachine, SessionContext, StateKind};
use crate::vehicle::VehicleWorld;

/// Why an inbound client request was not applied.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The payload could not be decoded.
    #[error(transparent)]
    Decode(#[from] MessageError),
    /// Join/leave/ready failed.
    #[error(transparent)]
    Membership(#[from] MembershipError),
    /// A vehicle proposal was dropped.
    #[error(transparent)]
    Proposal(#[from] ProposalRejected),
}

/// The authoritative race session.
#[derive(Debug)]
pub struct RaceServer {
    race_config: RaceConfig,
    max_frame_time: f64,
    track: TrackLayout,
    members: MembershipManager,
    vehicles: VehicleWorld,
    replication: AuthorityReplicator,
    machine: ServerStateMachine,
    events: EventQueue,
    outbox: Outbox,
    net_schedule: TickSchedule,
    session_schedule: TickSchedule,
    now: f64,
}

impl RaceServer {
    /// Builds a server in Idle at session time zero.
    pub fn new(config: &Config, track: TrackLayout) -> Self {
        Self {
            race_config: config.race.clone(),
            max_frame_time: config.schedule.max_frame_time_secs,
            track,
            members: MembershipManager::new(
                config.network.max_players as usize,
                config.race.max_health,
            ),
            vehicles: VehicleWorld::new(),
            replication: AuthorityReplicator::new(),
            machine: ServerStateMachine::new(),
            events: EventQueue::new(),
            outbox: Outbox::new(),
            net_schedule: TickSchedule::with_tick_rate(config.schedule.net_tick_rate),
            session_schedule: TickSchedule::with_tick_rate(config.schedule.session_tick_rate),
            now: 0.0,
        }
    }

    // -- Accessors ----------------------------------------------------------

    /// Current session time.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// The state machine's current state.
    pub fn state_kind(&self) -> StateKind {
        self.machine.kind()
    }

    /// The state machine.
    pub fn machine(&self) -> &ServerStateMachine {
        &self.machine
    }

    /// Connected participants.
    pub fn roster(&self) -> &Roster {
        self.members.roster()
    }

    /// Authoritative vehicles.
    pub fn vehicles(&self) -> &VehicleWorld {
        &self.vehicles
    }

    /// Current track.
    pub fn track(&self) -> &TrackLayout {
        &self.track
    }

    /// Whether vehicle proposals are currently accepted.
    pub fn replication_enabled(&self) -> bool {
        self.replication.is_enabled()
    }

    /// Current standings, if a race is running or its results are showing.
    pub fn leaderboard(&self) -> Option<Vec<LeaderboardRow>> {
        self.machine.leaderboard(self.members.roster())
    }

    /// Seconds until the running race's deadline.
    pub fn remaining_race_time(&self) -> Option<f64> {
        self.machine
            .race()
            .map(|race| race.remaining_race_time(self.now))
    }

    /// Seconds since the running race started.
    pub fn current_race_duration(&self) -> Option<f64> {
        self.machine
            .race()
            .map(|race| race.current_race_duration(self.now))
    }

    // -- Track --------------------------------------------------------------

    /// Replaces the track. An invalid layout is logged and the previous one
    /// stays in place.
    pub fn set_track_layout(
        &mut self,
        checkpoints: Vec<CheckpointId>,
        finish_line: CheckpointId,
    ) -> Result<(), TrackError> {
        match TrackLayout::with_finish_line(checkpoints, finish_line) {
            Ok(layout) => {
                info!("Track set: {} checkpoints", layout.checkpoints().len());
                self.track = layout;
                Ok(())
            }
            Err(e) => {
                warn!("Keeping previous track layout: {}", e);
                Err(e)
            }
        }
    }

    // -- Membership ---------------------------------------------------------

    /// Admits a new connection and brings it up to date: its participant id,
    /// the current state, and every live vehicle.
    pub fn on_connect(
        &mut self,
        connection: ConnectionId,
        name: &str,
    ) -> Result<ParticipantId, MembershipError> {
        let participant = self.members.add_participant(connection, name)?;
        self.outbox
            .send(connection, ServerMessage::Welcome { participant });
        self.outbox.send(
            connection,
            ServerMessage::StateChanged {
                state: self.machine.kind(),
                at: self.now,
            },
        );
        for vehicle in self.vehicles.ids() {
            let (Some(owner), Some(spawn)) = (
                self.vehicles.owner_of(vehicle),
                self.vehicles.spawn_pose(vehicle),
            ) else {
                continue;
            };
            self.outbox.send(
                connection,
                ServerMessage::VehicleSpawned {
                    vehicle,
                    owner,
                    spawn,
                },
            );
            if let Some(state) = self.vehicles.state(vehicle) {
                self.outbox.send(
                    connection,
                    ServerMessage::VehicleState(VehicleStateUpdate { vehicle, state }),
                );
            }
        }
        Ok(participant)
    }

    /// Removes a departed connection. Its vehicle is despawned and a running
    /// race forgets it without counting it as finished or dead.
    pub fn on_disconnect(&mut self, connection: ConnectionId) -> Result<(), MembershipError> {
        let participant = self.members.remove_participant(connection)?;
        let (machine, mut ctx) = self.split(Vec::new());
        if let Some(vehicle) = participant.vehicle {
            ctx.despawn_vehicle(vehicle);
        }
        machine.on_participant_left(participant.id);
        Ok(())
    }

    /// Records the "ready to race" signal.
    pub fn on_ready(&mut self, connection: ConnectionId, ready: bool) -> Result<(), MembershipError> {
        self.members.set_ready(connection, ready).map(|_| ())
    }

    // -- Inbound messages ---------------------------------------------------

    /// Validates and applies an owner's vehicle sample. Rejections are
    /// logged at debug and not retried.
    pub fn on_vehicle_proposal(
        &mut self,
        connection: ConnectionId,
        update: &VehicleStateUpdate,
    ) -> Result<(), ProposalRejected> {
        let result = match self.members.participant_for(connection) {
            Some(sender) => self
                .replication
                .accept_proposal(&mut self.vehicles, sender, update, self.now),
            None => Err(ProposalRejected::UnknownSender),
        };
        if let Err(e) = &result {
            debug!("Dropped proposal from {:?}: {}", connection, e);
        }
        result
    }

    /// Dispatches a decoded client message.
    pub fn on_client_message(
        &mut self,
        connection: ConnectionId,
        message: ClientMessage,
    ) -> Result<(), RequestError> {
        match message {
            ClientMessage::Ready { ready } => self.on_ready(connection, ready)?,
            ClientMessage::ProposeVehicleState(update) => {
                self.on_vehicle_proposal(connection, &update)?
            }
        }
        Ok(())
    }

    /// Decodes a versioned payload and dispatches it.
    pub fn on_client_payload(
        &mut self,
        connection: ConnectionId,
        payload: &[u8],
    ) -> Result<(), RequestError> {
        let message: ClientMessage = deserialize_message(payload)?;
        self.on_client_message(connection, message)
    }

    /// Queues an engine observation for the next session tick.
    pub fn enqueue_event(&mut self, event: EngineEvent) {
        self.events.push(event);
    }

    // -- Ticks --------------------------------------------------------------

    /// One session tick at session time `now`.
    pub fn session_tick(&mut self, now: f64) {
        self.now = now;
        let events = self.events.drain();
        let (machine, mut ctx) = self.split(events);
        machine.tick(&mut ctx);
    }

    /// One network tick: rebroadcasts every vehicle state accepted since the
    /// previous one.
    pub fn network_tick(&mut self, now: f64) {
        self.now = now;
        for update in self.replication.collect_broadcasts(&self.vehicles) {
            self.outbox.broadcast(ServerMessage::VehicleState(update));
        }
    }

    /// Advances both schedules by one frame of wall time and runs every tick
    /// that falls due, in time order. Returns the number of session ticks run.
    pub fn advance(&mut self, frame_time: f64) -> usize {
        let frame_time = clamp_frame_time(frame_time, self.max_frame_time);
        let net: Vec<f64> = self.net_schedule.advance(frame_time).collect();
        let session: Vec<f64> = self.session_schedule.advance(frame_time).collect();
        let session_ticks = session.len();

        let (mut n, mut s) = (net.into_iter().peekable(), session.into_iter().peekable());
        loop {
            match (n.peek().copied(), s.peek().copied()) {
                (Some(tn), Some(ts)) if tn <= ts => {
                    n.next();
                    self.network_tick(tn);
                }
                (_, Some(ts)) => {
                    s.next();
                    self.session_tick(ts);
                }
                (Some(tn), None) => {
                    n.next();
                    self.network_tick(tn);
                }
                (None, None) => break,
            }
        }
        session_ticks
    }

    // -- Outbound -----------------------------------------------------------

    /// Takes every message queued for the transport.
    pub fn drain_outbox(&mut self) -> Vec<Envelope> {
        self.outbox.drain()
    }

    fn split(&mut self, events: Vec<EngineEvent>) -> (&mut ServerStateMachine, SessionContext<'_>) {
        let ctx = SessionContext {
            now: self.now,
            config: &self.race_config,
            track: &self.track,
            roster: self.members.roster_mut(),
            vehicles: &mut self.vehicles,
            replication: &mut self.replication,
            events,
            outbox: &mut self.outbox,
        };
        (&mut self.machine, ctx)
    }
}
