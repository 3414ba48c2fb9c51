//! Participant join/leave and readiness.
//!
//! The membership manager owns the [`Roster`]. It allocates participant ids,
//! binds them to connections, and records the "ready to race" signal. What a
//! departure means for a running race is handled by the server, which feeds
//! the removed participant to the state machine.

use tracing::info;

use crate::participant::{ConnectionId, Participant, ParticipantId, Roster};

/// Membership requests that cannot be honored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MembershipError {
    /// The connection already has a participant.
    #[error("connection {0:?} is already joined")]
    AlreadyConnected(ConnectionId),
    /// No participant is bound to the connection.
    #[error("no participant for connection {0:?}")]
    UnknownConnection(ConnectionId),
    /// The roster is at capacity.
    #[error("roster is full ({max} participants)")]
    RosterFull {
        /// Configured capacity.
        max: usize,
    },
    /// Display names must not be blank.
    #[error("participant name cannot be empty")]
    EmptyName,
}

/// Tracks who is connected and ready.
#[derive(Debug)]
pub struct MembershipManager {
    roster: Roster,
    max_participants: usize,
    max_health: u32,
    next_id: u64,
}

impl MembershipManager {
    /// Creates an empty manager admitting at most `max_participants`.
    pub fn new(max_participants: usize, max_health: u32) -> Self {
        Self {
            roster: Roster::new(),
            max_participants,
            max_health,
            next_id: 1,
        }
    }

    /// Binds a new participant to `connection` and appends it to the roster.
    pub fn add_participant(
        &mut self,
        connection: ConnectionId,
        name: &str,
    ) -> Result<ParticipantId, MembershipError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MembershipError::EmptyName);
        }
        if self.roster.by_connection(connection).is_some() {
            return Err(MembershipError::AlreadyConnected(connection));
        }
        if self.roster.len() >= self.max_participants {
            return Err(MembershipError::RosterFull {
                max: self.max_participants,
            });
        }

        let id = ParticipantId(self.next_id);
        self.next_id += 1;
        self.roster
            .push(Participant::new(id, connection, name, self.max_health));
        info!("{} joined as {:?} on {:?}", name, id, connection);
        Ok(id)
    }

    /// Unbinds and returns the participant on `connection`.
    pub fn remove_participant(
        &mut self,
        connection: ConnectionId,
    ) -> Result<Participant, MembershipError> {
        let id = self
            .participant_for(connection)
            .ok_or(MembershipError::UnknownConnection(connection))?;
        let participant = self
            .roster
            .remove(id)
            .ok_or(MembershipError::UnknownConnection(connection))?;
        info!("{} ({:?}) left", participant.name, id);
        Ok(participant)
    }

    /// Records the "ready to race" signal.
    pub fn set_ready(
        &mut self,
        connection: ConnectionId,
        ready: bool,
    ) -> Result<ParticipantId, MembershipError> {
        let id = self
            .participant_for(connection)
            .ok_or(MembershipError::UnknownConnection(connection))?;
        if let Some(participant) = self.roster.get_mut(id)
            && participant.ready != ready
        {
            participant.ready = ready;
            info!("{} is {}", participant.name, if ready { "ready" } else { "not ready" });
        }
        Ok(id)
    }

    /// The participant bound to `connection`.
    pub fn participant_for(&self, connection: ConnectionId) -> Option<ParticipantId> {
        self.roster.by_connection(connection).map(|p| p.id)
    }

    /// Number of ready participants.
    pub fn ready_count(&self) -> usize {
        self.roster.iter().filter(|p| p.ready).count()
    }

    /// Connected participants.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Connected participants, mutably.
    pub fn roster_mut(&mut self) -> &mut Roster {
        &mut self.roster
    }
}
