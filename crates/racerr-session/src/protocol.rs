//! Session wire protocol.
//!
//! Every message is serialized with [`postcard`] and prefixed with a
//! protocol version byte. Use [`serialize_message`] and
//! [`deserialize_message`] for either direction.

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::leaderboard::LeaderboardRow;
use crate::participant::{ConnectionId, ParticipantId};
use crate::replication::VehicleStateUpdate;
use crate::session_data::RaceSummary;
use crate::state_machine::StateKind;
use crate::vehicle::{Pose, VehicleId};

/// Current wire-protocol version. Prepended to every serialized message.
pub const PROTOCOL_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Peer to authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// The "ready to race" signal.
    Ready {
        /// New readiness.
        ready: bool,
    },
    /// The owner's latest sample of its vehicle.
    ProposeVehicleState(VehicleStateUpdate),
}

/// Authority to peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    // --- Session ---
    /// Sent once to a new connection.
    Welcome {
        /// The participant the connection plays as.
        participant: ParticipantId,
    },
    /// The session state machine changed state at session time `at`.
    StateChanged {
        /// New state.
        state: StateKind,
        /// Session time of the transition.
        at: f64,
    },
    /// Live race clock, published every session tick while racing.
    RaceClock {
        /// Seconds since the race started.
        elapsed: f64,
        /// Seconds until the deadline; negative once it has passed.
        remaining: f64,
    },
    /// Countdown to the next race, published every tick of intermission.
    IntermissionClock {
        /// Seconds left.
        remaining: f64,
    },
    /// Ordered leaderboard rows.
    Leaderboard(Vec<LeaderboardRow>),
    /// Final snapshot of the race that just ended.
    RaceResults(RaceSummary),

    // --- Vehicles ---
    /// A vehicle entered the world.
    VehicleSpawned {
        /// The vehicle.
        vehicle: VehicleId,
        /// Its owner.
        owner: ParticipantId,
        /// Where it was placed.
        spawn: Pose,
    },
    /// Authoritative vehicle state.
    VehicleState(VehicleStateUpdate),
    /// A vehicle left the world.
    VehicleDespawned {
        /// The vehicle.
        vehicle: VehicleId,
    },
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// Who a queued message is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Every connected peer.
    All,
    /// A single connection.
    Connection(ConnectionId),
}

/// An addressed server message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Destination.
    pub to: Recipient,
    /// Payload.
    pub message: ServerMessage,
}

/// Server messages waiting for the transport, in send order.
#[derive(Debug, Default)]
pub struct Outbox {
    queued: Vec<Envelope>,
}

impl Outbox {
    /// Creates an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a message for every peer.
    pub fn broadcast(&mut self, message: ServerMessage) {
        self.queued.push(Envelope {
            to: Recipient::All,
            message,
        });
    }

    /// Queues a message for one connection.
    pub fn send(&mut self, connection: ConnectionId, message: ServerMessage) {
        self.queued.push(Envelope {
            to: Recipient::Connection(connection),
            message,
        });
    }

    /// Takes everything queued so far.
    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.queued)
    }

    /// Queued messages, oldest first.
    pub fn pending(&self) -> &[Envelope] {
        &self.queued
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur when deserializing a message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The payload was empty (no version byte).
    #[error("empty payload, no version byte")]
    EmptyPayload,

    /// The version byte does not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Postcard deserialization failed.
    #[error("deserialization error: {0}")]
    Postcard(#[from] postcard::Error),
}

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

/// Serializes a message into a versioned binary payload.
///
/// Wire format: `[version: u8] [postcard-encoded message]`
pub fn serialize_message<M: Serialize>(msg: &M) -> Result<Vec<u8>, postcard::Error> {
    let body = postcard::to_allocvec(msg)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Deserializes a versioned binary payload.
pub fn deserialize_message<M: DeserializeOwned>(data: &[u8]) -> Result<M, MessageError> {
    let Some((&version, body)) = data.split_first() else {
        return Err(MessageError::EmptyPayload);
    };
    if version != PROTOCOL_VERSION {
        return Err(MessageError::UnsupportedVersion(version));
    }
    Ok(postcard::from_bytes(body)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
