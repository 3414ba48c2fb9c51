//! Vehicle state replication between owning peers, the authority, and
//! everyone else.
//!
//! The owning peer samples its vehicle every network tick and proposes the
//! sample to the authority. The [`AuthorityReplicator`] validates the
//! proposal against the [`VehicleWorld`], stores it, and rebroadcasts it as a
//! [`VehicleStateUpdate`]. Non-owning peers fold updates into a
//! [`VehicleMirror`] with the pure [`apply_state_update`] reducer and smooth
//! the rendered pose every tick (see [`crate::prediction`]).

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::participant::ParticipantId;
use crate::prediction::{SmoothingParams, smoothing_step};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::vehicle::{Pose, VehicleId, VehicleState, VehicleWorld};

/// How far past the authority's clock a sample may be stamped.
pub const MAX_CLOCK_LEAD: f64 = 0.5;

// ---------------------------------------------------------------------------
// Wire message
// ---------------------------------------------------------------------------

/// One vehicle's state, as proposed by its owner or broadcast by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleStateUpdate {
    /// The vehicle.
    pub vehicle: VehicleId,
    /// Its sampled state.
    pub state: VehicleState,
}

// ---------------------------------------------------------------------------
// ProposalRejected
// ---------------------------------------------------------------------------

/// Reasons the authority drops a proposal. Rejected proposals are not
/// retried; the owner's next tick sends a fresh sample.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProposalRejected {
    /// The sending connection has no participant.
    #[error("proposal from unknown sender")]
    UnknownSender,
    /// No such vehicle on the authority.
    #[error("unknown vehicle {0:?}")]
    UnknownVehicle(VehicleId),
    /// The sender is not the vehicle's owner.
    #[error("{sender:?} does not own vehicle {vehicle:?}")]
    NotOwner {
        /// Who sent it.
        sender: ParticipantId,
        /// The vehicle they tried to write.
        vehicle: VehicleId,
    },
    /// Replication is switched off (no race running).
    #[error("replication is disabled")]
    Disabled,
    /// The vehicle's driving input is switched off (its owner died).
    #[error("control of {0:?} is disabled")]
    ControlDisabled(VehicleId),
    /// Stamped further ahead of the authority's clock than
    /// [`MAX_CLOCK_LEAD`] allows.
    #[error("sample for {vehicle:?} from the future: {timestamp} > {now}")]
    FromFuture {
        /// The vehicle.
        vehicle: VehicleId,
        /// Timestamp of the rejected sample.
        timestamp: f64,
        /// The authority's session time.
        now: f64,
    },
    /// Older than the state already accepted.
    #[error("stale sample for {vehicle:?}: {timestamp} < {current}")]
    Stale {
        /// The vehicle.
        vehicle: VehicleId,
        /// Timestamp of the rejected sample.
        timestamp: f64,
        /// Timestamp of the stored sample.
        current: f64,
    },
    /// NaN or infinite components.
    #[error("non-finite sample for {0:?}")]
    NonFinite(VehicleId),
}

// ---------------------------------------------------------------------------
// AuthorityReplicator
// ---------------------------------------------------------------------------

/// Authority side of replication: validates proposals and queues accepted
/// samples for rebroadcast. Gated on and off by the session state machine.
#[derive(Debug, Default)]
pub struct AuthorityReplicator {
    enabled: bool,
    dirty: BTreeSet<VehicleId>,
}

impl AuthorityReplicator {
    /// Creates a disabled replicator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens or closes the gate. Closing drops pending broadcasts.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.dirty.clear();
        }
    }

    /// Whether proposals are currently accepted.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Checks a proposal received at session time `now` without applying it.
    pub fn validate(
        &self,
        vehicles: &VehicleWorld,
        sender: ParticipantId,
        update: &VehicleStateUpdate,
        now: f64,
    ) -> Result<(), ProposalRejected> {
        if !self.enabled {
            return Err(ProposalRejected::Disabled);
        }
        let owner = vehicles
            .owner_of(update.vehicle)
            .ok_or(ProposalRejected::UnknownVehicle(update.vehicle))?;
        if owner != sender {
            return Err(ProposalRejected::NotOwner {
                sender,
                vehicle: update.vehicle,
            });
        }
        if !vehicles.is_control_enabled(update.vehicle) {
            return Err(ProposalRejected::ControlDisabled(update.vehicle));
        }
        if !update.state.is_finite() {
            return Err(ProposalRejected::NonFinite(update.vehicle));
        }
        if update.state.timestamp > now + MAX_CLOCK_LEAD {
            return Err(ProposalRejected::FromFuture {
                vehicle: update.vehicle,
                timestamp: update.state.timestamp,
                now,
            });
        }
        if let Some(current) = vehicles.state(update.vehicle)
            && update.state.timestamp < current.timestamp
        {
            return Err(ProposalRejected::Stale {
                vehicle: update.vehicle,
                timestamp: update.state.timestamp,
                current: current.timestamp,
            });
        }
        Ok(())
    }

    /// Validates a proposal and, if legal, makes it the authoritative state.
    pub fn accept_proposal(
        &mut self,
        vehicles: &mut VehicleWorld,
        sender: ParticipantId,
        update: &VehicleStateUpdate,
        now: f64,
    ) -> Result<(), ProposalRejected> {
        self.validate(vehicles, sender, update, now)?;
        vehicles.store_state(update.vehicle, update.state);
        self.dirty.insert(update.vehicle);
        Ok(())
    }

    /// Drops pending work for a despawned vehicle.
    pub fn forget(&mut self, vehicle: VehicleId) {
        self.dirty.remove(&vehicle);
    }

    /// Runs one network tick: every vehicle whose state changed since the
    /// last tick yields one broadcast update.
    pub fn collect_broadcasts(&mut self, vehicles: &VehicleWorld) -> Vec<VehicleStateUpdate> {
        let dirty = std::mem::take(&mut self.dirty);
        dirty
            .into_iter()
            .filter_map(|vehicle| {
                vehicles
                    .state(vehicle)
                    .map(|state| VehicleStateUpdate { vehicle, state })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// VehicleMirror
// ---------------------------------------------------------------------------

/// A non-owning peer's view of a remote vehicle: the read-only mirror of
/// the authoritative sample plus the locally smoothed pose used for
/// rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleMirror {
    /// Pose the vehicle spawned at.
    pub spawn: Pose,
    /// Pose handed to the renderer.
    pub rendered: Pose,
    /// Latest authoritative sample.
    pub last_sample: Option<VehicleState>,
    /// Velocity copied from the latest sample.
    pub velocity: Vec3,
}

impl VehicleMirror {
    /// A mirror that renders at its spawn pose until the first sample.
    pub fn new(spawn: Pose) -> Self {
        Self {
            spawn,
            rendered: spawn,
            last_sample: None,
            velocity: Vec3::ZERO,
        }
    }
}

/// Folds an authoritative update into a mirror. Updates for other vehicles
/// are the caller's concern; samples older than the mirrored one are ignored.
pub fn apply_state_update(mirror: VehicleMirror, update: &VehicleStateUpdate) -> VehicleMirror {
    if let Some(current) = mirror.last_sample
        && update.state.timestamp < current.timestamp
    {
        return mirror;
    }
    VehicleMirror {
        last_sample: Some(update.state),
        velocity: update.state.linear_velocity,
        ..mirror
    }
}

// ---------------------------------------------------------------------------
// PeerReplicator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct RemoteVehicle {
    owner: ParticipantId,
    mirror: VehicleMirror,
}

#[derive(Debug, Clone)]
struct OwnedVehicle {
    spawn: Pose,
    latest: Option<VehicleState>,
}

/// Peer side of replication. Vehicles owned by the local participant are
/// sampled and proposed; every other vehicle is mirrored and smoothed.
#[derive(Debug)]
pub struct PeerReplicator {
    local: ParticipantId,
    params: SmoothingParams,
    owned: BTreeMap<VehicleId, OwnedVehicle>,
    remote: BTreeMap<VehicleId, RemoteVehicle>,
}

impl PeerReplicator {
    /// Creates a replicator for the peer controlling `local`.
    pub fn new(local: ParticipantId, params: SmoothingParams) -> Self {
        Self {
            local,
            params,
            owned: BTreeMap::new(),
            remote: BTreeMap::new(),
        }
    }

    /// The participant this peer plays as.
    pub fn local_participant(&self) -> ParticipantId {
        self.local
    }

    /// Starts tracking a vehicle announced by the authority.
    pub fn on_vehicle_spawned(&mut self, vehicle: VehicleId, owner: ParticipantId, spawn: Pose) {
        if owner == self.local {
            self.owned.insert(
                vehicle,
                OwnedVehicle {
                    spawn,
                    latest: None,
                },
            );
        } else {
            self.remote.insert(
                vehicle,
                RemoteVehicle {
                    owner,
                    mirror: VehicleMirror::new(spawn),
                },
            );
        }
    }

    /// Stops tracking a vehicle.
    pub fn on_vehicle_despawned(&mut self, vehicle: VehicleId) {
        self.owned.remove(&vehicle);
        self.remote.remove(&vehicle);
    }

    /// Applies an authoritative update. Echoes for owned vehicles are
    /// ignored since this peer is their writer.
    pub fn on_state_update(&mut self, update: &VehicleStateUpdate) {
        if let Some(remote) = self.remote.get_mut(&update.vehicle) {
            remote.mirror = apply_state_update(remote.mirror, update);
        }
    }

    /// Routes the replication-related server messages; others are ignored.
    pub fn apply_server_message(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::VehicleSpawned {
                vehicle,
                owner,
                spawn,
            } => self.on_vehicle_spawned(*vehicle, *owner, *spawn),
            ServerMessage::VehicleState(update) => self.on_state_update(update),
            ServerMessage::VehicleDespawned { vehicle } => self.on_vehicle_despawned(*vehicle),
            _ => {}
        }
    }

    /// Records the engine's current state of an owned vehicle. Returns
    /// `false` if the vehicle is not owned by this peer.
    pub fn record_local_sample(&mut self, vehicle: VehicleId, state: VehicleState) -> bool {
        match self.owned.get_mut(&vehicle) {
            Some(owned) => {
                owned.latest = Some(state);
                true
            }
            None => false,
        }
    }

    /// Runs one network tick: proposes the latest sample of every owned
    /// vehicle and advances smoothing for every remote one.
    pub fn tick(&mut self, now: f64) -> Vec<ClientMessage> {
        for remote in self.remote.values_mut() {
            smoothing_step(&mut remote.mirror, now, self.params);
        }
        self.owned
            .iter()
            .filter_map(|(vehicle, owned)| {
                owned.latest.map(|state| {
                    ClientMessage::ProposeVehicleState(VehicleStateUpdate {
                        vehicle: *vehicle,
                        state,
                    })
                })
            })
            .collect()
    }

    /// Pose to render for any tracked vehicle. Owned vehicles render their
    /// own latest sample (or spawn pose); remote ones their smoothed pose.
    pub fn rendered_pose(&self, vehicle: VehicleId) -> Option<Pose> {
        if let Some(owned) = self.owned.get(&vehicle) {
            return Some(owned.latest.map_or(owned.spawn, |s| s.pose()));
        }
        self.remote.get(&vehicle).map(|r| r.mirror.rendered)
    }

    /// The mirror of a remote vehicle.
    pub fn mirror(&self, vehicle: VehicleId) -> Option<&VehicleMirror> {
        self.remote.get(&vehicle).map(|r| &r.mirror)
    }

    /// The owner of a remote vehicle.
    pub fn remote_owner(&self, vehicle: VehicleId) -> Option<ParticipantId> {
        self.remote.get(&vehicle).map(|r| r.owner)
    }

    /// The local participant's vehicle, if it has one.
    pub fn owned_vehicle(&self) -> Option<VehicleId> {
        self.owned.keys().next().copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[path = "replication_tests.rs"]
mod tests;
