//! Authoritative vehicle records.
//!
//! The authority keeps one ECS entity per spawned vehicle in a
//! [`VehicleWorld`]. Each entity carries the vehicle's network id, its owner,
//! whether driving input is accepted, the pose it spawned at, and the last
//! replicated sample the authority accepted.

use std::collections::BTreeMap;

use bevy_ecs::prelude::*;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::participant::ParticipantId;

// ---------------------------------------------------------------------------
// Replicated data
// ---------------------------------------------------------------------------

/// Network identifier of a vehicle, allocated by the authority.
#[derive(
    Component, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct VehicleId(pub u64);

/// Position and orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// World-space position.
    pub position: Vec3,
    /// World-space rotation.
    pub rotation: Quat,
}

impl Pose {
    /// A pose at `position` with identity rotation.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }
}

/// Replicated motion state of a vehicle at `timestamp` (session seconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    /// World-space position.
    pub position: Vec3,
    /// World-space rotation.
    pub rotation: Quat,
    /// Linear velocity in world units per second.
    pub linear_velocity: Vec3,
    /// When the owner sampled this state.
    pub timestamp: f64,
}

impl VehicleState {
    /// The pose part of the state.
    pub fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            rotation: self.rotation,
        }
    }

    /// Whether every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.rotation.is_finite()
            && self.linear_velocity.is_finite()
            && self.timestamp.is_finite()
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// The participant allowed to write this vehicle's state.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleOwner(pub ParticipantId);

/// Whether the owner's driving input is applied.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlEnabled(pub bool);

/// Where the vehicle was placed when spawned.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct SpawnPose(pub Pose);

/// Last state accepted from the owner; `None` until the first sample.
#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
pub struct AuthoritativeState(pub Option<VehicleState>);

// ---------------------------------------------------------------------------
// VehicleWorld
// ---------------------------------------------------------------------------

/// The authority's canonical vehicle storage. Wraps a Bevy ECS [`World`] and
/// an index from [`VehicleId`] to entity. Every operation on an absent
/// vehicle is a no-op.
#[derive(Debug)]
pub struct VehicleWorld {
    world: World,
    entities: BTreeMap<VehicleId, Entity>,
    next_id: u64,
}

impl VehicleWorld {
    /// Creates an empty world.
    pub fn new() -> Self {
        Self {
            world: World::new(),
            entities: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Spawns a vehicle for `owner` at `pose`, with control disabled.
    pub fn spawn(&mut self, owner: ParticipantId, pose: Pose) -> VehicleId {
        let id = VehicleId(self.next_id);
        self.next_id += 1;
        let entity = self
            .world
            .spawn((
                id,
                VehicleOwner(owner),
                ControlEnabled(false),
                SpawnPose(pose),
                AuthoritativeState::default(),
            ))
            .id();
        self.entities.insert(id, entity);
        id
    }

    /// Removes a vehicle. Returns `false` if it did not exist.
    pub fn despawn(&mut self, id: VehicleId) -> bool {
        match self.entities.remove(&id) {
            Some(entity) => self.world.despawn(entity),
            None => false,
        }
    }

    /// Whether the vehicle exists.
    pub fn contains(&self, id: VehicleId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Number of live vehicles.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no vehicle exists.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Live vehicle ids in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = VehicleId> + '_ {
        self.entities.keys().copied()
    }

    /// The owner of a vehicle.
    pub fn owner_of(&self, id: VehicleId) -> Option<ParticipantId> {
        self.component::<VehicleOwner>(id).map(|o| o.0)
    }

    /// Where the vehicle spawned.
    pub fn spawn_pose(&self, id: VehicleId) -> Option<Pose> {
        self.component::<SpawnPose>(id).map(|s| s.0)
    }

    /// Last accepted state, if any sample has been accepted yet.
    pub fn state(&self, id: VehicleId) -> Option<VehicleState> {
        self.component::<AuthoritativeState>(id).and_then(|s| s.0)
    }

    /// Whether driving input is currently applied. Absent vehicles are not.
    pub fn is_control_enabled(&self, id: VehicleId) -> bool {
        self.component::<ControlEnabled>(id).is_some_and(|c| c.0)
    }

    /// Enables or disables driving input. Returns `false` for absent vehicles.
    pub fn set_control_enabled(&mut self, id: VehicleId, enabled: bool) -> bool {
        let Some(&entity) = self.entities.get(&id) else {
            return false;
        };
        match self.world.get_mut::<ControlEnabled>(entity) {
            Some(mut control) => {
                control.0 = enabled;
                true
            }
            None => false,
        }
    }

    /// Overwrites the authoritative state. Returns `false` for absent vehicles.
    pub fn store_state(&mut self, id: VehicleId, state: VehicleState) -> bool {
        let Some(&entity) = self.entities.get(&id) else {
            return false;
        };
        match self.world.get_mut::<AuthoritativeState>(entity) {
            Some(mut stored) => {
                stored.0 = Some(state);
                true
            }
            None => false,
        }
    }

    fn component<T: Component>(&self, id: VehicleId) -> Option<&T> {
        let entity = self.entities.get(&id)?;
        self.world.get::<T>(*entity)
    }
}

impl Default for VehicleWorld {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
