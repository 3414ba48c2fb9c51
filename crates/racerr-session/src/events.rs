//! Typed events from the engine/physics collaborator.
//!
//! The engine enqueues events as its trigger and collision callbacks fire;
//! the session drains the queue once per session tick.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::participant::ParticipantId;
use crate::progress::CheckpointId;

/// Something the physics engine observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A participant's vehicle entered a checkpoint trigger.
    CheckpointPassed {
        /// Whose vehicle passed.
        participant: ParticipantId,
        /// Which checkpoint.
        checkpoint: CheckpointId,
        /// Per-participant send order.
        sequence: u64,
    },
    /// A participant's vehicle hit another vehicle or the environment.
    CollisionDamage {
        /// Who took the hit.
        participant: ParticipantId,
        /// Health to subtract.
        amount: u32,
    },
    /// Latest distance from a participant's vehicle to its next checkpoint.
    CheckpointDistance {
        /// Whose vehicle was measured.
        participant: ParticipantId,
        /// Distance in world units.
        distance: f32,
    },
}

impl EngineEvent {
    /// The participant the event is about.
    pub fn participant(&self) -> ParticipantId {
        match self {
            Self::CheckpointPassed { participant, .. }
            | Self::CollisionDamage { participant, .. }
            | Self::CheckpointDistance { participant, .. } => *participant,
        }
    }

    fn pass_sequence(&self) -> Option<u64> {
        match self {
            Self::CheckpointPassed { sequence, .. } => Some(*sequence),
            _ => None,
        }
    }
}

/// FIFO of engine events awaiting the next session tick.
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: Vec<EngineEvent>,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues an event for the next tick.
    pub fn push(&mut self, event: EngineEvent) {
        self.pending.push(event);
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Takes every pending event. Each participant's checkpoint passes come
    /// out in sequence order; every other event keeps its arrival slot.
    pub fn drain(&mut self) -> Vec<EngineEvent> {
        let mut events = std::mem::take(&mut self.pending);

        let mut slots: HashMap<ParticipantId, Vec<usize>> = HashMap::new();
        for (index, event) in events.iter().enumerate() {
            if event.pass_sequence().is_some() {
                slots.entry(event.participant()).or_default().push(index);
            }
        }

        for indices in slots.values() {
            if indices.len() < 2 {
                continue;
            }
            let mut passes: Vec<EngineEvent> = indices.iter().map(|&i| events[i].clone()).collect();
            passes.sort_by_key(|e| e.pass_sequence());
            for (&index, pass) in indices.iter().zip(passes) {
                events[index] = pass;
            }
        }

        events
    }
}
