//! Participants and the active roster.

use serde::{Deserialize, Serialize};

use crate::progress::ProgressInfo;
use crate::vehicle::VehicleId;

/// Identity handle for a participant, allocated by the membership manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub u64);

/// Transport-level connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

/// A connected player. Lives in the [`Roster`] for as long as the connection
/// does; race membership is tracked separately by the race state.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    /// Identity handle.
    pub id: ParticipantId,
    /// Connection this participant is bound to.
    pub connection: ConnectionId,
    /// Display name shown on the leaderboard.
    pub name: String,
    /// Set by the "ready to race" signal.
    pub ready: bool,
    /// The vehicle this participant controls, if it still has one.
    pub vehicle: Option<VehicleId>,
    /// Remaining health, never below zero.
    pub health: u32,
    /// Checkpoint progress for the current race.
    pub progress: ProgressInfo,
}

impl Participant {
    /// Creates a participant with full health and no vehicle.
    pub fn new(
        id: ParticipantId,
        connection: ConnectionId,
        name: impl Into<String>,
        max_health: u32,
    ) -> Self {
        Self {
            id,
            connection,
            name: name.into(),
            ready: false,
            vehicle: None,
            health: max_health,
            progress: ProgressInfo::new(0.0),
        }
    }

    /// A participant is dead once its health reaches zero.
    pub fn is_dead(&self) -> bool {
        self.health == 0
    }

    /// Subtracts `amount` from health, clamping at zero. Returns `true` only
    /// on the hit that takes the participant from alive to dead.
    pub fn apply_damage(&mut self, amount: u32) -> bool {
        let was_alive = !self.is_dead();
        self.health = self.health.saturating_sub(amount);
        was_alive && self.is_dead()
    }

    /// Restores health and clears progress at the start of a race.
    pub fn reset_for_race(&mut self, start_time: f64, max_health: u32) {
        self.health = max_health;
        self.progress = ProgressInfo::new(start_time);
    }
}

/// Connected participants in join order.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    participants: Vec<Participant>,
}

impl Roster {
    /// Creates an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a participant. The caller guarantees the id is unique.
    pub fn push(&mut self, participant: Participant) {
        self.participants.push(participant);
    }

    /// Removes and returns a participant, preserving the order of the rest.
    pub fn remove(&mut self, id: ParticipantId) -> Option<Participant> {
        let index = self.participants.iter().position(|p| p.id == id)?;
        Some(self.participants.remove(index))
    }

    /// Looks up a participant by id.
    pub fn get(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Mutably looks up a participant by id.
    pub fn get_mut(&mut self, id: ParticipantId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    /// Looks up the participant bound to a connection.
    pub fn by_connection(&self, connection: ConnectionId) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.connection == connection)
    }

    /// Iterates participants in join order.
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter()
    }

    /// Ids of ready participants, in join order.
    pub fn ready_ids(&self) -> Vec<ParticipantId> {
        self.participants
            .iter()
            .filter(|p| p.ready)
            .map(|p| p.id)
            .collect()
    }

    /// Number of connected participants.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Returns `true` if nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(id: u64) -> Participant {
        Participant::new(ParticipantId(id), ConnectionId(id * 10), format!("p{id}"), 100)
    }

    #[test]
    fn test_damage_clamps_at_zero_and_reports_death_once() {
        let mut p = participant(1);
        assert!(!p.apply_damage(60));
        assert_eq!(p.health, 40);
        assert!(p.apply_damage(60));
        assert_eq!(p.health, 0);
        assert!(p.is_dead());
        // Already dead: further hits are not a new death.
        assert!(!p.apply_damage(10));
        assert_eq!(p.health, 0);
    }

    #[test]
    fn test_reset_for_race_restores_health() {
        let mut p = participant(1);
        p.apply_damage(100);
        p.reset_for_race(12.5, 100);
        assert_eq!(p.health, 100);
        assert_eq!(p.progress.start_time, 12.5);
        assert!(!p.progress.is_finished());
    }

    #[test]
    fn test_roster_keeps_join_order_after_removal() {
        let mut roster = Roster::new();
        for id in 1..=4 {
            roster.push(participant(id));
        }
        roster.remove(ParticipantId(2)).unwrap();
        let ids: Vec<u64> = roster.iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert!(roster.remove(ParticipantId(2)).is_none());
        assert_eq!(roster.by_connection(ConnectionId(30)).unwrap().id, ParticipantId(3));
    }

    #[test]
    fn test_ready_ids_in_join_order() {
        let mut roster = Roster::new();
        for id in 1..=3 {
            roster.push(participant(id));
        }
        roster.get_mut(ParticipantId(3)).unwrap().ready = true;
        roster.get_mut(ParticipantId(1)).unwrap().ready = true;
        assert_eq!(roster.ready_ids(), vec![ParticipantId(1), ParticipantId(3)]);
    }
}
