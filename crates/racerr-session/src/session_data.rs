//! Per-race bookkeeping owned by the racing state.

use serde::{Deserialize, Serialize};

use crate::leaderboard::LeaderboardRow;
use crate::participant::ParticipantId;

/// Who is in the current race and how they left it.
///
/// `finished` and `dead` are disjoint subsets of `players`. Order of
/// `players` is join order; order of `finished` is finish order.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceSessionData {
    race_start_time: f64,
    players: Vec<ParticipantId>,
    finished: Vec<ParticipantId>,
    dead: Vec<ParticipantId>,
}

impl RaceSessionData {
    /// Starts a race at `race_start_time` with `players` (duplicates dropped,
    /// first occurrence kept).
    pub fn new(race_start_time: f64, players: impl IntoIterator<Item = ParticipantId>) -> Self {
        let mut unique = Vec::new();
        for id in players {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        Self {
            race_start_time,
            players: unique,
            finished: Vec::new(),
            dead: Vec::new(),
        }
    }

    /// Session time the race started.
    pub fn race_start_time(&self) -> f64 {
        self.race_start_time
    }

    /// Participants still in the race, in join order.
    pub fn players_in_race(&self) -> &[ParticipantId] {
        &self.players
    }

    /// Finished participants, in finish order.
    pub fn finished_players(&self) -> &[ParticipantId] {
        &self.finished
    }

    /// Dead participants, in death order.
    pub fn dead_players(&self) -> &[ParticipantId] {
        &self.dead
    }

    /// Whether `id` is in the race at all.
    pub fn contains(&self, id: ParticipantId) -> bool {
        self.players.contains(&id)
    }

    /// Whether `id` has finished.
    pub fn is_finished(&self, id: ParticipantId) -> bool {
        self.finished.contains(&id)
    }

    /// Whether `id` has died.
    pub fn is_dead(&self, id: ParticipantId) -> bool {
        self.dead.contains(&id)
    }

    /// In the race and still driving: neither finished nor dead.
    pub fn is_racing(&self, id: ParticipantId) -> bool {
        self.contains(id) && !self.is_finished(id) && !self.is_dead(id)
    }

    /// Moves a racing participant into the finished list. Returns `false`
    /// if it was not racing.
    pub fn mark_finished(&mut self, id: ParticipantId) -> bool {
        if !self.is_racing(id) {
            return false;
        }
        self.finished.push(id);
        true
    }

    /// Moves a racing participant into the dead list. Returns `false` if it
    /// was not racing.
    pub fn mark_dead(&mut self, id: ParticipantId) -> bool {
        if !self.is_racing(id) {
            return false;
        }
        self.dead.push(id);
        true
    }

    /// Drops a participant from the race and both subsets. Returns `false`
    /// if it was not in the race.
    pub fn remove_player(&mut self, id: ParticipantId) -> bool {
        let before = self.players.len();
        self.players.retain(|p| *p != id);
        self.finished.retain(|p| *p != id);
        self.dead.retain(|p| *p != id);
        self.players.len() != before
    }

    /// Returns `true` once every participant has left.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Every remaining participant is finished or dead.
    pub fn all_done(&self) -> bool {
        self.finished.len() + self.dead.len() == self.players.len()
    }

    /// Seconds since the race started.
    pub fn current_duration(&self, now: f64) -> f64 {
        now - self.race_start_time
    }
}

/// Snapshot of a finished race, handed to intermission and broadcast to
/// peers as the results screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceSummary {
    /// Session time the race started.
    pub race_start_time: f64,
    /// How long the race ran.
    pub duration: f64,
    /// Final roster, join order.
    pub players_in_race: Vec<ParticipantId>,
    /// Finish order.
    pub finished_players: Vec<ParticipantId>,
    /// Final standings.
    pub leaderboard: Vec<LeaderboardRow>,
}

impl RaceSummary {
    /// Captures `data` at `now` with the final standings.
    pub fn capture(data: &RaceSessionData, now: f64, leaderboard: Vec<LeaderboardRow>) -> Self {
        Self {
            race_start_time: data.race_start_time,
            duration: data.current_duration(now),
            players_in_race: data.players.clone(),
            finished_players: data.finished.clone(),
            leaderboard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u64]) -> Vec<ParticipantId> {
        raw.iter().copied().map(ParticipantId).collect()
    }

    #[test]
    fn test_new_drops_duplicates_keeping_join_order() {
        let data = RaceSessionData::new(5.0, ids(&[3, 1, 3, 2, 1]));
        assert_eq!(data.players_in_race(), ids(&[3, 1, 2]).as_slice());
        assert_eq!(data.race_start_time(), 5.0);
    }

    #[test]
    fn test_finished_and_dead_stay_disjoint() {
        let mut data = RaceSessionData::new(0.0, ids(&[1, 2]));
        assert!(data.mark_finished(ParticipantId(1)));
        assert!(!data.mark_dead(ParticipantId(1)), "finished cannot die");
        assert!(data.mark_dead(ParticipantId(2)));
        assert!(!data.mark_finished(ParticipantId(2)), "dead cannot finish");
        assert!(!data.mark_finished(ParticipantId(9)), "not in race");
        assert_eq!(data.finished_players(), ids(&[1]).as_slice());
        assert_eq!(data.dead_players(), ids(&[2]).as_slice());
        assert!(data.all_done());
    }

    #[test]
    fn test_finishing_is_monotonic() {
        let mut data = RaceSessionData::new(0.0, ids(&[1, 2]));
        data.mark_finished(ParticipantId(1));
        assert!(!data.is_racing(ParticipantId(1)));
        assert!(!data.mark_finished(ParticipantId(1)));
        assert_eq!(data.finished_players().len(), 1);
    }

    #[test]
    fn test_remove_player_clears_subsets() {
        let mut data = RaceSessionData::new(0.0, ids(&[1, 2, 3]));
        data.mark_finished(ParticipantId(1));
        data.mark_dead(ParticipantId(2));
        assert!(data.remove_player(ParticipantId(1)));
        assert!(data.remove_player(ParticipantId(2)));
        assert!(!data.remove_player(ParticipantId(2)));
        assert!(data.finished_players().is_empty());
        assert!(data.dead_players().is_empty());
        assert!(!data.all_done(), "3 still racing");
        assert!(data.remove_player(ParticipantId(3)));
        assert!(data.is_empty());
    }

    #[test]
    fn test_summary_capture() {
        let mut data = RaceSessionData::new(10.0, ids(&[1, 2]));
        data.mark_finished(ParticipantId(2));
        let summary = RaceSummary::capture(&data, 55.0, Vec::new());
        assert_eq!(summary.duration, 45.0);
        assert_eq!(summary.finished_players, ids(&[2]));
        assert_eq!(summary.players_in_race, ids(&[1, 2]));
    }
}
