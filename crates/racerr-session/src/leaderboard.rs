//! Ranking view of the current race, recomputed on demand.

use serde::{Deserialize, Serialize};

use crate::participant::{ParticipantId, Roster};
use crate::progress::compare_progress;
use crate::session_data::RaceSessionData;

/// How a participant stands in the race.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RowStatus {
    /// Still driving.
    Racing,
    /// Crossed the finish line `time` seconds after the start.
    Finished {
        /// Race time.
        time: f64,
    },
    /// Health ran out.
    Dead,
}

/// One leaderboard line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    /// Who.
    pub participant: ParticipantId,
    /// Display name.
    pub name: String,
    /// 1-based position.
    pub rank: u32,
    /// Racing, finished or dead.
    pub status: RowStatus,
    /// Distinct checkpoints passed.
    pub checkpoints_passed: u32,
}

/// Projects the race into ordered rows. Participants missing from the
/// roster are skipped. Ties keep join order.
pub fn project(data: &RaceSessionData, roster: &Roster) -> Vec<LeaderboardRow> {
    let mut entrants: Vec<_> = data
        .players_in_race()
        .iter()
        .filter_map(|id| roster.get(*id))
        .collect();
    entrants.sort_by(|a, b| compare_progress(&a.progress, &b.progress));

    entrants
        .into_iter()
        .enumerate()
        .map(|(index, participant)| {
            let status = if data.is_dead(participant.id) {
                RowStatus::Dead
            } else if let Some(finish) = participant.progress.finish_time {
                RowStatus::Finished {
                    time: finish - data.race_start_time(),
                }
            } else {
                RowStatus::Racing
            };
            LeaderboardRow {
                participant: participant.id,
                name: participant.name.clone(),
                rank: index as u32 + 1,
                status,
                checkpoints_passed: participant.progress.checkpoint_count() as u32,
            }
        })
        .collect()
}
