//! A peer's read-only view of the session, driven purely by server messages.

use crate::leaderboard::{LeaderboardRow, RowStatus};
use crate::participant::ParticipantId;
use crate::protocol::ServerMessage;
use crate::session_data::RaceSummary;
use crate::state_machine::StateKind;

/// What the local participant is doing, from its own point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalView {
    /// Waiting for a race.
    Idle,
    /// Driving.
    Racing,
    /// Watching: finished, or not part of the running race.
    Spectating,
    /// Health ran out during the race.
    Dead,
    /// Looking at results.
    Intermission,
}

/// Everything a peer shows about the session.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientView {
    /// Who this peer plays as, once welcomed.
    pub local: Option<ParticipantId>,
    /// The authority's state.
    pub server_state: StateKind,
    /// The local sub-state.
    pub view: LocalView,
    /// Race time elapsed.
    pub race_elapsed: f64,
    /// Race countdown; negative once the deadline passed.
    pub race_remaining: f64,
    /// Countdown to the next race during intermission.
    pub intermission_remaining: f64,
    /// Last leaderboard received.
    pub leaderboard: Vec<LeaderboardRow>,
    /// Results of the last completed race.
    pub results: Option<RaceSummary>,
}

impl ClientView {
    /// The view before any message arrives.
    pub fn new() -> Self {
        Self {
            local: None,
            server_state: StateKind::Idle,
            view: LocalView::Idle,
            race_elapsed: 0.0,
            race_remaining: 0.0,
            intermission_remaining: 0.0,
            leaderboard: Vec::new(),
            results: None,
        }
    }

    /// The local participant's leaderboard row.
    pub fn local_row(&self) -> Option<&LeaderboardRow> {
        let local = self.local?;
        self.leaderboard.iter().find(|row| row.participant == local)
    }
}

impl Default for ClientView {
    fn default() -> Self {
        Self::new()
    }
}

/// Folds one server message into the view.
pub fn apply_server_message(view: ClientView, message: &ServerMessage) -> ClientView {
    match message {
        ServerMessage::Welcome { participant } => ClientView {
            local: Some(*participant),
            ..view
        },
        ServerMessage::StateChanged { state, .. } => {
            let local_view = match state {
                StateKind::Idle => LocalView::Idle,
                StateKind::Racing => LocalView::Racing,
                StateKind::Intermission => LocalView::Intermission,
            };
            ClientView {
                server_state: *state,
                view: local_view,
                race_elapsed: 0.0,
                race_remaining: 0.0,
                intermission_remaining: 0.0,
                ..view
            }
        }
        ServerMessage::RaceClock { elapsed, remaining } => ClientView {
            race_elapsed: *elapsed,
            race_remaining: *remaining,
            ..view
        },
        ServerMessage::IntermissionClock { remaining } => ClientView {
            intermission_remaining: *remaining,
            ..view
        },
        ServerMessage::Leaderboard(rows) => {
            let mut next = ClientView {
                leaderboard: rows.clone(),
                ..view
            };
            if next.server_state == StateKind::Racing && next.view == LocalView::Racing {
                next.view = match next.local_row().map(|row| row.status) {
                    Some(RowStatus::Racing) => LocalView::Racing,
                    Some(RowStatus::Finished { .. }) | None => LocalView::Spectating,
                    Some(RowStatus::Dead) => LocalView::Dead,
                };
            }
            next
        }
        ServerMessage::RaceResults(summary) => ClientView {
            leaderboard: summary.leaderboard.clone(),
            results: Some(summary.clone()),
            ..view
        },
        ServerMessage::VehicleSpawned { .. }
        | ServerMessage::VehicleState(_)
        | ServerMessage::VehicleDespawned { .. } => view,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u64, status: RowStatus) -> LeaderboardRow {
        LeaderboardRow {
            participant: ParticipantId(id),
            name: format!("p{id}"),
            rank: 1,
            status,
            checkpoints_passed: 0,
        }
    }

    fn racing_view(local: u64) -> ClientView {
        let view = apply_server_message(
            ClientView::new(),
            &ServerMessage::Welcome {
                participant: ParticipantId(local),
            },
        );
        apply_server_message(
            view,
            &ServerMessage::StateChanged {
                state: StateKind::Racing,
                at: 1.0,
            },
        )
    }

    #[test]
    fn test_state_change_switches_local_view() {
        let view = racing_view(1);
        assert_eq!(view.view, LocalView::Racing);
        let view = apply_server_message(
            view,
            &ServerMessage::StateChanged {
                state: StateKind::Intermission,
                at: 9.0,
            },
        );
        assert_eq!(view.view, LocalView::Intermission);
        assert_eq!(view.server_state, StateKind::Intermission);
    }

    #[test]
    fn test_finishing_moves_to_spectate() {
        let view = apply_server_message(
            racing_view(1),
            &ServerMessage::Leaderboard(vec![row(1, RowStatus::Finished { time: 12.0 })]),
        );
        assert_eq!(view.view, LocalView::Spectating);
    }

    #[test]
    fn test_dying_moves_to_death_view() {
        let view = apply_server_message(
            racing_view(1),
            &ServerMessage::Leaderboard(vec![row(2, RowStatus::Racing), row(1, RowStatus::Dead)]),
        );
        assert_eq!(view.view, LocalView::Dead);
        // A later board does not resurrect.
        let view = apply_server_message(
            view,
            &ServerMessage::Leaderboard(vec![row(1, RowStatus::Racing)]),
        );
        assert_eq!(view.view, LocalView::Dead);
    }

    #[test]
    fn test_late_joiner_spectates() {
        let view = apply_server_message(
            racing_view(5),
            &ServerMessage::Leaderboard(vec![row(1, RowStatus::Racing)]),
        );
        assert_eq!(view.view, LocalView::Spectating);
    }

    #[test]
    fn test_clock_messages_update_timers() {
        let view = apply_server_message(
            racing_view(1),
            &ServerMessage::RaceClock {
                elapsed: 12.5,
                remaining: -0.5,
            },
        );
        assert_eq!(view.race_elapsed, 12.5);
        assert_eq!(view.race_remaining, -0.5);
        let view = apply_server_message(view, &ServerMessage::IntermissionClock { remaining: 4.0 });
        assert_eq!(view.intermission_remaining, 4.0);
    }
}
