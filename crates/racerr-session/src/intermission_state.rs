//! Post-race results window.

use tracing::debug;

use crate::protocol::ServerMessage;
use crate::session_data::RaceSummary;
use crate::state_machine::{SessionContext, SessionState, StateKind, Transition};

/// Shows the previous race's results until `intermission_secs` have passed,
/// then returns to Idle.
#[derive(Debug)]
pub struct IntermissionState {
    summary: RaceSummary,
    ends_at: f64,
}

impl IntermissionState {
    /// Holds `summary` for display. The window is timed from `enter`.
    pub fn new(summary: RaceSummary) -> Self {
        Self {
            summary,
            ends_at: f64::INFINITY,
        }
    }

    /// The results on display.
    pub fn summary(&self) -> &RaceSummary {
        &self.summary
    }

    /// Seconds until the next race may start.
    pub fn remaining(&self, now: f64) -> f64 {
        self.ends_at - now
    }
}

impl SessionState for IntermissionState {
    fn kind(&self) -> StateKind {
        StateKind::Intermission
    }

    fn enter(&mut self, ctx: &mut SessionContext<'_>) {
        self.ends_at = ctx.now + ctx.config.intermission_secs;
        ctx.outbox
            .broadcast(ServerMessage::RaceResults(self.summary.clone()));
    }

    fn tick(&mut self, ctx: &mut SessionContext<'_>) -> Option<Transition> {
        if !ctx.events.is_empty() {
            debug!("Dropping {} engine events during intermission", ctx.events.len());
            ctx.events.clear();
        }

        let remaining = self.remaining(ctx.now);
        if remaining <= 0.0 {
            return Some(Transition::ToIdle);
        }
        ctx.outbox
            .broadcast(ServerMessage::Leaderboard(self.summary.leaderboard.clone()));
        ctx.outbox
            .broadcast(ServerMessage::IntermissionClock { remaining });
        None
    }

    fn exit(&mut self, _ctx: &mut SessionContext<'_>) {}
}
