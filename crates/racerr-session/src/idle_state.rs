//! Waiting for enough ready participants.

use tracing::debug;

use crate::state_machine::{SessionContext, SessionState, StateKind, Transition};

/// No race is running. Engine events are discarded.
#[derive(Debug, Default)]
pub struct IdleState;

impl IdleState {
    /// Creates the state.
    pub fn new() -> Self {
        Self
    }
}

impl SessionState for IdleState {
    fn kind(&self) -> StateKind {
        StateKind::Idle
    }

    fn enter(&mut self, ctx: &mut SessionContext<'_>) {
        ctx.replication.set_enabled(false);
    }

    fn tick(&mut self, ctx: &mut SessionContext<'_>) -> Option<Transition> {
        if !ctx.events.is_empty() {
            debug!("Dropping {} engine events while idle", ctx.events.len());
            ctx.events.clear();
        }

        let ready = ctx.roster.ready_ids().len();
        let needed = (ctx.config.min_ready_participants as usize).max(1);
        (ready >= needed).then_some(Transition::ToRacing)
    }

    fn exit(&mut self, _ctx: &mut SessionContext<'_>) {}
}
