//! Server-authoritative race sessions: participants, checkpoint progress,
//! the Idle/Racing/Intermission state machine, leaderboard projection, and
//! vehicle state replication with client-side smoothing.

pub mod client;
pub mod clock;
pub mod events;
pub mod idle_state;
pub mod intermission_state;
pub mod leaderboard;
pub mod membership;
pub mod participant;
pub mod prediction;
pub mod progress;
pub mod protocol;
pub mod race_state;
pub mod replication;
pub mod server;
pub mod session_data;
pub mod state_machine;
pub mod vehicle;

pub use client::{ClientView, LocalView, apply_server_message};
pub use clock::{MAX_FRAME_TIME, TickSchedule, clamp_frame_time};
pub use events::{EngineEvent, EventQueue};
pub use idle_state::IdleState;
pub use intermission_state::IntermissionState;
pub use leaderboard::{LeaderboardRow, RowStatus, project};
pub use membership::{MembershipError, MembershipManager};
pub use participant::{ConnectionId, Participant, ParticipantId, Roster};
pub use prediction::{SmoothingParams, blend_pose, predict_position, smoothing_step};
pub use progress::{
    CheckpointId, ProgressInfo, SequenceGuard, TrackError, TrackLayout, compare_progress,
};
pub use protocol::{
    ClientMessage, Envelope, MessageError, Outbox, PROTOCOL_VERSION, Recipient, ServerMessage,
    deserialize_message, serialize_message,
};
pub use race_state::RaceState;
pub use replication::{
    AuthorityReplicator, MAX_CLOCK_LEAD, PeerReplicator, ProposalRejected, VehicleMirror,
    VehicleStateUpdate, apply_state_update,
};
pub use server::{RaceServer, RequestError};
pub use session_data::{RaceSessionData, RaceSummary};
pub use state_machine::{
    ServerState, ServerStateMachine, SessionContext, SessionState, StateKind, Transition,
};
pub use vehicle::{Pose, VehicleId, VehicleState, VehicleWorld};
