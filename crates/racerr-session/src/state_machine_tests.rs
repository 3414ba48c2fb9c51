//! Session state machine tests, driven through the assembled server.

use super::*;
use crate::events::EngineEvent;
use crate::leaderboard::RowStatus;
use crate::participant::ConnectionId;
use crate::progress::CheckpointId;
use crate::protocol::{Envelope, Recipient};
use crate::replication::{ProposalRejected, VehicleStateUpdate};
use crate::server::RaceServer;
use crate::vehicle::VehicleState;
use glam::{Quat, Vec3};
use racerr_config::Config;

/// Helper: a server on a three-checkpoint track (finish line is 2) with
/// `n` connected, ready participants.
fn ready_server(n: u64) -> (RaceServer, Vec<ParticipantId>) {
    let track = TrackLayout::sequential(3).unwrap();
    let mut server = RaceServer::new(&Config::default(), track);
    let mut ids = Vec::new();
    for i in 1..=n {
        let id = server
            .on_connect(ConnectionId(i), &format!("racer{i}"))
            .unwrap();
        server.on_ready(ConnectionId(i), true).unwrap();
        ids.push(id);
    }
    (server, ids)
}

/// Helper: starts the race at t = 0.
fn racing_server(n: u64) -> (RaceServer, Vec<ParticipantId>) {
    let (mut server, ids) = ready_server(n);
    server.session_tick(0.0);
    assert_eq!(server.state_kind(), StateKind::Racing);
    (server, ids)
}

fn pass(server: &mut RaceServer, participant: ParticipantId, checkpoint: u32, sequence: u64) {
    server.enqueue_event(EngineEvent::CheckpointPassed {
        participant,
        checkpoint: CheckpointId(checkpoint),
        sequence,
    });
}

/// Queues passes of every checkpoint for `participant`, finish line last.
fn drive_to_finish(server: &mut RaceServer, participant: ParticipantId) {
    for checkpoint in 0..3 {
        pass(server, participant, checkpoint, u64::from(checkpoint) + 1);
    }
}

fn kill(server: &mut RaceServer, participant: ParticipantId) {
    server.enqueue_event(EngineEvent::CollisionDamage {
        participant,
        amount: 1000,
    });
}

fn race(server: &RaceServer) -> &RaceState {
    server.machine().race().expect("race should be running")
}

fn broadcast_states(envelopes: &[Envelope]) -> Vec<StateKind> {
    envelopes
        .iter()
        .filter(|e| e.to == Recipient::All)
        .filter_map(|e| match &e.message {
            ServerMessage::StateChanged { state, .. } => Some(*state),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Starting
// ---------------------------------------------------------------------------

#[test]
fn test_idle_waits_for_a_ready_participant() {
    let track = TrackLayout::sequential(3).unwrap();
    let mut server = RaceServer::new(&Config::default(), track);
    server.session_tick(0.0);
    assert_eq!(server.state_kind(), StateKind::Idle);

    server.on_connect(ConnectionId(1), "solo").unwrap();
    server.session_tick(0.02);
    assert_eq!(server.state_kind(), StateKind::Idle, "connected but not ready");

    server.on_ready(ConnectionId(1), true).unwrap();
    server.session_tick(0.04);
    assert_eq!(server.state_kind(), StateKind::Racing);
}

#[test]
fn test_race_start_spawns_on_grid_and_enables_control() {
    let (mut server, ids) = racing_server(3);

    assert_eq!(race(&server).finish_deadline(), 90.0);
    assert_eq!(race(&server).data().players_in_race(), ids.as_slice());
    assert!(server.replication_enabled());

    let expected_z = [10.0, 20.0, 30.0];
    for (id, z) in ids.iter().zip(expected_z) {
        let vehicle = server.roster().get(*id).unwrap().vehicle.unwrap();
        let spawn = server.vehicles().spawn_pose(vehicle).unwrap();
        assert_eq!(spawn.position, Vec3::new(0.0, 1.0, z));
        assert!(spawn.position.is_finite());
        assert!(server.vehicles().is_control_enabled(vehicle));
        assert_eq!(server.vehicles().owner_of(vehicle), Some(*id));
    }

    let out = server.drain_outbox();
    assert_eq!(broadcast_states(&out), vec![StateKind::Racing]);
    let spawned = out
        .iter()
        .filter(|e| matches!(e.message, ServerMessage::VehicleSpawned { .. }))
        .count();
    assert_eq!(spawned, 3);
}

#[test]
fn test_only_ready_participants_race() {
    let (mut server, ids) = ready_server(2);
    let spectator = server.on_connect(ConnectionId(9), "watcher").unwrap();
    server.session_tick(0.0);

    assert_eq!(race(&server).data().players_in_race(), ids.as_slice());
    assert!(server.roster().get(spectator).unwrap().vehicle.is_none());
}

#[test]
fn test_events_while_idle_are_discarded() {
    let (mut server, ids) = ready_server(1);
    pass(&mut server, ids[0], 0, 1);
    server.session_tick(0.0);
    assert_eq!(server.state_kind(), StateKind::Racing);
    server.session_tick(0.02);
    let progress = &server.roster().get(ids[0]).unwrap().progress;
    assert_eq!(progress.checkpoint_count(), 0);
}

// ---------------------------------------------------------------------------
// Deadline
// ---------------------------------------------------------------------------

#[test]
fn test_grace_deadline_only_shrinks() {
    let (mut server, ids) = racing_server(3);
    let (a, b) = (ids[0], ids[1]);

    drive_to_finish(&mut server, a);
    server.session_tick(10.0);
    assert_eq!(race(&server).finish_deadline(), 40.0);
    assert_eq!(race(&server).remaining_race_time(server.now()), 30.0);

    drive_to_finish(&mut server, b);
    server.session_tick(20.0);
    assert_eq!(race(&server).finish_deadline(), 40.0, "second finish keeps 40");

    server.session_tick(39.9);
    assert_eq!(server.state_kind(), StateKind::Racing);

    server.session_tick(40.0);
    assert_eq!(server.state_kind(), StateKind::Intermission);
}

#[test]
fn test_deadline_not_extended_near_the_end() {
    let (mut server, ids) = racing_server(2);
    drive_to_finish(&mut server, ids[0]);
    server.session_tick(80.0);
    assert_eq!(race(&server).finish_deadline(), 90.0);
}

#[test]
fn test_timeout_without_finishers_goes_to_intermission() {
    let (mut server, _) = racing_server(2);
    server.session_tick(89.98);
    assert_eq!(server.state_kind(), StateKind::Racing);
    server.session_tick(90.0);
    assert_eq!(server.state_kind(), StateKind::Intermission);
    let results = server.machine().intermission().unwrap().summary();
    assert!(results.finished_players.is_empty());
    assert_eq!(results.duration, 90.0);
}

#[test]
fn test_clock_published_every_tick() {
    let (mut server, _) = racing_server(1);
    server.drain_outbox();
    server.session_tick(5.0);
    let out = server.drain_outbox();
    let clock = out.iter().find_map(|e| match e.message {
        ServerMessage::RaceClock { elapsed, remaining } => Some((elapsed, remaining)),
        _ => None,
    });
    assert_eq!(clock, Some((5.0, 85.0)));
    assert!(
        out.iter()
            .any(|e| matches!(e.message, ServerMessage::Leaderboard(_)))
    );
}

// ---------------------------------------------------------------------------
// Ending
// ---------------------------------------------------------------------------

#[test]
fn test_everyone_leaving_goes_idle_even_with_finishers() {
    let (mut server, ids) = racing_server(2);
    drive_to_finish(&mut server, ids[0]);
    server.session_tick(10.0);
    assert_eq!(race(&server).data().finished_players(), &ids[..1]);

    server.on_disconnect(ConnectionId(1)).unwrap();
    server.on_disconnect(ConnectionId(2)).unwrap();
    server.drain_outbox();

    server.session_tick(10.02);
    assert_eq!(server.state_kind(), StateKind::Idle);
    assert_eq!(broadcast_states(&server.drain_outbox()), vec![StateKind::Idle]);
    assert!(server.vehicles().is_empty());
    assert!(!server.replication_enabled());
}

#[test]
fn test_all_finished_or_dead_goes_to_intermission() {
    let (mut server, ids) = racing_server(3);
    drive_to_finish(&mut server, ids[0]);
    kill(&mut server, ids[1]);
    server.session_tick(1.0);
    assert_eq!(server.state_kind(), StateKind::Racing, "third still driving");

    // The last driver leaving completes the race.
    server.on_disconnect(ConnectionId(3)).unwrap();
    server.session_tick(1.02);
    assert_eq!(server.state_kind(), StateKind::Intermission);

    let summary = server.machine().intermission().unwrap().summary();
    assert_eq!(summary.players_in_race, ids[..2].to_vec());
    assert_eq!(summary.finished_players, vec![ids[0]]);
    assert_eq!(summary.leaderboard[0].participant, ids[0]);
    assert_eq!(summary.leaderboard[1].status, RowStatus::Dead);
}

#[test]
fn test_race_exit_cleans_up_every_vehicle() {
    let (mut server, ids) = racing_server(2);
    kill(&mut server, ids[0]);
    server.session_tick(1.0);
    // The wreck stays, uncontrollable.
    let wreck = server.roster().get(ids[0]).unwrap().vehicle.unwrap();
    assert!(server.vehicles().contains(wreck));
    assert!(!server.vehicles().is_control_enabled(wreck));

    server.session_tick(90.0);
    assert_eq!(server.state_kind(), StateKind::Intermission);
    assert!(server.vehicles().is_empty());
    assert!(server.roster().iter().all(|p| p.vehicle.is_none()));
    assert!(!server.replication_enabled());
}

#[test]
fn test_intermission_returns_to_idle_then_races_again() {
    let (mut server, ids) = racing_server(1);
    drive_to_finish(&mut server, ids[0]);
    server.session_tick(10.0);
    assert_eq!(server.state_kind(), StateKind::Intermission);
    assert!(server.leaderboard().is_some());

    server.session_tick(15.0);
    assert_eq!(server.state_kind(), StateKind::Intermission);
    server.session_tick(20.0);
    assert_eq!(server.state_kind(), StateKind::Idle);
    assert!(server.leaderboard().is_none());

    // Readiness persists, so the next race starts straight away.
    server.session_tick(20.02);
    assert_eq!(server.state_kind(), StateKind::Racing);
    let racer = server.roster().get(ids[0]).unwrap();
    assert_eq!(racer.progress.checkpoint_count(), 0);
    assert_eq!(racer.health, 100);
    assert_eq!(race(&server).finish_deadline(), 20.02 + 90.0);
}

// ---------------------------------------------------------------------------
// Progress and invariants
// ---------------------------------------------------------------------------

#[test]
fn test_finisher_vehicle_released() {
    let (mut server, ids) = racing_server(2);
    let vehicle = server.roster().get(ids[0]).unwrap().vehicle.unwrap();
    drive_to_finish(&mut server, ids[0]);
    server.session_tick(12.0);

    assert!(!server.vehicles().contains(vehicle));
    assert_eq!(server.roster().get(ids[0]).unwrap().vehicle, None);
    let finish = server.roster().get(ids[0]).unwrap().progress.finish_time;
    assert_eq!(finish, Some(12.0));
    assert!(
        server
            .drain_outbox()
            .iter()
            .any(|e| e.message == ServerMessage::VehicleDespawned { vehicle })
    );
}

#[test]
fn test_finished_and_dead_never_overlap() {
    let (mut server, ids) = racing_server(3);
    let (a, b) = (ids[0], ids[1]);

    // a dies, then its wreck rolls over the line.
    kill(&mut server, a);
    drive_to_finish(&mut server, a);
    // b finishes, then is hit.
    drive_to_finish(&mut server, b);
    kill(&mut server, b);
    server.session_tick(5.0);

    let data = race(&server).data();
    assert_eq!(data.dead_players(), &[a]);
    assert_eq!(data.finished_players(), &[b]);
    for id in data.finished_players() {
        assert!(!data.dead_players().contains(id));
    }
}

#[test]
fn test_finishing_is_permanent() {
    let (mut server, ids) = racing_server(2);
    drive_to_finish(&mut server, ids[0]);
    server.session_tick(5.0);
    pass(&mut server, ids[0], 0, 10);
    kill(&mut server, ids[0]);
    server.session_tick(6.0);

    let data = race(&server).data();
    assert_eq!(data.finished_players(), &ids[..1]);
    assert!(!data.is_racing(ids[0]));
    assert!(data.dead_players().is_empty());
    assert_eq!(
        server.roster().get(ids[0]).unwrap().progress.finish_time,
        Some(5.0)
    );
}

#[test]
fn test_out_of_order_passes_are_reordered_and_stale_dropped() {
    let (mut server, ids) = racing_server(2);
    let a = ids[0];
    pass(&mut server, a, 1, 2);
    pass(&mut server, a, 0, 1);
    server.session_tick(1.0);
    let passed: Vec<u32> = server
        .roster()
        .get(a)
        .unwrap()
        .progress
        .passed()
        .iter()
        .map(|c| c.0)
        .collect();
    assert_eq!(passed, vec![0, 1]);

    // A late finish-line pass with an old sequence number is stale.
    pass(&mut server, a, 2, 2);
    server.session_tick(2.0);
    assert!(race(&server).data().finished_players().is_empty());
}

#[test]
fn test_unknown_checkpoint_ignored() {
    let (mut server, ids) = racing_server(2);
    pass(&mut server, ids[0], 42, 1);
    server.session_tick(1.0);
    assert_eq!(
        server.roster().get(ids[0]).unwrap().progress.checkpoint_count(),
        0
    );
}

#[test]
fn test_distance_feeds_ranking() {
    let (mut server, ids) = racing_server(2);
    server.enqueue_event(EngineEvent::CheckpointDistance {
        participant: ids[0],
        distance: 50.0,
    });
    server.enqueue_event(EngineEvent::CheckpointDistance {
        participant: ids[1],
        distance: 5.0,
    });
    server.session_tick(1.0);
    let rows = server.leaderboard().unwrap();
    assert_eq!(rows[0].participant, ids[1]);
    assert_eq!(rows[1].participant, ids[0]);
}

// ---------------------------------------------------------------------------
// Membership and replication through the server
// ---------------------------------------------------------------------------

#[test]
fn test_disconnect_mid_race_despawns_vehicle() {
    let (mut server, ids) = racing_server(2);
    let vehicle = server.roster().get(ids[1]).unwrap().vehicle.unwrap();
    server.drain_outbox();

    server.on_disconnect(ConnectionId(2)).unwrap();
    assert!(!server.vehicles().contains(vehicle));
    assert!(!race(&server).data().contains(ids[1]));
    assert!(
        server
            .drain_outbox()
            .iter()
            .any(|e| e.message == ServerMessage::VehicleDespawned { vehicle })
    );
    assert!(server.on_disconnect(ConnectionId(2)).is_err());
}

#[test]
fn test_proposals_gated_and_owner_checked() {
    let (mut server, ids) = ready_server(2);
    let update = |vehicle, t| VehicleStateUpdate {
        vehicle,
        state: VehicleState {
            position: Vec3::new(0.0, 1.0, 12.0),
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::Z,
            timestamp: t,
        },
    };

    server.session_tick(0.0);
    let mine = server.roster().get(ids[0]).unwrap().vehicle.unwrap();

    assert_eq!(server.on_vehicle_proposal(ConnectionId(1), &update(mine, 0.1)), Ok(()));
    assert!(matches!(
        server.on_vehicle_proposal(ConnectionId(2), &update(mine, 0.2)),
        Err(ProposalRejected::NotOwner { .. })
    ));
    assert_eq!(
        server.on_vehicle_proposal(ConnectionId(77), &update(mine, 0.2)),
        Err(ProposalRejected::UnknownSender)
    );

    server.drain_outbox();
    server.network_tick(0.1);
    let out = server.drain_outbox();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].message, ServerMessage::VehicleState(update(mine, 0.1)));

    // After the race the gate is closed.
    server.session_tick(90.0);
    assert!(!server.replication_enabled());
    assert_eq!(
        server.on_vehicle_proposal(ConnectionId(1), &update(mine, 91.0)),
        Err(ProposalRejected::Disabled)
    );
}

#[test]
fn test_wreck_of_dead_racer_is_not_driven() {
    let (mut server, ids) = racing_server(2);
    let wreck = server.roster().get(ids[0]).unwrap().vehicle.unwrap();
    kill(&mut server, ids[0]);
    server.session_tick(1.0);
    assert!(!server.vehicles().is_control_enabled(wreck));
    server.drain_outbox();

    let update = VehicleStateUpdate {
        vehicle: wreck,
        state: VehicleState {
            position: Vec3::new(0.0, 1.0, 500.0),
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::new(0.0, 0.0, 30.0),
            timestamp: 1.0,
        },
    };
    assert_eq!(
        server.on_vehicle_proposal(ConnectionId(1), &update),
        Err(ProposalRejected::ControlDisabled(wreck))
    );
    assert_eq!(server.vehicles().state(wreck), None);

    server.network_tick(1.1);
    assert!(server.drain_outbox().is_empty());
}

#[test]
fn test_skewed_timestamp_does_not_lock_out_owner() {
    let (mut server, ids) = racing_server(1);
    let mine = server.roster().get(ids[0]).unwrap().vehicle.unwrap();
    let update = |z, t| VehicleStateUpdate {
        vehicle: mine,
        state: VehicleState {
            position: Vec3::new(0.0, 1.0, z),
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::Z,
            timestamp: t,
        },
    };

    assert!(matches!(
        server.on_vehicle_proposal(ConnectionId(1), &update(99.0, 3600.0)),
        Err(ProposalRejected::FromFuture { .. })
    ));
    server.session_tick(0.5);
    assert_eq!(server.on_vehicle_proposal(ConnectionId(1), &update(12.0, 0.5)), Ok(()));
    assert_eq!(server.vehicles().state(mine), Some(update(12.0, 0.5).state));
}

#[test]
fn test_late_joiner_is_brought_up_to_date() {
    let (mut server, _) = racing_server(2);
    server.drain_outbox();

    let late = server.on_connect(ConnectionId(50), "late").unwrap();
    let out = server.drain_outbox();
    assert!(out.iter().all(|e| e.to == Recipient::Connection(ConnectionId(50))));
    assert_eq!(out[0].message, ServerMessage::Welcome { participant: late });
    assert!(matches!(
        out[1].message,
        ServerMessage::StateChanged {
            state: StateKind::Racing,
            ..
        }
    ));
    let spawned = out
        .iter()
        .filter(|e| matches!(e.message, ServerMessage::VehicleSpawned { .. }))
        .count();
    assert_eq!(spawned, 2);
}

#[test]
fn test_invalid_track_keeps_previous_layout() {
    let (mut server, _) = ready_server(1);
    let before = server.track().clone();
    let result = server.set_track_layout(
        vec![CheckpointId(0), CheckpointId(5), CheckpointId(1)],
        CheckpointId(5),
    );
    assert!(result.is_err());
    assert_eq!(server.track(), &before);

    server
        .set_track_layout(vec![CheckpointId(7), CheckpointId(8)], CheckpointId(8))
        .unwrap();
    assert_eq!(server.track().finish_line(), CheckpointId(8));
}

#[test]
fn test_advance_runs_both_schedules() {
    let (mut server, _) = ready_server(1);
    let mut session_ticks = 0;
    for _ in 0..10 {
        session_ticks += server.advance(0.1);
    }
    // One second at 50 Hz, give or take accumulator rounding.
    assert!((49..=50).contains(&session_ticks));
    assert_eq!(server.state_kind(), StateKind::Racing);
    assert!(server.now() > 0.9);

    // A long stall is clamped to one frame's worth of ticks.
    assert!(server.advance(5.0) <= 13);
}
