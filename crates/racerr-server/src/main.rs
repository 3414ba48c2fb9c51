//! Headless authoritative race server.
//!
//! Loads `config.ron` (overridable from the command line), initialises
//! logging, and drives a [`RaceServer`] with a fixed frame step. Scripted
//! bots stand in for the transport and physics collaborators: every server
//! message reaches them encoded, and their proposals come back encoded.
//!
//! Run with `cargo run -p racerr-server -- --bots 4 --races 2`.

mod bots;

use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, info, warn};

use racerr_config::{CliArgs, Config, default_config_dir};
use racerr_session::{
    ConnectionId, Envelope, RaceServer, Recipient, RowStatus, SmoothingParams, StateKind,
    TrackLayout, serialize_message,
};

use crate::bots::{Bot, checkpoint_positions};

/// Simulated wall time per frame.
const FRAME_TIME: f64 = 1.0 / 60.0;

/// Checkpoints on the generated track, finish line included.
const TRACK_CHECKPOINTS: u32 = 8;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = match args.config.clone().map_or_else(default_config_dir, Ok) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Failed to resolve config directory: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    let log_dir = config_dir.join("logs");
    racerr_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    match run(&config, args.bots, args.races) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config, bot_count: u32, races: u32) -> Result<(), String> {
    let track = TrackLayout::sequential(TRACK_CHECKPOINTS).map_err(|e| e.to_string())?;
    let checkpoints = checkpoint_positions(TRACK_CHECKPOINTS);
    let mut server = RaceServer::new(config, track);
    info!(
        "Race server up on {}:{} with {} bots, {} race(s)",
        config.network.bind_address, config.network.port, bot_count, races
    );

    let smoothing = SmoothingParams::from(&config.replication);
    let mut bots: Vec<Bot> = (1..=u64::from(bot_count))
        .map(|i| Bot::new(ConnectionId(i), format!("bot-{i}"), smoothing, 42 + i))
        .collect();

    for bot in &bots {
        server
            .on_connect(bot.connection, &bot.name)
            .map_err(|e| format!("{} could not join: {e}", bot.name))?;
        let ready = serialize_message(&racerr_session::ClientMessage::Ready { ready: true })
            .map_err(|e| e.to_string())?;
        server
            .on_client_payload(bot.connection, &ready)
            .map_err(|e| e.to_string())?;
    }
    deliver(&mut bots, server.drain_outbox())?;

    let per_race = config.race.max_race_duration_secs + config.race.intermission_secs + 5.0;
    let time_limit = per_race * f64::from(races.max(1));
    let mut finished_races = 0;
    let mut last_kind = server.state_kind();

    while finished_races < races {
        if server.now() > time_limit {
            return Err(format!(
                "gave up after {:.1}s with {finished_races}/{races} races finished",
                server.now()
            ));
        }

        let now = server.now();
        for bot in &mut bots {
            for event in bot.drive(now, FRAME_TIME as f32, &checkpoints) {
                server.enqueue_event(event);
            }
            for proposal in bot.network_tick(now) {
                let payload = serialize_message(&proposal).map_err(|e| e.to_string())?;
                if let Err(e) = server.on_client_payload(bot.connection, &payload) {
                    debug!("{} proposal dropped: {e}", bot.name);
                }
            }
        }

        server.advance(FRAME_TIME);
        deliver(&mut bots, server.drain_outbox())?;

        let kind = server.state_kind();
        if kind != last_kind && kind == StateKind::Intermission {
            finished_races += 1;
            report_results(&server, finished_races);
        }
        last_kind = kind;
    }

    for bot in &bots {
        debug!("{} ended in {:?}", bot.name, bot.view().view);
    }
    Ok(())
}

/// Encodes every queued message and hands it to its recipients.
fn deliver(bots: &mut [Bot], envelopes: Vec<Envelope>) -> Result<(), String> {
    for envelope in envelopes {
        let payload = serialize_message(&envelope.message).map_err(|e| e.to_string())?;
        for bot in bots.iter_mut() {
            let addressed = match envelope.to {
                Recipient::All => true,
                Recipient::Connection(connection) => connection == bot.connection,
            };
            if addressed && let Err(e) = bot.receive(&payload) {
                warn!("{} could not decode a server message: {e}", bot.name);
            }
        }
    }
    Ok(())
}

fn report_results(server: &RaceServer, race_number: u32) {
    let Some(rows) = server.leaderboard() else {
        return;
    };
    info!("Race {} results:", race_number);
    for row in rows {
        let status = match row.status {
            RowStatus::Finished { time } => format!("finished in {time:.2}s"),
            RowStatus::Dead => "wrecked".to_string(),
            RowStatus::Racing => format!("did not finish ({} checkpoints)", row.checkpoints_passed),
        };
        info!("  {}. {} {}", row.rank, row.name, status);
    }
}
