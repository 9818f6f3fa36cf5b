//! Glide sliding sync client binary.
//!
//! # Usage
//!
//! ```bash
//! # Sync against a homeserver described by a session file
//! glide --config session.toml
//!
//! # Sync against the in-process simulated homeserver
//! glide --sim --sim-rooms 250 --seed 7
//! ```

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use glide_cli::{CliError, SessionFile};
use glide_client::{HttpTransport, SessionEvent, SlidingSync, SystemEnv, Transport};
use glide_core::{ConfigError, Environment};
use glide_harness::SimHomeserver;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Glide sliding sync client
#[derive(Parser, Debug)]
#[command(name = "glide")]
#[command(about = "Sliding sync room-list client")]
#[command(version)]
struct Args {
    /// Session file (TOML)
    #[arg(short, long, required_unless_present = "sim")]
    config: Option<PathBuf>,

    /// Sync against a simulated homeserver instead of the network
    #[arg(long)]
    sim: bool,

    /// Rooms seeded into the simulated homeserver
    #[arg(long, default_value = "100")]
    sim_rooms: usize,

    /// Milliseconds between simulated room activity
    #[arg(long, default_value = "1000")]
    sim_interval_ms: u64,

    /// Seed for the simulated homeserver
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Override the session file's homeserver
    #[arg(long)]
    homeserver: Option<String>,

    /// Override the session file's access token
    #[arg(long)]
    access_token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let mut file = match &args.config {
        Some(path) => SessionFile::load(path)?,
        None => SessionFile::simulated(),
    };
    if let Some(homeserver) = &args.homeserver {
        file.homeserver.clone_from(homeserver);
    }
    if args.access_token.is_some() {
        file.access_token.clone_from(&args.access_token);
    }

    tracing::info!(homeserver = %file.homeserver, views = file.views.len(), "Glide starting");

    if args.sim {
        let server = SimHomeserver::with_rooms(args.seed, args.sim_rooms)?;
        tokio::spawn(simulate_activity(server.clone(), Duration::from_millis(args.sim_interval_ms)));
        let session = file.builder()?.build(server, SystemEnv::new())?;
        run(&session).await?;
    } else {
        let token = file.access_token.clone().ok_or(CliError::MissingToken)?;
        let url = Url::parse(&file.homeserver).map_err(|e| ConfigError::InvalidHomeserver {
            url: file.homeserver.clone(),
            reason: e.to_string(),
        })?;
        let transport = HttpTransport::new(&url, token)?;
        let session = file.builder()?.build(transport, SystemEnv::new())?;
        run(&session).await?;
    }

    Ok(())
}

/// Drive the session until Ctrl-C or a fatal error, logging every cycle.
async fn run<T: Transport, E: Environment>(session: &SlidingSync<T, E>) -> Result<(), CliError> {
    let mut events = session.subscribe_events();
    let handle = session.sync()?;

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping sync");
                break Ok(());
            }
            event = events.recv() => match event {
                Some(event) => {
                    if let Err(err) = log_event(session, &event) {
                        break Err(err);
                    }
                },
                None => break Ok(()),
            },
        }
    };

    session.stop_sync();
    if let Err(e) = handle.join().await {
        tracing::warn!(error = %e, "sync task ended abnormally");
    }
    outcome
}

fn log_event<T: Transport, E: Environment>(
    session: &SlidingSync<T, E>,
    event: &SessionEvent,
) -> Result<(), CliError> {
    match event {
        SessionEvent::Update(summary) => {
            for name in &summary.views {
                let Some(view) = session.view(name) else { continue };
                tracing::info!(
                    view = %name,
                    state = ?view.state(),
                    count = ?view.current_room_count(),
                    loaded = view.current_rooms_list().iter().filter(|e| e.is_filled()).count(),
                    "view updated"
                );
            }
            if !summary.rooms.is_empty() {
                tracing::debug!(rooms = summary.rooms.len(), "rooms updated");
            }
            Ok(())
        },
        SessionEvent::RecoverableError(e) => {
            tracing::warn!(error = %e, "sync cycle failed, retrying");
            Ok(())
        },
        SessionEvent::Terminated(e) => {
            tracing::error!(error = %e, "sync terminated");
            Err(CliError::Terminated(e.to_string()))
        },
    }
}

/// Post a message into the simulated rooms in turn.
async fn simulate_activity(server: SimHomeserver, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    let mut next = 0usize;
    loop {
        ticker.tick().await;
        let rooms = server.room_ids();
        if rooms.is_empty() {
            continue;
        }
        let room = &rooms[next % rooms.len()];
        server.bump(room);
        tracing::debug!(room = %room, "simulated activity");
        next = next.wrapping_add(7);
    }
}
