//! Courtside Sync binary entrypoint wiring a console control surface and a
//! logging display surface onto one file-backed storage origin.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use courtside_sync::{
    clock::{Clock, SystemClock},
    config::AppConfig,
    console::{Console, HELP, Reply},
    dao::key_value::FileStorage,
    dto::readout::LiveReadout,
    services::{
        game_flow::GameFlow,
        sync_service::{StorageOrigin, spawn_listener},
    },
    state::{ScoreboardStore, SharedStore},
};
use futures::StreamExt;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::block_in_place,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let storage = FileStorage::open(config.data_dir())
        .with_context(|| format!("opening storage in `{}`", config.data_dir().display()))?;
    let origin = StorageOrigin::new(Arc::new(storage), config.broadcast_capacity());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Two contexts on one origin, like a control tab and a display tab.
    let control = ScoreboardStore::open(origin.clone(), clock.clone(), config.defaults());
    let display_store = ScoreboardStore::open(origin, clock, config.defaults());
    info!(
        control_context = %control.id(),
        display_context = %display_store.id(),
        "contexts attached"
    );

    let listeners = [
        spawn_listener(control.clone()),
        spawn_listener(display_store.clone()),
    ];
    let display_task = tokio::spawn(run_display(display_store, config.poll_interval()));

    let mut console = Console::new(GameFlow::new(control));
    println!("{HELP}");

    tokio::select! {
        result = run_control(&mut console, config.poll_interval()) => result?,
        _ = shutdown_signal() => info!("shutdown signal received"),
    }

    display_task.abort();
    for listener in listeners {
        listener.abort();
    }
    Ok(())
}

/// Read commands from stdin while settling expired countdowns on every tick.
///
/// Commands write through to file storage synchronously, so they run under
/// `block_in_place` to keep the disk I/O off the async worker's schedule.
async fn run_control(console: &mut Console, poll_interval: Duration) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading console input")? else {
                    info!("console input closed");
                    return Ok(());
                };
                match block_in_place(|| console.handle_line(&line)) {
                    Reply::Done => {}
                    Reply::Message(message) => println!("{message}"),
                    Reply::Quit => return Ok(()),
                }
            }
            _ = ticker.tick() => {
                block_in_place(|| console.flow().settle_expired());
            }
        }
    }
}

/// Spectator surface: poll the readout and log it whenever it changes.
async fn run_display(store: SharedStore, poll_interval: Duration) {
    let (_subscription, mut updates) = store.subscribe_stream();
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_line = String::new();

    loop {
        tokio::select! {
            update = updates.next() => {
                let Some(state) = update else { break };
                debug!(quarter = state.quarter, revision = store.revision(), "display received update");
            }
            _ = ticker.tick() => {
                let line = LiveReadout::capture(&store.get_state(), store.now()).render_line();
                if line != last_line {
                    info!(target: "display", "{line}");
                    last_line = line;
                }
            }
        }
    }
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,courtside_sync=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
