//! Session runtime: the single cooperative event loop
//!
//! All session state lives in one task. Inbound frames, operator commands,
//! the redraw tick, and the stale sweep are multiplexed through one
//! `tokio::select!`, so effects land strictly in arrival order and nothing
//! needs a lock. Aggregation runs on the redraw tick rather than per
//! sample: a burst of readings costs appends only, and the display never
//! recomputes faster than its own frame rate.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

use crate::commands::{Command, CommandDispatcher};
use crate::config::Config;
use crate::connection::{ConnectionHandle, ConnectionManager, WsTransport};
use crate::session::engine::{SeriesReport, SessionEngine};
use crate::session::types::{RegistryEvent, StatusEvent};
use crate::wire::InboundMessage;

#[derive(Debug)]
pub enum StartError {
    Http(reqwest::Error),
}

impl std::fmt::Display for StartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartError::Http(e) => write!(f, "HTTP client setup failed: {}", e),
        }
    }
}

impl std::error::Error for StartError {}

impl From<reqwest::Error> for StartError {
    fn from(e: reqwest::Error) -> Self {
        StartError::Http(e)
    }
}

/// Consumer-side handles of a running session. The presentation adapter
/// owns these; the session core never sees a display object.
pub struct Session {
    /// Operator intents in
    pub commands: mpsc::Sender<Command>,
    /// Display reports out, one batch per redraw tick
    pub snapshots: mpsc::Receiver<Vec<SeriesReport>>,
    /// Series lifecycle notifications (create/update/remove)
    pub registry_events: mpsc::UnboundedReceiver<RegistryEvent>,
    /// Transient status-line events
    pub status: mpsc::UnboundedReceiver<StatusEvent>,
    /// Live view of the channel state
    pub connection: ConnectionHandle,
}

/// Wire up and spawn a full session against the configured station.
pub fn start(config: &Config) -> Result<Session, StartError> {
    let transport = Arc::new(WsTransport::new(config.ws_url.clone()));
    start_with_transport(config, transport)
}

/// Same, with the transport injected (tests script it).
pub fn start_with_transport(
    config: &Config,
    transport: Arc<dyn crate::connection::ChannelTransport>,
) -> Result<Session, StartError> {
    let (registry_tx, registry_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = mpsc::channel(4);
    let (command_tx, command_rx) = mpsc::channel(64);

    let (manager, handle, inbound_rx) = ConnectionManager::new(
        transport,
        Duration::from_millis(config.reconnect_delay_ms),
        Duration::from_millis(config.connect_timeout_ms),
        status_tx.clone(),
    );
    manager.open();

    let dispatcher =
        CommandDispatcher::new(handle.clone(), config.http_url.clone(), status_tx.clone())?;

    let mut engine = SessionEngine::new(
        config.series_capacity,
        config.stale_timeout_ms,
        registry_tx,
    );
    engine.set_window(config.window_ms);
    engine.set_spec(config.min_spec);

    tokio::spawn(event_loop(
        engine,
        dispatcher,
        inbound_rx,
        command_rx,
        snapshot_tx,
        status_tx,
        Duration::from_millis(config.redraw_interval_ms),
        Duration::from_millis(config.sweep_interval_ms),
    ));

    Ok(Session {
        commands: command_tx,
        snapshots: snapshot_rx,
        registry_events: registry_rx,
        status: status_rx,
        connection: handle,
    })
}

#[allow(clippy::too_many_arguments)]
async fn event_loop(
    mut engine: SessionEngine,
    dispatcher: CommandDispatcher,
    mut inbound_rx: mpsc::Receiver<InboundMessage>,
    mut command_rx: mpsc::Receiver<Command>,
    snapshot_tx: mpsc::Sender<Vec<SeriesReport>>,
    status_tx: mpsc::UnboundedSender<StatusEvent>,
    redraw_period: Duration,
    sweep_period: Duration,
) {
    let mut redraw = interval(redraw_period);
    let mut sweep = interval(sweep_period);
    // The first tick of an interval fires immediately; skip the empty frame
    redraw.tick().await;
    sweep.tick().await;

    loop {
        tokio::select! {
            msg = inbound_rx.recv() => match msg {
                Some(msg) => {
                    for event in engine.apply_message(msg) {
                        let _ = status_tx.send(event);
                    }
                }
                None => break, // connection loop shut down
            },
            cmd = command_rx.recv() => match cmd {
                Some(cmd) => {
                    apply_local_effect(&mut engine, &cmd, &status_tx);
                    dispatcher.dispatch(&cmd);
                }
                None => break, // operator side gone
            },
            _ = redraw.tick() => {
                // A slow adapter drops frames, never backs up ingestion
                let _ = snapshot_tx.try_send(engine.snapshot());
            }
            _ = sweep.tick() => {
                let swept = engine.sweep();
                if swept > 0 {
                    log::info!("stale sweep retired {} series", swept);
                }
            }
        }
    }

    log::info!("session event loop stopped");
}

/// Commands whose primary effect is on this display take it here, before
/// the dispatcher handles the remote leg.
fn apply_local_effect(
    engine: &mut SessionEngine,
    cmd: &Command,
    status_tx: &mpsc::UnboundedSender<StatusEvent>,
) {
    match cmd {
        Command::SetWindow { duration_ms } => {
            engine.set_window(*duration_ms);
            let _ = status_tx.send(StatusEvent::WindowChanged {
                duration_ms: *duration_ms,
            });
        }
        Command::SetSpecThreshold { value } => {
            engine.set_spec(*value);
            let _ = status_tx.send(StatusEvent::SpecChanged { min_value: *value });
        }
        Command::RenameSeries { target, name } => {
            engine.rename(target, name);
        }
        Command::Recolor { target, color } => {
            engine.recolor(target, color);
        }
        Command::RemoveSeries { target } => {
            engine.remove(target);
        }
        Command::Tare { .. }
        | Command::TareAll { .. }
        | Command::Calibrate { .. }
        | Command::PersistDisplayPrefs { .. } => {}
    }
}

/// Minimal presentation adapter: logs snapshots and status lines. The real
/// kiosk front end replaces this consumer; the session core is unchanged.
pub async fn log_presentation_loop(mut session: Session) {
    loop {
        tokio::select! {
            snapshot = session.snapshots.recv() => match snapshot {
                Some(reports) => {
                    for report in &reports {
                        match (&report.short, &report.verdict) {
                            (Some(stats), Some(verdict)) => log::info!(
                                "{} [{}]: {:.2} g avg over 5s ({})",
                                report.display_name, report.id, stats.avg, verdict
                            ),
                            _ => log::info!("{} [{}]: -- g", report.display_name, report.id),
                        }
                    }
                }
                None => break,
            },
            event = session.registry_events.recv() => match event {
                Some(event) => log::debug!("registry: {:?}", event),
                None => break,
            },
            event = session.status.recv() => match event {
                Some(StatusEvent::ConnectionChanged(state)) => {
                    log::info!("station link {}", state);
                }
                Some(event) => log::info!("status: {:?}", event),
                None => break,
            },
        }
    }
}
