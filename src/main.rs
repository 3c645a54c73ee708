use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::Result;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use mqttscope::config::MonitorConfig;
use mqttscope::history::MessageStore;
use mqttscope::prefs::{PreferenceCategory, PreferenceStore};
use mqttscope::session::{SessionManager, SessionNotifier, StatusKind};
use mqttscope::storage::{default_storage_dir, ensure_storage_dir, HISTORY_DB_FILE};

/// Session events forwarded from the network task to the monitor loop.
enum MonitorEvent {
    Status(StatusKind, String),
}

/// Logs everything and hands status changes to the monitor loop so it can
/// subscribe once the connection is up.
struct MonitorNotifier {
    events: mpsc::Sender<MonitorEvent>,
}

impl SessionNotifier for MonitorNotifier {
    fn on_message(&self, topic: &str, payload: &str, timestamp: &str) {
        info!(%topic, %timestamp, "{payload}");
    }

    fn on_status(&self, kind: StatusKind, detail: &str) {
        info!(%kind, "{detail}");
        // Callbacks fire on the event task and must not block on the
        // channel; a full queue just drops the nudge.
        if self
            .events
            .try_send(MonitorEvent::Status(kind, detail.to_string()))
            .is_err()
        {
            warn!("monitor event queue full, status dropped");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => MonitorConfig::load(&path)?,
        None => MonitorConfig::default(),
    };

    let storage_dir = config
        .storage_dir
        .clone()
        .unwrap_or_else(default_storage_dir);
    ensure_storage_dir(&storage_dir)?;

    let history = Arc::new(MessageStore::open(&storage_dir.join(HISTORY_DB_FILE))?);
    let prefs = PreferenceStore::new(&storage_dir);

    let (event_tx, mut event_rx) = mpsc::channel(100);
    let notifier = Arc::new(MonitorNotifier { events: event_tx });

    let mut session = SessionManager::new(notifier, history.clone(), config.record_sent);
    session.connect(&config.session).await?;
    prefs.remember(PreferenceCategory::Brokers, &config.session.broker)?;
    prefs.remember(PreferenceCategory::Ports, &config.session.port.to_string())?;

    let mut subscribed = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            event = event_rx.recv() => match event {
                Some(MonitorEvent::Status(StatusKind::Connected, _)) if !subscribed => {
                    if let Some(topic) = &config.topic {
                        session.subscribe(topic).await?;
                        prefs.remember(PreferenceCategory::Topics, topic)?;
                        subscribed = true;
                    }
                }
                Some(MonitorEvent::Status(StatusKind::Error | StatusKind::Disconnected, detail)) => {
                    // No automatic reconnection; report and stop.
                    warn!("session ended: {detail}");
                    break;
                }
                Some(_) => {}
                None => break,
            }
        }
    }

    session.close().await;
    drop(session);
    if let Ok(store) = Arc::try_unwrap(history) {
        store.close()?;
    }
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
