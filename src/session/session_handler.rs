use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local};
use rumqttc::tokio_rustls::rustls::{
    self,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    pki_types::{CertificateDer, ServerName, UnixTime},
    DigitallySignedStruct, SignatureScheme,
};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, NetworkOptions, Outgoing,
    Packet, Publish, QoS, TlsConfiguration, Transport,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::history::{now_stamp, payload_to_text, MessageRecord, MessageStore};

use super::config::SessionOptions;
use super::error::SessionError;
use super::events::{describe_connack, describe_connection_error, SessionNotifier, StatusKind};

const CLIENT_ID_PREFIX: &str = "mqttscope";
const MQTT_TLS_PORT: u16 = 8883;
const WILDCARD_ALL: &str = "#";
const REQUEST_QUEUE_CAPACITY: usize = 100;
// Generous transport timeouts: connection stability over fast failure.
const KEEP_ALIVE_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 30;

static CONNECT_SEQ: AtomicU32 = AtomicU32::new(0);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Snapshot of the live session: connection identity, subscription
/// tracking and activity counters.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub connection_state: ConnectionState,
    pub current_topic: Option<String>,
    pub last_error: Option<String>,
    pub messages_received: usize,
    pub messages_sent: usize,
    pub last_activity: Option<DateTime<Local>>,
}

/// State shared between the manager and its event-loop task.
struct SessionShared {
    notifier: Arc<dyn SessionNotifier>,
    history: Arc<MessageStore>,
    record_sent: bool,
    state: Mutex<SessionState>,
    // Set before a requested disconnect so the event loop can tell a clean
    // close apart from a transport failure.
    closing: AtomicBool,
}

impl SessionShared {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn status(&self, kind: StatusKind, detail: &str) {
        if kind == StatusKind::Error {
            self.state().last_error = Some(detail.to_string());
        }
        debug!(%kind, detail, "session status");
        self.notifier.on_status(kind, detail);
    }

    fn set_connection(&self, connection_state: ConnectionState) {
        self.state().connection_state = connection_state;
    }

    fn current_topic(&self) -> Option<String> {
        self.state().current_topic.clone()
    }

    fn set_current_topic(&self, topic: Option<String>) {
        self.state().current_topic = topic;
    }

    /// Persists and forwards one inbound message. May fire after a
    /// disconnect was requested; late events are handled, not suppressed.
    fn handle_publish(&self, publish: &Publish) {
        let timestamp = now_stamp();
        let payload = payload_to_text(&publish.payload);
        let record =
            MessageRecord::received(timestamp.clone(), publish.topic.clone(), payload.clone());
        if let Err(err) = self.history.save(&record) {
            // A failed save must not swallow the notification.
            warn!(topic = %publish.topic, %err, "failed to persist received message");
        }
        {
            let mut state = self.state();
            state.messages_received += 1;
            state.last_activity = Some(Local::now());
        }
        self.notifier.on_message(&publish.topic, &payload, &timestamp);
    }
}

/// Owns the MQTT client lifecycle: one connection, one subscription, one
/// event-loop task at a time. All operations enqueue transport requests
/// and return without waiting on network I/O; results arrive through the
/// [`SessionNotifier`].
pub struct SessionManager {
    shared: Arc<SessionShared>,
    client: Option<AsyncClient>,
    cancel: Option<CancellationToken>,
    event_loop: Option<JoinHandle<()>>,
    default_qos: QoS,
    default_retain: bool,
}

impl SessionManager {
    pub fn new(
        notifier: Arc<dyn SessionNotifier>,
        history: Arc<MessageStore>,
        record_sent: bool,
    ) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                notifier,
                history,
                record_sent,
                state: Mutex::new(SessionState::default()),
                closing: AtomicBool::new(false),
            }),
            client: None,
            cancel: None,
            event_loop: None,
            default_qos: QoS::AtMostOnce,
            default_retain: false,
        }
    }

    /// Opens a fresh session, tearing down any previous one first. Emits a
    /// `Connecting` status before returning; everything after that arrives
    /// asynchronously via the notifier.
    pub async fn connect(&mut self, options: &SessionOptions) -> Result<(), SessionError> {
        if let Err(reason) = options.validate() {
            self.shared.status(StatusKind::Error, &reason);
            return Err(SessionError::InvalidOptions(reason));
        }

        self.teardown().await;

        // Fresh id per attempt, so the broker never sees a reconnect as a
        // session takeover.
        let client_id = fresh_client_id();
        let mut mqtt_options = MqttOptions::new(&client_id, &options.broker, options.port);
        mqtt_options.set_keep_alive(Duration::from_secs(KEEP_ALIVE_SECS));
        mqtt_options.set_clean_session(true);
        if let Some(username) = &options.username {
            mqtt_options.set_credentials(username, options.password.clone().unwrap_or_default());
        }
        if options.port == MQTT_TLS_PORT {
            mqtt_options.set_transport(insecure_tls_transport());
        }

        {
            let mut state = self.shared.state();
            *state = SessionState {
                broker: options.broker.clone(),
                port: options.port,
                client_id,
                connection_state: ConnectionState::Connecting,
                ..SessionState::default()
            };
        }
        self.shared.closing.store(false, Ordering::SeqCst);
        self.shared.status(
            StatusKind::Connecting,
            &format!("Connecting to {}:{}", options.broker, options.port),
        );

        let (client, mut event_loop) = AsyncClient::new(mqtt_options, REQUEST_QUEUE_CAPACITY);
        let mut network_options = NetworkOptions::new();
        network_options.set_connection_timeout(CONNECT_TIMEOUT_SECS);
        event_loop.set_network_options(network_options);

        let cancel = CancellationToken::new();
        let shared = self.shared.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            run_event_loop(event_loop, shared, task_cancel).await;
        });

        self.client = Some(client);
        self.cancel = Some(cancel);
        self.event_loop = Some(handle);
        self.default_qos = options.qos_level();
        self.default_retain = options.retain;
        info!(broker = %options.broker, port = options.port, "connection attempt started");
        Ok(())
    }

    /// Requests a clean disconnect. The `Disconnected` confirmation comes
    /// back through the notifier once the transport actually closes.
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        if !self.is_connected() || self.client.is_none() {
            self.shared.status(StatusKind::Error, "Not connected to broker");
            return Err(SessionError::NotConnected);
        }

        self.shared.closing.store(true, Ordering::SeqCst);
        if let Some(client) = &self.client {
            if let Err(err) = client.disconnect().await {
                let reason = format!("Disconnect request failed: {err}");
                self.shared.status(StatusKind::Error, &reason);
                return Err(SessionError::Request(reason));
            }
        }
        {
            let mut state = self.shared.state();
            state.connection_state = ConnectionState::Disconnected;
            state.current_topic = None;
        }
        info!("disconnect requested");
        Ok(())
    }

    /// Subscribes to `topic`, implicitly unsubscribing the previous topic
    /// first. Wildcards are passed through untouched.
    pub async fn subscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        if topic.trim().is_empty() {
            let reason = "cannot subscribe to an empty topic";
            self.shared.status(StatusKind::Error, reason);
            return Err(SessionError::InvalidOptions(reason.to_string()));
        }
        let client = self.connected_client()?;

        if let Some(previous) = self.shared.current_topic() {
            if previous == topic {
                return Ok(());
            }
            if let Err(err) = client.unsubscribe(previous.clone()).await {
                let reason = format!("Unsubscribe request failed: {err}");
                self.shared.status(StatusKind::Error, &reason);
                return Err(SessionError::Request(reason));
            }
            self.shared.set_current_topic(None);
            info!(topic = %previous, "implicit unsubscribe before new subscription");
            self.shared
                .status(StatusKind::Connected, &format!("Unsubscribed from {previous}"));
        }

        if let Err(err) = client.subscribe(topic, self.default_qos).await {
            let reason = format!("Subscribe request failed: {err}");
            self.shared.status(StatusKind::Error, &reason);
            return Err(SessionError::Request(reason));
        }
        self.shared.set_current_topic(Some(topic.to_string()));
        self.shared
            .status(StatusKind::Connected, &format!("Subscribed to {topic}"));
        Ok(())
    }

    /// Unsubscribes from `topic`, defaulting to the active subscription.
    ///
    /// The all-matching wildcard is special: brokers handle broad wildcard
    /// unsubscription unreliably, so `#` is dropped by disconnecting the
    /// whole session, reported as a `Disconnected` status.
    pub async fn unsubscribe(&mut self, topic: Option<&str>) -> Result<(), SessionError> {
        let target = match topic
            .map(str::to_string)
            .or_else(|| self.shared.current_topic())
        {
            Some(target) => target,
            None => {
                self.shared
                    .status(StatusKind::Error, "No active subscription to unsubscribe");
                return Err(SessionError::NoSubscription);
            }
        };

        if target == WILDCARD_ALL {
            self.disconnect().await?;
            self.shared.status(
                StatusKind::Disconnected,
                "Disconnected to unsubscribe from wildcard topic",
            );
            return Ok(());
        }

        let client = self.connected_client()?;
        if let Err(err) = client.unsubscribe(target.clone()).await {
            let reason = format!("Unsubscribe request failed: {err}");
            self.shared.status(StatusKind::Error, &reason);
            return Err(SessionError::Request(reason));
        }
        if self.shared.current_topic().as_deref() == Some(target.as_str()) {
            self.shared.set_current_topic(None);
        }
        self.shared
            .status(StatusKind::Connected, &format!("Unsubscribed from {target}"));
        Ok(())
    }

    /// Fire-and-forget publish; delivery guarantees are whatever the QoS
    /// level provides. With `record_sent` enabled the message is also
    /// appended to the history.
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: Option<QoS>,
        retain: Option<bool>,
    ) -> Result<(), SessionError> {
        if topic.trim().is_empty() {
            let reason = "cannot publish to an empty topic";
            self.shared.status(StatusKind::Error, reason);
            return Err(SessionError::InvalidOptions(reason.to_string()));
        }
        let client = self.connected_client()?;
        let qos = qos.unwrap_or(self.default_qos);
        let retain = retain.unwrap_or(self.default_retain);

        if let Err(err) = client.publish(topic, qos, retain, payload.to_vec()).await {
            let reason = format!("Publish request failed: {err}");
            self.shared.status(StatusKind::Error, &reason);
            return Err(SessionError::Request(reason));
        }

        {
            let mut state = self.shared.state();
            state.messages_sent += 1;
            state.last_activity = Some(Local::now());
        }
        if self.shared.record_sent {
            let record =
                MessageRecord::sent(now_stamp(), topic.to_string(), payload_to_text(payload));
            if let Err(err) = self.shared.history.save(&record) {
                warn!(topic, %err, "failed to persist sent message");
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> SessionState {
        self.shared.state().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state().connection_state == ConnectionState::Connected
    }

    /// Explicit teardown for all exit paths. Safe to call in any state.
    pub async fn close(&mut self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        self.teardown().await;
        let mut state = self.shared.state();
        state.connection_state = ConnectionState::Disconnected;
        state.current_topic = None;
    }

    fn connected_client(&self) -> Result<&AsyncClient, SessionError> {
        match &self.client {
            Some(client) if self.is_connected() => Ok(client),
            _ => {
                self.shared.status(StatusKind::Error, "Not connected to broker");
                Err(SessionError::NotConnected)
            }
        }
    }

    /// Stops the event loop and drops the client. Disconnecting a client
    /// that is already gone is a no-op.
    async fn teardown(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(client) = self.client.take() {
            if let Err(err) = client.try_disconnect() {
                debug!(%err, "previous client already gone");
            }
        }
        if let Some(handle) = self.event_loop.take() {
            if let Err(err) = handle.await {
                debug!(%err, "event loop task ended abnormally");
            }
        }
    }
}

/// Polls the transport until cancellation, a clean disconnect, or a fatal
/// error. There is no automatic reconnection: a dropped connection parks
/// the session until an explicit connect.
async fn run_event_loop(
    mut event_loop: EventLoop,
    shared: Arc<SessionShared>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("event loop cancelled");
                break;
            }
            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        shared.set_connection(ConnectionState::Connected);
                        shared.status(StatusKind::Connected, "Connected successfully");
                    } else {
                        let reason = describe_connack(ack.code);
                        shared.set_connection(ConnectionState::Error);
                        shared.status(StatusKind::Error, &reason);
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    shared.handle_publish(&publish);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    shared.set_connection(ConnectionState::Disconnected);
                    shared.status(StatusKind::Disconnected, "Disconnected by broker");
                    break;
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    shared.set_connection(ConnectionState::Disconnected);
                    shared.status(StatusKind::Disconnected, "Disconnected: clean disconnect");
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    if shared.closing.load(Ordering::SeqCst) {
                        shared.set_connection(ConnectionState::Disconnected);
                        shared.status(StatusKind::Disconnected, "Disconnected: clean disconnect");
                    } else {
                        let reason = describe_connection_error(&err);
                        shared.set_connection(ConnectionState::Error);
                        shared.status(StatusKind::Error, &reason);
                    }
                    break;
                }
            }
        }
    }
}

fn fresh_client_id() -> String {
    let seq = CONNECT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "{CLIENT_ID_PREFIX}-{}-{seq}",
        Local::now().format("%H%M%S%3f")
    )
}

/// Accepts any server certificate without validation.
///
/// Debugging brokers commonly run with self-signed certificates or
/// hostnames that do not match, so connections on the secure port skip
/// certificate and hostname verification entirely. This is a usability
/// trade-off for a local debugging tool, not a posture to copy into
/// anything production-facing.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA1,
            SignatureScheme::ECDSA_SHA1_Legacy,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::ED448,
        ]
    }
}

fn insecure_tls_transport() -> Transport {
    let tls_config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
        .with_no_client_auth();
    Transport::Tls(TlsConfiguration::Rustls(Arc::new(tls_config)))
}
