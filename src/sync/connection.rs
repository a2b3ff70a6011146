// Event-channel lifecycle: one WebSocket session per signed-in identity.
// Each session owns a supervisor task that dials the socket, announces the
// identity on every successful (re)connect, and fans inbound events out to
// subscribers over a broadcast channel. Outbound notifications are
// fire-and-forget; while the socket is down they are dropped, never queued.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{ClientEvent, ServerEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_CAPACITY: usize = 256;
const OUTBOUND_CAPACITY: usize = 64;
const CONNECT_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(15);

/// Derive the WebSocket endpoint from the configured HTTP base URL.
fn websocket_url(base_url: &str) -> String {
    if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if base_url.starts_with("ws://") || base_url.starts_with("wss://") {
        base_url.to_string()
    } else {
        format!("ws://{}", base_url)
    }
}

/// Factory for event-channel sessions. At most one session may be live per
/// signed-in identity, so connecting tears any previous session down first.
pub struct ConnectionManager {
    url: String,
    active: Option<SyncSession>,
}

impl ConnectionManager {
    pub fn new(base_url: &str) -> Self {
        Self {
            url: websocket_url(base_url),
            active: None,
        }
    }

    pub async fn connect(&mut self, user_id: &str) -> Result<SyncSession> {
        if let Some(previous) = self.active.take() {
            info!("tearing down previous channel session before reconnecting");
            previous.disconnect().await;
        }
        let session = SyncSession::establish(&self.url, user_id).await?;
        self.active = Some(session.clone());
        Ok(session)
    }

    pub async fn disconnect(&mut self) {
        if let Some(session) = self.active.take() {
            session.disconnect().await;
        }
    }
}

/// A live event-channel session for one identity. Cheap to clone; all clones
/// share the same socket supervisor.
#[derive(Clone)]
pub struct SyncSession {
    user_id: String,
    outbound: mpsc::Sender<ClientEvent>,
    events: broadcast::Sender<ServerEvent>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SyncSession {
    async fn establish(url: &str, user_id: &str) -> Result<Self> {
        // Dial up-front so a bad endpoint surfaces to the caller instead of
        // spinning silently in the supervisor.
        let mut last_error = None;
        let mut stream = None;
        for attempt in 1..=CONNECT_ATTEMPTS {
            info!(
                "connecting to event channel at {} (attempt {}/{})",
                url, attempt, CONNECT_ATTEMPTS
            );
            match connect_async(url).await {
                Ok((ws, _)) => {
                    stream = Some(ws);
                    break;
                }
                Err(e) => {
                    warn!("connection attempt {}/{} failed: {}", attempt, CONNECT_ATTEMPTS, e);
                    last_error = Some(e);
                }
            }
            if attempt < CONNECT_ATTEMPTS {
                tokio::time::sleep(INITIAL_BACKOFF * 2u32.pow(attempt - 1)).await;
            }
        }
        let stream = match stream {
            Some(s) => s,
            None => {
                return Err(anyhow!(
                    "failed to connect to {}: {}",
                    url,
                    last_error.map(|e| e.to_string()).unwrap_or_default()
                ))
            }
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(run_channel(
            url.to_string(),
            user_id.to_string(),
            stream,
            outbound_rx,
            events.clone(),
            shutdown_rx,
        ));

        Ok(Self {
            user_id: user_id.to_string(),
            outbound,
            events,
            shutdown: Arc::new(shutdown_tx),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Subscribe to the inbound event stream. Every consumer gets its own
    /// receiver; dropping the receiver unregisters the listener.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Queue an outbound notification. Errors only if the session has been
    /// torn down; a merely-disconnected channel accepts the event and drops
    /// it in the supervisor.
    pub async fn send(&self, event: ClientEvent) -> Result<()> {
        self.outbound
            .send(event)
            .await
            .map_err(|_| anyhow!("event channel session is closed"))
    }

    /// Tear the session down. Idempotent: calling it twice, or on a session
    /// that already lost its socket, is harmless.
    pub async fn disconnect(&self) {
        let _ = self.shutdown.send(true);
        // Give the supervisor a chance to observe the signal and close the
        // socket before the caller proceeds.
        tokio::task::yield_now().await;
    }
}

/// Socket supervisor: owns the connection for the lifetime of the session,
/// reconnecting with exponential backoff whenever it drops.
async fn run_channel(
    url: String,
    user_id: String,
    first: WsStream,
    mut outbound: mpsc::Receiver<ClientEvent>,
    events: broadcast::Sender<ServerEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut socket = Some(first);
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let stream = match socket.take() {
            Some(s) => s,
            None => {
                match redial(&url, backoff, &mut outbound, &mut shutdown).await {
                    Redial::Stream(s) => {
                        backoff = INITIAL_BACKOFF;
                        s
                    }
                    Redial::Failed => {
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        continue;
                    }
                    Redial::Shutdown => return,
                }
            }
        };

        if let Err(e) = drive(stream, &user_id, &mut outbound, &events, &mut shutdown).await {
            warn!("event channel dropped: {}", e);
        }
        if *shutdown.borrow() {
            return;
        }
    }
}

enum Redial {
    Stream(WsStream),
    Failed,
    Shutdown,
}

/// Wait out the backoff, then try one dial. Outbound events arriving while
/// the channel is down are dropped, per the no-outbound-queue rule.
async fn redial(
    url: &str,
    backoff: Duration,
    outbound: &mut mpsc::Receiver<ClientEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> Redial {
    let wait = tokio::time::sleep(backoff);
    tokio::pin!(wait);
    loop {
        tokio::select! {
            _ = &mut wait => break,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Redial::Shutdown;
                }
            }
            maybe = outbound.recv() => match maybe {
                Some(event) => debug!("channel down; dropping outbound {} event", event.kind()),
                None => return Redial::Shutdown,
            },
        }
    }
    match connect_async(url).await {
        Ok((stream, _)) => Redial::Stream(stream),
        Err(e) => {
            warn!("reconnect to {} failed: {}", url, e);
            Redial::Failed
        }
    }
}

/// Pump one live socket until it drops or the session shuts down.
async fn drive(
    stream: WsStream,
    user_id: &str,
    outbound: &mut mpsc::Receiver<ClientEvent>,
    events: &broadcast::Sender<ServerEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<()> {
    let (mut sink, mut source) = stream.split();

    // Identity registration is not a one-time event: the server rebuilds its
    // online registry from these announcements, so it must be the first frame
    // after every successful connect.
    info!("event channel connected; registering identity {}", user_id);
    let register = ClientEvent::Register {
        user_id: user_id.to_string(),
    };
    sink.send(WsMessage::Text(serde_json::to_string(&register)?))
        .await?;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = sink.close().await;
                    return Ok(());
                }
            }
            maybe = outbound.recv() => match maybe {
                Some(event) => {
                    debug!("sending {} event", event.kind());
                    sink.send(WsMessage::Text(serde_json::to_string(&event)?)).await?;
                }
                None => {
                    // Every session handle is gone; nothing left to serve.
                    let _ = sink.close().await;
                    return Ok(());
                }
            },
            frame = source.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => {
                        // Send only fails when nobody is subscribed, which
                        // is fine: events are fan-out, not mailbox.
                        let _ = events.send(event);
                    }
                    Err(e) => debug!("ignoring unrecognized frame: {}", e),
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    return Err(anyhow!("server closed the connection"));
                }
                Some(Ok(_)) => {} // ping/pong/binary: not part of the protocol
                Some(Err(e)) => return Err(anyhow!("socket error: {}", e)),
            },
        }
    }
}
