//! Connection supervisor
//!
//! One state machine per relay socket. The pure [`Supervisor`] owns the
//! transition table and backoff arithmetic; [`spawn_link`] drives a real
//! WebSocket through it, re-sending `join` after every reconnect so the peer
//! lands back in the same room.

use couchpad_protocol::{Message, Role};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, trace, warn};

/// Heartbeat period while connected
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting before reconnect attempt `n`
    Backoff(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Start,
    Opened,
    Closed,
    BackoffElapsed,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub ceiling: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            ceiling: Duration::from_secs(10),
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    /// Delay before attempt `n`: linear in `n`, never above the ceiling
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt).min(self.ceiling)
    }
}

#[derive(Debug, Clone)]
pub struct Supervisor {
    state: LinkState,
    attempts: u32,
    policy: BackoffPolicy,
}

impl Supervisor {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            state: LinkState::Disconnected,
            attempts: 0,
            policy,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// True once the retry cap was hit and the machine gave up
    pub fn exhausted(&self) -> bool {
        self.state == LinkState::Disconnected && self.attempts > self.policy.max_attempts
    }

    /// Delay for the current backoff, if backing off
    pub fn delay(&self) -> Option<Duration> {
        match self.state {
            LinkState::Backoff(n) => Some(self.policy.delay(n)),
            _ => None,
        }
    }

    /// Apply an event; events with no transition from the current state are ignored
    pub fn on(&mut self, event: LinkEvent) -> LinkState {
        use LinkEvent as E;
        use LinkState as S;

        let next = match (self.state, event) {
            (_, E::Stop) => {
                self.attempts = 0;
                S::Disconnected
            }
            (S::Disconnected, E::Start) => {
                self.attempts = 0;
                S::Connecting
            }
            (S::Connecting, E::Opened) => {
                self.attempts = 0;
                S::Connected
            }
            (S::Connecting | S::Connected, E::Closed) => {
                self.attempts += 1;
                if self.attempts > self.policy.max_attempts {
                    S::Disconnected
                } else {
                    S::Backoff(self.attempts)
                }
            }
            (S::Backoff(_), E::BackoffElapsed) => S::Connecting,
            (state, event) => {
                trace!("Ignoring {:?} in {:?}", event, state);
                state
            }
        };
        self.state = next;
        next
    }
}

/// Where and as what a link joins
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Full socket URL, room code included (`ws://host/ws/ABC234`)
    pub url: String,
    pub role: Role,
    pub subtype: Option<String>,
    pub policy: BackoffPolicy,
    pub heartbeat: Duration,
}

impl LinkConfig {
    pub fn new(url: impl Into<String>, role: Role) -> Self {
        Self {
            url: url.into(),
            role,
            subtype: None,
            policy: BackoffPolicy::default(),
            heartbeat: HEARTBEAT_INTERVAL,
        }
    }
}

/// Handle to a running link task
pub struct LinkHandle {
    outbound: mpsc::Sender<Message>,
    state: watch::Receiver<LinkState>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LinkHandle {
    /// Queue a frame for the relay; false if the queue is full or the link ended
    pub fn send(&self, message: Message) -> bool {
        self.outbound.try_send(message).is_ok()
    }

    pub fn state(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }

    /// Close the socket and wait for the task to end
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

/// Start supervising a socket; decoded inbound frames go to `inbound`
pub fn spawn_link(config: LinkConfig, inbound: mpsc::Sender<Message>) -> LinkHandle {
    let (outbound, outbound_rx) = mpsc::channel(256);
    let (state_tx, state) = watch::channel(LinkState::Disconnected);
    let (stop, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run_link(config, inbound, outbound_rx, stop_rx, state_tx));
    LinkHandle {
        outbound,
        state,
        stop,
        task,
    }
}

enum SessionEnd {
    Closed,
    Stopped,
}

async fn run_link(
    config: LinkConfig,
    inbound: mpsc::Sender<Message>,
    mut outbound: mpsc::Receiver<Message>,
    mut stop: watch::Receiver<bool>,
    state_tx: watch::Sender<LinkState>,
) {
    let mut sup = Supervisor::new(config.policy);
    state_tx.send_replace(sup.on(LinkEvent::Start));

    loop {
        match sup.state() {
            LinkState::Connecting => {
                debug!("Connecting to {}", config.url);
                let attempt = tokio::select! {
                    r = timeout(CONNECT_TIMEOUT, connect_async(config.url.as_str())) => r,
                    _ = stop.changed() => {
                        state_tx.send_replace(sup.on(LinkEvent::Stop));
                        return;
                    }
                };
                match attempt {
                    Ok(Ok((ws, _))) => {
                        state_tx.send_replace(sup.on(LinkEvent::Opened));
                        info!("Connected to relay as {}", config.role);
                        match drive(ws, &config, &inbound, &mut outbound, &mut stop).await {
                            SessionEnd::Stopped => {
                                state_tx.send_replace(sup.on(LinkEvent::Stop));
                                return;
                            }
                            SessionEnd::Closed => warn!("Relay connection closed"),
                        }
                    }
                    Ok(Err(e)) => warn!("Failed to connect to relay: {}", e),
                    Err(_) => warn!("Timed out connecting to relay"),
                }
                state_tx.send_replace(sup.on(LinkEvent::Closed));
            }
            LinkState::Backoff(attempt) => {
                let delay = sup.delay().unwrap_or(config.policy.base);
                info!(
                    "Reconnecting in {:.1}s (attempt {}/{})",
                    delay.as_secs_f64(),
                    attempt,
                    config.policy.max_attempts
                );
                tokio::select! {
                    _ = sleep(delay) => {
                        state_tx.send_replace(sup.on(LinkEvent::BackoffElapsed));
                    }
                    _ = stop.changed() => {
                        state_tx.send_replace(sup.on(LinkEvent::Stop));
                        return;
                    }
                }
            }
            LinkState::Connected => {
                state_tx.send_replace(sup.on(LinkEvent::Closed));
            }
            LinkState::Disconnected => {
                if sup.exhausted() {
                    warn!(
                        "Giving up on the relay after {} attempts",
                        config.policy.max_attempts
                    );
                }
                return;
            }
        }
    }
}

/// Serve one open socket until it closes or the link is stopped
async fn drive(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    config: &LinkConfig,
    inbound: &mpsc::Sender<Message>,
    outbound: &mut mpsc::Receiver<Message>,
    stop: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();

    let join = Message::Join {
        role: config.role,
        subtype: config.subtype.clone(),
    };
    if sink.send(WsMessage::Text(join.encode())).await.is_err() {
        return SessionEnd::Closed;
    }

    let mut heartbeat = interval_at(Instant::now() + config.heartbeat, config.heartbeat);

    loop {
        tokio::select! {
            _ = stop.changed() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                return SessionEnd::Stopped;
            }
            _ = heartbeat.tick() => {
                if sink.send(WsMessage::Text(Message::Ping.encode())).await.is_err() {
                    return SessionEnd::Closed;
                }
            }
            out = outbound.recv() => match out {
                Some(message) => {
                    if sink.send(WsMessage::Text(message.encode())).await.is_err() {
                        return SessionEnd::Closed;
                    }
                }
                None => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return SessionEnd::Stopped;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match Message::decode(&text) {
                    Ok(Message::Pong) => trace!("pong"),
                    Ok(message) => {
                        if inbound.send(message).await.is_err() {
                            return SessionEnd::Stopped;
                        }
                    }
                    Err(e) => debug!("Dropping frame from relay: {}", e),
                },
                Some(Ok(WsMessage::Close(_))) | None => return SessionEnd::Closed,
                Some(Err(e)) => {
                    debug!("Socket error: {}", e);
                    return SessionEnd::Closed;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}
