//! Relay hub
//!
//! The single event loop that owns the [`Registry`]. Socket tasks and HTTP
//! handlers hold a cloneable [`RelayHub`] handle and talk to the loop over a
//! command channel, so room state is only ever touched by one task.

use crate::registry::{ConnId, PeerTx, ReapTicket, Registry, StatsSnapshot};
use couchpad_protocol::{Message, Role};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct HubSettings {
    /// How long an emptied room survives
    pub reap_grace: Duration,
    /// How long a created room waits for its first peer
    pub unjoined_ttl: Duration,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            reap_grace: Duration::from_secs(60),
            unjoined_ttl: Duration::from_secs(600),
        }
    }
}

enum Command {
    Create {
        profile: Option<String>,
        reply: oneshot::Sender<String>,
    },
    Join {
        code: String,
        conn: ConnId,
        role: Role,
        subtype: Option<String>,
        tx: PeerTx,
    },
    Leave {
        conn: ConnId,
    },
    Inbound {
        conn: ConnId,
        raw: String,
        msg: Message,
    },
    Reap(ReapTicket),
    SessionCount {
        reply: oneshot::Sender<usize>,
    },
    Stats {
        reply: oneshot::Sender<StatsSnapshot>,
    },
}

/// Handle to the hub loop
#[derive(Clone)]
pub struct RelayHub {
    tx: mpsc::UnboundedSender<Command>,
}

impl RelayHub {
    /// Spawn the hub loop on the current runtime
    pub fn spawn(settings: HubSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Self { tx };
        let weak = hub.tx.downgrade();
        tokio::spawn(run(Registry::new(), rx, weak, settings));
        hub
    }

    /// Create a room; `None` only if the hub has shut down
    pub async fn create(&self, profile: Option<String>) -> Option<String> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Create { profile, reply }).ok()?;
        rx.await.ok()
    }

    pub fn join(&self, code: &str, conn: ConnId, role: Role, subtype: Option<String>, tx: PeerTx) {
        let _ = self.tx.send(Command::Join {
            code: code.to_string(),
            conn,
            role,
            subtype,
            tx,
        });
    }

    pub fn leave(&self, conn: ConnId) {
        let _ = self.tx.send(Command::Leave { conn });
    }

    /// Hand a decoded frame to the router; `raw` is relayed on verbatim routes
    pub fn inbound(&self, conn: ConnId, raw: String, msg: Message) {
        let _ = self.tx.send(Command::Inbound { conn, raw, msg });
    }

    pub async fn session_count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::SessionCount { reply }).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    pub async fn stats(&self) -> Option<StatsSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Stats { reply }).ok()?;
        rx.await.ok()
    }
}

async fn run(
    mut registry: Registry,
    mut rx: mpsc::UnboundedReceiver<Command>,
    weak: mpsc::WeakUnboundedSender<Command>,
    settings: HubSettings,
) {
    let arm = |ticket: ReapTicket, after: Duration| {
        let weak = weak.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(tx) = weak.upgrade() {
                let _ = tx.send(Command::Reap(ticket));
            }
        });
    };

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Create { profile, reply } => {
                let (code, ticket) = registry.create(profile);
                arm(ticket, settings.unjoined_ttl);
                let _ = reply.send(code);
            }
            Command::Join {
                code,
                conn,
                role,
                subtype,
                tx,
            } => {
                if let Some(ticket) = registry.join(&code, conn, role, subtype, tx) {
                    arm(ticket, settings.reap_grace);
                }
            }
            Command::Leave { conn } => {
                if let Some(ticket) = registry.leave(conn) {
                    debug!(
                        "Room {} empty, reaping in {}s",
                        ticket.code,
                        settings.reap_grace.as_secs()
                    );
                    arm(ticket, settings.reap_grace);
                }
            }
            Command::Inbound { conn, raw, msg } => {
                registry.dispatch(conn, &raw, &msg);
            }
            Command::Reap(ticket) => {
                registry.reap(&ticket);
            }
            Command::SessionCount { reply } => {
                let _ = reply.send(registry.len());
            }
            Command::Stats { reply } => {
                let _ = reply.send(registry.stats());
            }
        }
    }
    debug!("Relay hub stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn settings() -> HubSettings {
        HubSettings {
            reap_grace: Duration::from_secs(60),
            unjoined_ttl: Duration::from_secs(600),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_room_reaped_after_grace() {
        let hub = RelayHub::spawn(settings());
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Uuid::new_v4();

        hub.join("GRACE1", conn, Role::Display, None, tx);
        hub.leave(conn);
        assert_eq!(hub.session_count().await, 1);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(hub.session_count().await, 1, "reaped too early");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hub.session_count().await, 0, "reaped too late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_within_grace_keeps_room() {
        let hub = RelayHub::spawn(settings());
        let (tx, _rx) = mpsc::unbounded_channel();
        let first = Uuid::new_v4();

        hub.join("GRACE2", first, Role::Controller, None, tx.clone());
        hub.leave(first);
        tokio::time::sleep(Duration::from_secs(30)).await;

        let second = Uuid::new_v4();
        hub.join("GRACE2", second, Role::Controller, None, tx);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(hub.session_count().await, 1);

        let stats = hub.stats().await.unwrap();
        let created = stats
            .recent_events
            .iter()
            .filter(|e| e.room == "GRACE2" && e.kind == crate::events::EventKind::Created)
            .count();
        assert_eq!(created, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclaimed_room_expires() {
        let hub = RelayHub::spawn(settings());
        let code = hub.create(None).await.unwrap();
        assert_eq!(hub.session_count().await, 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(hub.session_count().await, 1);

        tokio::time::sleep(Duration::from_secs(500)).await;
        assert_eq!(hub.session_count().await, 0, "{} should have expired", code);
    }

    #[tokio::test(start_paused = true)]
    async fn test_claimed_room_survives_creation_ttl() {
        let hub = RelayHub::spawn(settings());
        let code = hub.create(None).await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        hub.join(&code, Uuid::new_v4(), Role::Display, None, tx);

        tokio::time::sleep(Duration::from_secs(700)).await;
        assert_eq!(hub.session_count().await, 1);
    }
}
