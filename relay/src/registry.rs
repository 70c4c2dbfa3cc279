//! Session registry
//!
//! Owns every live room. It is a plain struct with no interior locking:
//! the hub task is its only owner, so all mutation is serialized.
//!
//! Room lifecycle:
//! - created by `create` or lazily by the first `join` to an unknown code
//! - a `leave` that empties the room hands back a [`ReapTicket`]
//! - the room is removed when that ticket is redeemed, unless a peer
//!   rejoined in the meantime (which bumps the room epoch)

use crate::events::{EventKind, EventLog, RoomEvent};
use crate::router::{self, Audience, Payload, StateEffect};
use chrono::{DateTime, Utc};
use couchpad_protocol::{Message, Role};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

pub type ConnId = Uuid;

/// Outbound text frames for one socket
pub type PeerTx = mpsc::UnboundedSender<String>;

/// Unambiguous alphabet (no 0/O, 1/I/L)
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
pub const CODE_LEN: usize = 6;

/// Generate a room code from a fresh UUID's entropy
pub fn generate_code() -> String {
    let uuid = Uuid::new_v4();
    uuid.as_bytes()
        .iter()
        .take(CODE_LEN)
        .map(|b| CODE_ALPHABET[(*b as usize) % CODE_ALPHABET.len()] as char)
        .collect()
}

struct Peer {
    role: Role,
    subtype: Option<String>,
    tx: PeerTx,
}

impl Peer {
    fn send(&self, frame: &str) -> bool {
        self.tx.send(frame.to_string()).is_ok()
    }

    fn tagged(&self, subtype: &str) -> bool {
        self.subtype.as_deref() == Some(subtype)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub active_profile: Option<String>,
    pub active_tab: Option<Value>,
    pub active_app: Option<String>,
}

impl RoomState {
    fn apply(&mut self, effect: StateEffect) {
        match effect {
            StateEffect::ActiveTab(tab) => self.active_tab = Some(tab),
            StateEffect::ActiveProfile(profile) => self.active_profile = Some(profile),
            StateEffect::ActiveApp(app) => self.active_app = app,
        }
    }
}

pub struct Room {
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub state: RoomState,
    controllers: HashMap<ConnId, Peer>,
    displays: HashMap<ConnId, Peer>,
    epoch: u64,
}

impl Room {
    fn new(code: String, active_profile: Option<String>) -> Self {
        Self {
            code,
            created_at: Utc::now(),
            state: RoomState {
                active_profile,
                ..RoomState::default()
            },
            controllers: HashMap::new(),
            displays: HashMap::new(),
            epoch: 0,
        }
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    pub fn display_count(&self) -> usize {
        self.displays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty() && self.displays.is_empty()
    }

    fn peers_mut(&mut self, role: Role) -> &mut HashMap<ConnId, Peer> {
        match role {
            Role::Controller => &mut self.controllers,
            Role::Display => &mut self.displays,
        }
    }

    fn peer(&self, conn: &ConnId) -> Option<&Peer> {
        self.controllers.get(conn).or_else(|| self.displays.get(conn))
    }

    fn all_peers(&self) -> impl Iterator<Item = &Peer> {
        self.controllers.values().chain(self.displays.values())
    }

    fn audience<'a>(
        &'a self,
        audience: Audience,
        sender: &'a ConnId,
    ) -> Box<dyn Iterator<Item = &'a Peer> + 'a> {
        match audience {
            Audience::Displays => Box::new(self.displays.values()),
            Audience::Tagged(subtype) => {
                Box::new(self.displays.values().filter(move |p| p.tagged(subtype)))
            }
            Audience::NotTagged(subtype) => {
                Box::new(self.displays.values().filter(move |p| !p.tagged(subtype)))
            }
            Audience::Controllers => Box::new(self.controllers.values()),
            Audience::Sender => Box::new(self.peer(sender).into_iter()),
        }
    }

    fn status(&self) -> Message {
        Message::Status {
            controllers: self.controller_count(),
            displays: self.display_count(),
        }
    }
}

/// Handed out whenever a room becomes empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReapTicket {
    pub code: String,
    epoch: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Counters {
    pub rooms_created: u64,
    pub rooms_reaped: u64,
    pub joins: u64,
    pub messages_relayed: u64,
    pub messages_dropped: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub active_rooms: usize,
    pub connections: usize,
    #[serde(flatten)]
    pub counters: Counters,
    pub recent_events: Vec<RoomEvent>,
}

#[derive(Default)]
pub struct Registry {
    rooms: HashMap<String, Room>,
    members: HashMap<ConnId, String>,
    counters: Counters,
    log: EventLog,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty room with a fresh code. The caller arms the
    /// returned ticket so an unclaimed room does not live forever.
    pub fn create(&mut self, profile: Option<String>) -> (String, ReapTicket) {
        let mut code = generate_code();
        while self.rooms.contains_key(&code) {
            code = generate_code();
        }
        self.insert_room(code.clone(), profile);
        let ticket = ReapTicket {
            code: code.clone(),
            epoch: 0,
        };
        (code, ticket)
    }

    fn insert_room(&mut self, code: String, profile: Option<String>) {
        info!("Room created: {}", code);
        self.counters.rooms_created += 1;
        self.log.record(&code, EventKind::Created);
        self.rooms.insert(code.clone(), Room::new(code, profile));
    }

    /// Add a connection to a room, creating the room if the code is unknown.
    ///
    /// A connection already sitting in another room leaves it first; the
    /// ticket for that room (if it became empty) is returned.
    pub fn join(
        &mut self,
        code: &str,
        conn: ConnId,
        role: Role,
        subtype: Option<String>,
        tx: PeerTx,
    ) -> Option<ReapTicket> {
        let previous = if self.members.contains_key(&conn) {
            self.leave(conn)
        } else {
            None
        };

        if !self.rooms.contains_key(code) {
            self.insert_room(code.to_string(), None);
        }
        let Some(room) = self.rooms.get_mut(code) else {
            return previous;
        };

        room.epoch += 1;
        room.peers_mut(role).insert(
            conn,
            Peer {
                role,
                subtype: subtype.clone(),
                tx,
            },
        );
        self.members.insert(conn, code.to_string());
        self.counters.joins += 1;
        self.log.record(code, EventKind::Joined { role, subtype });
        info!(
            "{} joined room {} ({} controllers, {} displays)",
            role,
            code,
            room.controller_count(),
            room.display_count()
        );

        let joined = Message::Joined {
            room_id: room.code.clone(),
            role,
            controllers: room.controller_count(),
            displays: room.display_count(),
            active_profile: room.state.active_profile.clone(),
            active_tab: room.state.active_tab.clone(),
            active_app: room.state.active_app.clone(),
        };
        if let Some(peer) = room.peer(&conn) {
            peer.send(&joined.encode());
        }

        self.broadcast_status(code);
        previous
    }

    /// Remove a connection. Returns a ticket when its room is now empty.
    pub fn leave(&mut self, conn: ConnId) -> Option<ReapTicket> {
        let code = self.members.remove(&conn)?;
        let room = self.rooms.get_mut(&code)?;

        let removed = room
            .controllers
            .remove(&conn)
            .or_else(|| room.displays.remove(&conn))?;
        self.log.record(&code, EventKind::Left { role: removed.role });
        info!("{} left room {}", removed.role, code);

        if room.is_empty() {
            room.epoch += 1;
            return Some(ReapTicket {
                code,
                epoch: room.epoch,
            });
        }

        self.broadcast_status(&code);
        None
    }

    /// Remove the room named by the ticket if nobody came back
    pub fn reap(&mut self, ticket: &ReapTicket) -> bool {
        let Some(room) = self.rooms.get(&ticket.code) else {
            return false;
        };
        if !room.is_empty() || room.epoch != ticket.epoch {
            debug!("Reap of {} cancelled", ticket.code);
            return false;
        }
        self.rooms.remove(&ticket.code);
        self.counters.rooms_reaped += 1;
        self.log.record(&ticket.code, EventKind::Reaped);
        info!("Room reaped: {}", ticket.code);
        true
    }

    /// Send current peer counts to everyone in the room
    pub fn broadcast_status(&self, code: &str) {
        if let Some(room) = self.rooms.get(code) {
            let frame = room.status().encode();
            for peer in room.all_peers() {
                peer.send(&frame);
            }
        }
    }

    /// Route one inbound message from `conn`; returns the number of frames
    /// handed to peer channels. Unknown connections are a silent no-op.
    pub fn dispatch(&mut self, conn: ConnId, raw: &str, msg: &Message) -> usize {
        let Some(code) = self.members.get(&conn) else {
            self.counters.messages_dropped += 1;
            return 0;
        };
        let Some(room) = self.rooms.get_mut(code) else {
            self.counters.messages_dropped += 1;
            return 0;
        };
        let Some(sender_role) = room.peer(&conn).map(|p| p.role) else {
            self.counters.messages_dropped += 1;
            return 0;
        };

        let route = router::route(sender_role, msg);
        if route.is_noop() {
            debug!("Dropping {} from {} in {}", msg.kind(), sender_role, code);
            self.counters.messages_dropped += 1;
            return 0;
        }

        if let Some(effect) = route.effect {
            room.state.apply(effect);
        }

        let mut delivered = 0;
        for (audience, payload) in route.deliveries {
            let frame = match payload {
                Payload::Verbatim => raw.to_string(),
                Payload::Replace(replacement) => replacement.encode(),
            };
            for peer in room.audience(audience, &conn) {
                if peer.send(&frame) {
                    delivered += 1;
                }
            }
        }
        self.counters.messages_relayed += delivered as u64;
        delivered
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn room(&self, code: &str) -> Option<&Room> {
        self.rooms.get(code)
    }

    pub fn room_of(&self, conn: &ConnId) -> Option<&str> {
        self.members.get(conn).map(|c| c.as_str())
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            active_rooms: self.rooms.len(),
            connections: self.members.len(),
            counters: self.counters,
            recent_events: self.log.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct TestPeer {
        id: ConnId,
        rx: mpsc::UnboundedReceiver<String>,
    }

    impl TestPeer {
        fn join(reg: &mut Registry, code: &str, role: Role, subtype: Option<&str>) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = Uuid::new_v4();
            reg.join(code, id, role, subtype.map(|s| s.to_string()), tx);
            Self { id, rx }
        }

        fn drain(&mut self) -> Vec<Message> {
            let mut out = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                out.push(Message::decode(&frame).unwrap());
            }
            out
        }

        /// Frames other than joined/status bookkeeping
        fn relayed(&mut self) -> Vec<Message> {
            self.drain()
                .into_iter()
                .filter(|m| !matches!(m, Message::Status { .. } | Message::Joined { .. }))
                .collect()
        }
    }

    fn send(reg: &mut Registry, peer: &TestPeer, msg: Message) -> usize {
        let raw = msg.encode();
        reg.dispatch(peer.id, &raw, &msg)
    }

    #[test]
    fn test_codes_are_unique() {
        let mut reg = Registry::new();
        let codes: HashSet<String> = (0..2000).map(|_| reg.create(None).0).collect();
        assert_eq!(codes.len(), 2000);
        assert_eq!(reg.len(), 2000);
        for code in &codes {
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_join_creates_unknown_room() {
        let mut reg = Registry::new();
        let mut display = TestPeer::join(&mut reg, "LIVING", Role::Display, None);
        assert_eq!(reg.len(), 1);
        let frames = display.drain();
        assert!(matches!(
            &frames[0],
            Message::Joined { room_id, role: Role::Display, displays: 1, .. } if room_id == "LIVING"
        ));
        assert_eq!(
            frames[1],
            Message::Status {
                controllers: 0,
                displays: 1
            }
        );
    }

    #[test]
    fn test_action_reaches_displays_only() {
        let mut reg = Registry::new();
        let (code, _) = reg.create(None);
        let mut display_a = TestPeer::join(&mut reg, &code, Role::Display, None);
        let mut display_b = TestPeer::join(&mut reg, &code, Role::Display, None);
        let mut controller = TestPeer::join(&mut reg, &code, Role::Controller, None);
        let mut other_controller = TestPeer::join(&mut reg, &code, Role::Controller, None);
        for p in [&mut display_a, &mut display_b, &mut controller, &mut other_controller] {
            p.drain();
        }

        let delivered = send(&mut reg, &controller, Message::action("up"));
        assert_eq!(delivered, 2);
        assert_eq!(display_a.relayed(), vec![Message::action("up")]);
        assert_eq!(display_b.relayed(), vec![Message::action("up")]);
        assert!(controller.drain().is_empty());
        assert!(other_controller.drain().is_empty());
    }

    #[test]
    fn test_relay_is_verbatim() {
        let mut reg = Registry::new();
        let mut display = TestPeer::join(&mut reg, "ROOM42", Role::Display, None);
        let controller = TestPeer::join(&mut reg, "ROOM42", Role::Controller, None);
        display.drain();

        let raw = r#"{"type":"action","action":"up","extra":{"k":1}}"#;
        let msg = Message::decode(raw).unwrap();
        reg.dispatch(controller.id, raw, &msg);
        assert_eq!(display.rx.try_recv().unwrap(), raw);
    }

    #[test]
    fn test_no_target_peers_is_noop() {
        let mut reg = Registry::new();
        let mut controller = TestPeer::join(&mut reg, "EMPTY1", Role::Controller, None);
        controller.drain();
        assert_eq!(send(&mut reg, &controller, Message::action("up")), 0);
        assert!(controller.drain().is_empty());
    }

    #[test]
    fn test_unknown_connection_is_noop() {
        let mut reg = Registry::new();
        let msg = Message::action("up");
        assert_eq!(reg.dispatch(Uuid::new_v4(), &msg.encode(), &msg), 0);
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn test_dpad_dual_routing() {
        let mut reg = Registry::new();
        let mut tv = TestPeer::join(&mut reg, "TVROOM", Role::Display, Some("tv"));
        let mut browser = TestPeer::join(&mut reg, "TVROOM", Role::Display, None);
        let controller = TestPeer::join(&mut reg, "TVROOM", Role::Controller, None);
        tv.drain();
        browser.drain();

        send(
            &mut reg,
            &controller,
            Message::Dpad {
                direction: "down".to_string(),
            },
        );
        assert_eq!(
            tv.relayed(),
            vec![Message::Dpad {
                direction: "down".to_string()
            }]
        );
        assert_eq!(browser.relayed(), vec![Message::action("down")]);
    }

    #[test]
    fn test_state_effects_are_room_local() {
        let mut reg = Registry::new();
        let _d1 = TestPeer::join(&mut reg, "ROOMAA", Role::Display, None);
        let c1 = TestPeer::join(&mut reg, "ROOMAA", Role::Controller, None);
        let _d2 = TestPeer::join(&mut reg, "ROOMBB", Role::Display, None);

        send(
            &mut reg,
            &c1,
            Message::SetProfile {
                profile: "video".to_string(),
            },
        );
        send(
            &mut reg,
            &c1,
            Message::LaunchApp {
                app_id: "netflix".to_string(),
            },
        );
        send(
            &mut reg,
            &c1,
            Message::SetProfile {
                profile: "scroll".to_string(),
            },
        );

        let a = &reg.room("ROOMAA").unwrap().state;
        assert_eq!(a.active_profile.as_deref(), Some("scroll"));
        assert_eq!(a.active_app.as_deref(), Some("netflix"));
        assert_eq!(reg.room("ROOMBB").unwrap().state, RoomState::default());

        send(&mut reg, &c1, Message::Home);
        assert_eq!(reg.room("ROOMAA").unwrap().state.active_app, None);
    }

    #[test]
    fn test_joined_carries_room_state() {
        let mut reg = Registry::new();
        let (code, _) = reg.create(Some("presentation".to_string()));
        let mut display = TestPeer::join(&mut reg, &code, Role::Display, None);
        match &display.drain()[0] {
            Message::Joined { active_profile, .. } => {
                assert_eq!(active_profile.as_deref(), Some("presentation"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_status_broadcast_on_leave() {
        let mut reg = Registry::new();
        let mut display = TestPeer::join(&mut reg, "STATUS", Role::Display, None);
        let controller = TestPeer::join(&mut reg, "STATUS", Role::Controller, None);
        display.drain();

        assert!(reg.leave(controller.id).is_none());
        assert_eq!(
            display.drain(),
            vec![Message::Status {
                controllers: 0,
                displays: 1
            }]
        );
    }

    #[test]
    fn test_reap_only_when_still_empty() {
        let mut reg = Registry::new();
        let display = TestPeer::join(&mut reg, "REAPME", Role::Display, None);
        let ticket = reg.leave(display.id).expect("room became empty");

        // A peer comes back before the grace window ends
        let back = TestPeer::join(&mut reg, "REAPME", Role::Display, None);
        assert!(!reg.reap(&ticket));
        assert_eq!(reg.len(), 1);

        let second = reg.leave(back.id).expect("empty again");
        assert!(!reg.reap(&ticket), "stale ticket must not reap");
        assert!(reg.reap(&second));
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn test_rejoin_switches_rooms() {
        let mut reg = Registry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Uuid::new_v4();
        reg.join("FIRST1", conn, Role::Display, None, tx.clone());
        let ticket = reg.join("SECOND", conn, Role::Controller, None, tx);
        assert_eq!(reg.room_of(&conn), Some("SECOND"));
        assert_eq!(ticket.map(|t| t.code), Some("FIRST1".to_string()));
        assert_eq!(reg.room("FIRST1").unwrap().display_count(), 0);
        assert_eq!(reg.room("SECOND").unwrap().controller_count(), 1);
    }

    #[test]
    fn test_closed_peer_channel_does_not_break_fanout() {
        let mut reg = Registry::new();
        let gone = TestPeer::join(&mut reg, "FANOUT", Role::Display, None);
        let mut alive = TestPeer::join(&mut reg, "FANOUT", Role::Display, None);
        let controller = TestPeer::join(&mut reg, "FANOUT", Role::Controller, None);
        drop(gone.rx);
        alive.drain();

        assert_eq!(send(&mut reg, &controller, Message::action("select")), 1);
        assert_eq!(alive.relayed(), vec![Message::action("select")]);
    }
}
