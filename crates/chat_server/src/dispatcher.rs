//! In-memory router between online peers.
//!
//! The dispatcher maps nicks to locally logged-in client peers, tracks
//! peer-server links, and keeps one runtime channel per conversation: the
//! set of nicks currently *present* there. It stores cheap handles (mpsc
//! senders), never the peers themselves; presence sets hold nicks, so
//! removing a peer is one map removal plus a sweep over the channels.

use dashmap::DashMap;
use dashmap::DashSet;
use dashmap::mapref::entry::Entry;
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::message::Message;

/// Pseudo-channel addressing every connected peer server. Routing only;
/// it never exists in the store or in the channel map.
pub const SERVERS: &str = "servers";

pub type PeerId = u64;

static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_peer_id() -> PeerId {
    NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Route to a logged-in client peer: events land in the peer task, which
/// forwards them or transitions state.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub id: PeerId,
    pub events: mpsc::Sender<Message>,
}

/// Route to a peer server: mirrored events go straight out its socket.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    pub id: PeerId,
    pub lines: mpsc::Sender<String>,
}

#[derive(Debug, Default)]
struct Channel {
    present: DashSet<String>,
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    user2peer: DashMap<String, ClientHandle>,
    server_peers: DashMap<PeerId, ServerHandle>,
    channels: DashMap<String, Channel>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher::default()
    }

    /// Registers a client under `nick`. Returns `false` when the nick is
    /// already online; the caller rejects the login in that case.
    pub fn add_client(&self, nick: &str, handle: ClientHandle) -> bool {
        debug!("DISPATCH: add_client {nick}");
        match self.user2peer.entry(nick.to_owned()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(handle);
                true
            }
        }
    }

    pub fn add_server(&self, handle: ServerHandle) {
        debug!("DISPATCH: add_server {}", handle.id);
        self.server_peers.insert(handle.id, handle);
    }

    /// Drops the client and strips it from every channel's presence set.
    /// The id guard keeps a stale disconnect from removing a newer
    /// session that claimed the nick in the meantime.
    pub fn remove_client(&self, nick: &str, id: PeerId) {
        debug!("DISPATCH: remove_client {nick}");
        let removed = self
            .user2peer
            .remove_if(nick, |_, handle| handle.id == id)
            .is_some();
        if removed {
            for channel in self.channels.iter() {
                channel.present.remove(nick);
            }
        }
    }

    pub fn remove_server(&self, id: PeerId) {
        debug!("DISPATCH: remove_server {id}");
        self.server_peers.remove(&id);
    }

    /// Lazily creates a runtime channel. With `replace` the presence set
    /// starts over.
    pub fn add_channel(&self, name: &str, replace: bool) {
        debug!("DISPATCH: add_channel {name}");
        if replace {
            self.channels.insert(name.to_owned(), Channel::default());
        } else {
            self.channels.entry(name.to_owned()).or_default();
        }
    }

    pub fn remove_channel(&self, name: &str) {
        debug!("DISPATCH: remove_channel {name}");
        self.channels.remove(name);
    }

    /// Intersection of `nicks` with the locally online users.
    pub fn is_on(&self, nicks: &[String]) -> Vec<String> {
        nicks
            .iter()
            .filter(|nick| self.user2peer.contains_key(nick.as_str()))
            .cloned()
            .collect()
    }

    pub fn is_online(&self, nick: &str) -> bool {
        self.user2peer.contains_key(nick)
    }

    /// Nicks currently present on `name`, or empty if the channel has no
    /// runtime entry.
    pub fn names(&self, name: &str) -> Vec<String> {
        self.channels
            .get(name)
            .map(|channel| channel.present.iter().map(|nick| nick.key().clone()).collect())
            .unwrap_or_default()
    }

    pub fn subscribe(&self, name: &str, nick: &str) {
        debug!("DISPATCH: subscribe {nick} to {name}");
        if let Some(channel) = self.channels.get(name) {
            channel.present.insert(nick.to_owned());
        }
    }

    pub fn unsubscribe(&self, name: &str, nick: &str) {
        debug!("DISPATCH: unsubscribe {nick} from {name}");
        if let Some(channel) = self.channels.get(name) {
            channel.present.remove(nick);
        }
    }

    /// Delivers `msg` to every local peer present on `channel`, except
    /// the author. Publishing on [`SERVERS`] fans the serialized line out
    /// to every peer server instead. Mirroring an event across the
    /// network is the caller's job: publish locally, then on `SERVERS`.
    pub async fn publish(&self, channel: &str, author: PeerId, msg: &Message) {
        debug!("DISPATCH: publish {} on {channel}", msg.command);
        if channel == SERVERS {
            let line = msg.to_string();
            let targets: Vec<ServerHandle> = self
                .server_peers
                .iter()
                .filter(|entry| entry.id != author)
                .map(|entry| entry.value().clone())
                .collect();
            for target in targets {
                let _ = target.lines.send(line.clone()).await;
            }
            return;
        }

        let Some(present) = self
            .channels
            .get(channel)
            .map(|c| c.present.iter().map(|nick| nick.key().clone()).collect::<Vec<_>>())
        else {
            return;
        };
        // Collect handles before awaiting: map guards must not be held
        // across a suspension point.
        let handles: Vec<ClientHandle> = present
            .iter()
            .filter_map(|nick| self.user2peer.get(nick.as_str()))
            .filter(|handle| handle.id != author)
            .map(|handle| handle.value().clone())
            .collect();
        for handle in handles {
            let _ = handle.events.send(msg.clone()).await;
        }
    }

    /// Direct delivery to one online user. Returns whether a peer was
    /// found.
    pub async fn notify(&self, nick: &str, msg: &Message) -> bool {
        debug!("DISPATCH: notify {nick}");
        let Some(handle) = self.user2peer.get(nick).map(|h| h.value().clone()) else {
            return false;
        };
        handle.events.send(msg.clone()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(events: mpsc::Sender<Message>) -> ClientHandle {
        ClientHandle {
            id: next_peer_id(),
            events,
        }
    }

    fn nicks(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn publish_reaches_present_peers_except_author() {
        let dispatcher = Dispatcher::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let (tx_c, mut rx_c) = mpsc::channel(8);
        let alice = client(tx_a);
        let author_id = alice.id;
        dispatcher.add_client("alice", alice);
        dispatcher.add_client("bob", client(tx_b));
        dispatcher.add_client("carol", client(tx_c));

        dispatcher.add_channel("#lounge", false);
        dispatcher.subscribe("#lounge", "alice");
        dispatcher.subscribe("#lounge", "bob");
        // carol is online but not present

        let msg = Message::with_prefix("alice", "MSG", ["#lounge", "hi"]);
        dispatcher.publish("#lounge", author_id, &msg).await;

        assert_eq!(rx_b.recv().await.unwrap(), msg);
        assert!(rx_a.try_recv().is_err(), "author must not be echoed");
        assert!(rx_c.try_recv().is_err(), "absent peer must not receive");
    }

    #[tokio::test]
    async fn is_on_returns_the_online_subset() {
        let dispatcher = Dispatcher::new();
        let (tx, _rx) = mpsc::channel(8);
        dispatcher.add_client("alice", client(tx));

        let on = dispatcher.is_on(&nicks(&["alice", "ghost"]));
        assert_eq!(on, vec!["alice"]);
    }

    #[tokio::test]
    async fn removing_a_client_strips_it_from_presence_sets() {
        let dispatcher = Dispatcher::new();
        let (tx, _rx) = mpsc::channel(8);
        let handle = client(tx);
        let id = handle.id;
        dispatcher.add_client("alice", handle);
        dispatcher.add_channel("#a", false);
        dispatcher.add_channel("#b", false);
        dispatcher.subscribe("#a", "alice");
        dispatcher.subscribe("#b", "alice");

        dispatcher.remove_client("alice", id);

        assert!(!dispatcher.is_online("alice"));
        assert!(dispatcher.names("#a").is_empty());
        assert!(dispatcher.names("#b").is_empty());
    }

    #[tokio::test]
    async fn second_session_for_a_nick_is_refused() {
        let dispatcher = Dispatcher::new();
        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);
        assert!(dispatcher.add_client("alice", client(tx1)));
        assert!(!dispatcher.add_client("alice", client(tx2)));
    }

    #[tokio::test]
    async fn servers_pseudo_channel_fans_out_lines() {
        let dispatcher = Dispatcher::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let origin = ServerHandle {
            id: next_peer_id(),
            lines: tx1,
        };
        let origin_id = origin.id;
        dispatcher.add_server(origin);
        dispatcher.add_server(ServerHandle {
            id: next_peer_id(),
            lines: tx2,
        });

        let msg = Message::new("OK_LOGIN", ["alice"]);
        dispatcher.publish(SERVERS, origin_id, &msg).await;

        assert_eq!(rx2.recv().await.unwrap(), "OK_LOGIN alice");
        assert!(rx1.try_recv().is_err(), "originator must be excluded");
    }

    #[tokio::test]
    async fn stale_disconnect_does_not_remove_newer_session() {
        let dispatcher = Dispatcher::new();
        let (tx1, _rx1) = mpsc::channel(8);
        let old = client(tx1);
        let old_id = old.id;
        dispatcher.add_client("alice", old);
        dispatcher.remove_client("alice", old_id);

        let (tx2, _rx2) = mpsc::channel(8);
        dispatcher.add_client("alice", client(tx2));
        // a second cleanup with the old id must leave the new session
        dispatcher.remove_client("alice", old_id);
        assert!(dispatcher.is_online("alice"));
    }
}
