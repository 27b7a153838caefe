//! Per-connection state machine for a cooperating chat server.
//!
//! Peer servers are conduits, not users: after a CONNECT with the shared
//! secret they absorb mirrored events from this server (the dispatcher
//! writes to their socket directly) and re-emit the events they send us
//! on our own local channels. Consistent global state across servers is
//! explicitly not attempted.

use log::{debug, info, warn};
use std::sync::Arc;

use crate::commands::ServerCommand;
use crate::connection::Connection;
use crate::dispatcher::{Dispatcher, PeerId, ServerHandle, next_peer_id};
use crate::message::Message;

#[derive(Debug, PartialEq)]
enum ServerState {
    Initial,
    Connected,
    Disconnected,
}

pub struct ServerPeer {
    id: PeerId,
    dispatcher: Arc<Dispatcher>,
    secret: String,
    conn: Connection,
    state: ServerState,
}

impl ServerPeer {
    pub fn new(dispatcher: Arc<Dispatcher>, secret: String, conn: Connection) -> Self {
        ServerPeer {
            id: next_peer_id(),
            dispatcher,
            secret,
            conn,
            state: ServerState::Initial,
        }
    }

    pub async fn run(mut self, first: Message) {
        self.handle_message(first).await;

        while self.state == ServerState::Connected {
            match self.conn.messages.recv().await {
                Some(msg) => self.handle_message(msg).await,
                None => break,
            }
        }

        self.dispatcher.remove_server(self.id);
        self.conn.close();
        info!("[{}] server peer finished", self.id);
    }

    async fn handle_message(&mut self, msg: Message) {
        info!("[{}] >> {msg}", self.id);
        match self.state {
            ServerState::Initial => self.handle_initial(msg).await,
            ServerState::Connected => self.handle_connected(msg).await,
            ServerState::Disconnected => {}
        }
    }

    // CONNECT <password> -- anything else, or a wrong secret, drops the
    // link immediately.
    async fn handle_initial(&mut self, msg: Message) {
        match ServerCommand::from_message(&msg) {
            Some(ServerCommand::Connect { password }) if password == self.secret => {
                self.dispatcher.add_server(ServerHandle {
                    id: self.id,
                    lines: self.conn.out.line_sender(),
                });
                self.state = ServerState::Connected;
            }
            Some(ServerCommand::Connect { .. }) => {
                warn!("[{}] peer server presented a wrong secret", self.id);
                self.state = ServerState::Disconnected;
            }
            _ => {
                warn!("[{}] bad opening message: {}", self.id, msg.command);
                self.state = ServerState::Disconnected;
            }
        }
    }

    // Mirrored events from the remote side are re-emitted locally, best
    // effort. Remote users are never subscribed into local channels.
    async fn handle_connected(&mut self, msg: Message) {
        match ServerCommand::from_message(&msg) {
            Some(ServerCommand::Disconnect) => {
                self.state = ServerState::Disconnected;
                return;
            }
            Some(ServerCommand::Sync) => {
                // Best-effort fan-out only; there is no state to sync.
                debug!("[{}] SYNC acknowledged as a no-op", self.id);
                return;
            }
            Some(ServerCommand::Connect { .. }) => {
                debug!("[{}] spurious CONNECT ignored", self.id);
                return;
            }
            None => {}
        }

        match msg.command.as_str() {
            // Channel traffic: hand it to our local presents.
            "MSG" | "KICKED" | "ADDED" | "JOINED" => {
                let channel = msg.params[0].clone();
                self.dispatcher.publish(&channel, self.id, &msg).await;
            }
            "OK_DELETED" => {
                let channel = msg.params[0].clone();
                self.dispatcher.publish(&channel, self.id, &msg).await;
                self.dispatcher.remove_channel(&channel);
            }
            // Directed delivery for a user that may be local here.
            "NOTIFIED" => {
                let target = msg.params[1].clone();
                if !self.dispatcher.notify(&target, &msg).await {
                    debug!("[{}] NOTIFIED for offline user {target} dropped", self.id);
                }
            }
            // Account and presence echoes carry no local side effects.
            "OK_REG" | "OK_LOGIN" | "OK_LOGOUT" | "OK_UNREG" | "OK_CREATED" | "OK_JOINED"
            | "USR_QUIT" => {
                debug!("[{}] absorbed {}", self.id, msg.command);
            }
            other => {
                warn!("[{}] unexpected broadcast {other}", self.id);
            }
        }
    }
}
