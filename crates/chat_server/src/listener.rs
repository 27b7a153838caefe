//! TCP listener and peer factory.
//!
//! Every accepted socket starts as an anonymous connection; the very
//! first well-formed message decides what it becomes: REGISTER or LOGIN
//! make it a client peer, CONNECT a peer server, anything else closes it
//! on the spot.

use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

use crate::ai::AiConnector;
use crate::config::Config;
use crate::connection::{Connection, spawn_connection};
use crate::db::Db;
use crate::dispatcher::Dispatcher;
use crate::errors::ServerError;
use crate::handlers::client::ClientPeer;
use crate::handlers::server::ServerPeer;

pub struct Server {
    config: Config,
    db: Db,
    dispatcher: Arc<Dispatcher>,
    ai: AiConnector,
    listener: TcpListener,
}

impl Server {
    /// Binds the listening socket and wires up the shared services.
    pub async fn bind(config: Config, db: Db) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        let ai = AiConnector::new(config.ai_addr());
        Ok(Server {
            config,
            db,
            dispatcher: Arc::new(Dispatcher::new()),
            ai,
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> Result<(), ServerError> {
        info!("listening on {}", self.listener.local_addr()?);

        loop {
            let (socket, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("accept failed: {e}");
                    continue;
                }
            };
            info!("connection from {addr}");

            let db = self.db.clone();
            let dispatcher = self.dispatcher.clone();
            let ai = self.ai.clone();
            let secret = self.config.server.secret.clone();
            tokio::spawn(async move {
                handle_connection(socket, addr, db, dispatcher, ai, secret).await;
            });
        }
    }
}

async fn handle_connection(
    socket: TcpStream,
    addr: SocketAddr,
    db: Db,
    dispatcher: Arc<Dispatcher>,
    ai: AiConnector,
    secret: String,
) {
    let mut conn: Connection = spawn_connection(socket);

    // The transport already drops malformed lines, so the first message
    // we see here is well-formed; it picks the peer type.
    let Some(first) = conn.messages.recv().await else {
        info!("{addr} went away before identifying");
        return;
    };

    match first.command.as_str() {
        "REGISTER" | "LOGIN" => {
            ClientPeer::new(db, dispatcher, ai, conn).run(first).await;
        }
        "CONNECT" => {
            ServerPeer::new(dispatcher, secret, conn).run(first).await;
        }
        other => {
            warn!("bad opening message from {addr}: {other}");
            conn.close();
        }
    }
}
