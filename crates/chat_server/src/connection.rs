//! One full-duplex line connection.
//!
//! The socket is split into a reader task and a writer task. The reader
//! parses each LF-terminated line into a [`Message`] and feeds the peer
//! task through a channel; malformed lines are logged and dropped while
//! the connection stays open. When the socket closes for any reason the
//! message channel closes with it, which the peer task observes exactly
//! once. The writer drains an outbound channel of serialized lines, so
//! sends are ordered per sender.

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::message::Message;
use crate::replies::Reply;

// Bounded queues: a peer that stops draining its socket eventually
// backpressures the dispatcher instead of growing without limit.
const INBOUND_CHANNEL_SIZE: usize = 32;
const OUTBOUND_CHANNEL_SIZE: usize = 32;

/// Sending side of a connection, cheap to clone into the dispatcher.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<String>,
}

impl Outbound {
    pub async fn send_line(&self, line: String) {
        if self.tx.send(line).await.is_err() {
            debug!("send on closed connection dropped");
        }
    }

    pub async fn send(&self, reply: Reply<'_>) {
        self.send_line(reply.format()).await;
    }

    pub fn line_sender(&self) -> mpsc::Sender<String> {
        self.tx.clone()
    }
}

/// A connection as seen by a peer task: parsed inbound messages plus the
/// outbound line queue.
pub struct Connection {
    pub messages: mpsc::Receiver<Message>,
    pub out: Outbound,
    reader: AbortHandle,
}

impl Connection {
    /// Stops the reader; together with dropping `out` this releases both
    /// socket halves.
    pub fn close(&self) {
        self.reader.abort();
    }
}

pub fn spawn_connection(socket: TcpStream) -> Connection {
    let peer_addr = socket.peer_addr().ok();
    let (read_half, write_half) = socket.into_split();

    let (tx_inbound, rx_inbound) = mpsc::channel::<Message>(INBOUND_CHANNEL_SIZE);
    let (tx_outbound, mut rx_outbound) = mpsc::channel::<String>(OUTBOUND_CHANNEL_SIZE);

    let reader = tokio::spawn(async move {
        let mut reader = BufReader::new(read_half);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => {
                    info!("connection closed by {peer_addr:?}");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("read error from {peer_addr:?}: {e}");
                    break;
                }
            }

            // UTF-8 with replacement, then strip the line ending.
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);
            match Message::parse(line) {
                Ok(msg) => {
                    if tx_inbound.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("dropping bad line from {peer_addr:?}: {e}"),
            }
        }
        // tx_inbound drops here; the peer task sees the channel close.
    })
    .abort_handle();

    tokio::spawn(async move {
        let mut writer = write_half;
        while let Some(line) = rx_outbound.recv().await {
            let framed = format!("{line}\n");
            if let Err(e) = writer.write_all(framed.as_bytes()).await {
                error!("write error to {peer_addr:?}: {e}");
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    Connection {
        messages: rx_inbound,
        out: Outbound { tx: tx_outbound },
        reader,
    }
}
