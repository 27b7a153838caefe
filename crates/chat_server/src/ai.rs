//! Outbound side-channel to the toxicity scoring service.
//!
//! One fresh connection per scored line, fire-and-forget: the scoring
//! service answers to the telemetry sink on its own, so nothing is read
//! back here. Failures are logged and never surface to the chat path.

use log::{debug, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[derive(Debug, Clone)]
pub struct AiConnector {
    addr: String,
}

impl AiConnector {
    pub fn new(addr: String) -> Self {
        AiConnector { addr }
    }

    /// Ships one serialized MSG line to the scoring service.
    pub fn score(&self, line: String) {
        let addr = self.addr.clone();
        tokio::spawn(async move {
            match TcpStream::connect(&addr).await {
                Ok(mut stream) => {
                    let framed = format!("{line}\n");
                    match stream.write_all(framed.as_bytes()).await {
                        Ok(()) => {
                            debug!("AI: sent line for scoring");
                            let _ = stream.shutdown().await;
                        }
                        Err(e) => warn!("AI: failed to send line: {e}"),
                    }
                }
                Err(e) => warn!("AI: cannot reach scoring service at {addr}: {e}"),
            }
        });
    }
}
