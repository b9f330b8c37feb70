//! WebSocket tether client with reactor architecture.
//!
//! The socket is owned by a background reactor task. Callers submit requests
//! through an mpsc channel and receive responses on per-request oneshot
//! channels, keyed by request id. The reactor enforces the response deadline
//! with a periodic cleanup tick, so an `await` never blocks indefinitely.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::frame::{RequestFrame, ResponseFrame};

/// How often the reactor sweeps for requests past their deadline.
const CLEANUP_INTERVAL: Duration = Duration::from_millis(250);

/// Tether failures.
#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    /// The WebSocket handshake failed; the app's execution endpoint is not
    /// reachable. Terminal for bootstrap.
    #[error("failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    /// No response arrived within the configured deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The app reported a failure, or the channel faulted mid-request.
    #[error("execution failed: {0}")]
    Execution(String),

    /// The tether is shut down or the socket is gone.
    #[error("tether closed")]
    Closed,
}

/// Options for a tether.
#[derive(Debug, Clone)]
pub struct TetherOptions {
    /// Deadline for awaiting a response.
    pub timeout: Duration,
}

impl Default for TetherOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
        }
    }
}

/// Command sent to the reactor task
enum ReactorCommand {
    /// Send a request and return response via oneshot
    Submit {
        text: String,
        rid: Uuid,
        timeout: Duration,
        response_tx: oneshot::Sender<Result<Value, TetherError>>,
    },
    /// Shutdown the reactor gracefully
    Shutdown,
}

/// A pending request waiting for its response
struct PendingRequest {
    response_tx: oneshot::Sender<Result<Value, TetherError>>,
    deadline: Instant,
    timeout: Duration,
}

/// Handle for one outstanding request.
///
/// Returned by [`Tether::submit`]; redeemed by [`Tether::response`]. Dropping
/// a ticket abandons the request: its eventual response is discarded by the
/// reactor as an orphan.
pub struct Ticket {
    rid: Uuid,
    rx: oneshot::Receiver<Result<Value, TetherError>>,
}

impl Ticket {
    /// The correlation token for this request.
    pub fn rid(&self) -> Uuid {
        self.rid
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The reactor task - owns the socket, handles all I/O.
///
/// This task runs continuously, interleaving:
/// - Processing commands from callers (send requests)
/// - Receiving responses from the socket
/// - Cleaning up timed-out requests
async fn reactor_task(ws: WsStream, mut cmd_rx: mpsc::Receiver<ReactorCommand>, name: String) {
    let (mut sink, mut stream) = ws.split();
    let mut pending: HashMap<Uuid, PendingRequest> = HashMap::new();
    let mut cleanup_interval = tokio::time::interval(CLEANUP_INTERVAL);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    debug!("{}: Reactor task started", name);

    loop {
        tokio::select! {
            // Bias towards processing commands first to avoid starvation
            biased;

            // Process commands from callers
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ReactorCommand::Submit { text, rid, timeout, response_tx }) => {
                        trace!("{}: Sending request {}", name, rid);

                        if let Err(e) = sink.send(Message::Text(text)).await {
                            warn!("{}: Send failed for {}: {}", name, rid, e);
                            let _ = response_tx.send(Err(TetherError::Execution(format!(
                                "send failed: {}", e
                            ))));
                            continue;
                        }

                        // Register pending request
                        pending.insert(rid, PendingRequest {
                            response_tx,
                            deadline: Instant::now() + timeout,
                            timeout,
                        });
                        trace!("{}: Request {} registered, {} pending", name, rid, pending.len());
                    }
                    Some(ReactorCommand::Shutdown) => {
                        info!("{}: Reactor shutting down, failing {} pending requests", name, pending.len());
                        for (rid, req) in pending.drain() {
                            let _ = req.response_tx.send(Err(TetherError::Closed));
                            trace!("{}: Failed pending request {} due to shutdown", name, rid);
                        }
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    None => {
                        info!("{}: Command channel closed, reactor exiting", name);
                        break;
                    }
                }
            }

            // Receive responses from the socket
            result = stream.next() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        match ResponseFrame::from_text(&text) {
                            Ok(frame) => {
                                trace!("{}: Received response for {}", name, frame.rid);

                                if let Some(req) = pending.remove(&frame.rid) {
                                    let outcome = match (frame.data, frame.error) {
                                        (Some(data), _) => Ok(data),
                                        (None, Some(message)) => {
                                            Err(TetherError::Execution(message))
                                        }
                                        // from_text guarantees one of the two
                                        (None, None) => unreachable!(),
                                    };
                                    let _ = req.response_tx.send(outcome);
                                } else {
                                    debug!(
                                        "{}: Discarding orphan response for {} (not in {} pending)",
                                        name, frame.rid, pending.len()
                                    );
                                }
                            }
                            Err(e) => {
                                warn!("{}: Failed to parse response frame: {}", name, e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("{}: Peer closed socket, failing {} pending requests", name, pending.len());
                        for (_, req) in pending.drain() {
                            let _ = req.response_tx.send(Err(TetherError::Closed));
                        }
                        break;
                    }
                    // Pings are answered by the WebSocket layer
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("{}: Socket error, failing {} pending requests: {}", name, pending.len(), e);
                        for (_, req) in pending.drain() {
                            let _ = req.response_tx.send(Err(TetherError::Execution(format!(
                                "socket error: {}", e
                            ))));
                        }
                        break;
                    }
                }
            }

            // Cleanup expired requests
            _ = cleanup_interval.tick() => {
                let now = Instant::now();
                let expired: Vec<Uuid> = pending
                    .iter()
                    .filter(|(_, req)| now > req.deadline)
                    .map(|(rid, _)| *rid)
                    .collect();

                for rid in &expired {
                    if let Some(req) = pending.remove(rid) {
                        debug!("{}: Request {} timed out", name, rid);
                        let _ = req.response_tx.send(Err(TetherError::Timeout(req.timeout)));
                    }
                }

                if !expired.is_empty() {
                    debug!("{}: Expired {} requests, {} remaining", name, expired.len(), pending.len());
                }
            }
        }
    }

    debug!("{}: Reactor task exiting", name);
}

/// Persistent duplex channel to one app's execution endpoint.
///
/// Key design decisions:
/// - Socket owned by background reactor task (no lock contention)
/// - Requests sent via channel, responses via oneshot
/// - Deadlines enforced in the reactor, not the caller
/// - No retry and no reconnect: a dead tether stays dead, the registry
///   decides what callers see
pub struct Tether {
    name: String,
    url: String,
    timeout: Duration,
    cmd_tx: mpsc::Sender<ReactorCommand>,
}

impl Tether {
    /// Open the WebSocket and spawn the reactor task.
    ///
    /// Unlike a ZMQ connect, this fails fast: if the endpoint is not
    /// reachable the tether is never created.
    pub async fn connect(
        url: &str,
        name: &str,
        options: TetherOptions,
    ) -> Result<Arc<Self>, TetherError> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| TetherError::Connect {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        info!("{}: Connected to {}", name, url);

        // 256-deep command channel should be plenty
        let (cmd_tx, cmd_rx) = mpsc::channel(256);

        let reactor_name = name.to_string();
        tokio::spawn(async move {
            reactor_task(ws, cmd_rx, reactor_name).await;
        });

        Ok(Arc::new(Self {
            name: name.to_string(),
            url: url.to_string(),
            timeout: options.timeout,
            cmd_tx,
        }))
    }

    /// Submit a request without waiting for its response.
    ///
    /// Returns as soon as the reactor has accepted the request. The returned
    /// [`Ticket`] is redeemed with [`response`](Self::response); any number
    /// of tickets may be outstanding at once.
    pub async fn submit(&self, data: Value, uid: &str) -> Result<Ticket, TetherError> {
        let frame = RequestFrame::new(uid, data);
        let rid = frame.rid;
        let (response_tx, rx) = oneshot::channel();

        debug!("{}: Submitting request {} for uid {}", self.name, rid, uid);

        self.cmd_tx
            .send(ReactorCommand::Submit {
                text: frame.to_text(),
                rid,
                timeout: self.timeout,
                response_tx,
            })
            .await
            .map_err(|_| TetherError::Closed)?;

        Ok(Ticket { rid, rx })
    }

    /// Wait for the response matching `ticket`.
    ///
    /// Blocks until the tagged response arrives, the deadline passes
    /// (`Timeout`), or the channel faults (`Execution`/`Closed`). Other
    /// outstanding tickets are unaffected.
    pub async fn response(&self, ticket: Ticket) -> Result<Value, TetherError> {
        // Reactor enforces the deadline; a dropped sender means it died
        ticket.rx.await.map_err(|_| TetherError::Closed)?
    }

    /// Submit and wait - the common case.
    pub async fn call(&self, data: Value, uid: &str) -> Result<Value, TetherError> {
        let ticket = self.submit(data, uid).await?;
        self.response(ticket).await
    }

    /// Gracefully shut down the reactor task, failing anything pending.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(ReactorCommand::Shutdown).await;
    }

    /// Endpoint URL this tether is bound to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// App name, used for logging.
    pub fn name(&self) -> &str {
        &self.name
    }
}
