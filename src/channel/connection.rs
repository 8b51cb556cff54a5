//! Push-channel ownership and reconnection.
//!
//! One logical connection exists at a time. A dropped or failed socket is
//! discarded whole and a fresh one dialed after a fixed delay; there is no
//! backoff and no pooling. Connectivity is published on a watch channel so
//! the polling fallback can gate itself on it.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::ClientFrame;
use crate::telemetry;

/// Delay before re-dialing after a drop. Fixed, deliberately not exponential.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Disconnected,
    Connecting,
    Connected,
}

/// Cloneable handle for emitting frames and observing connectivity.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    state: watch::Receiver<ConnectivityState>,
    outbound: mpsc::UnboundedSender<ClientFrame>,
}

impl ConnectionHandle {
    /// Build a handle from raw channel halves. Embedders driving a custom
    /// transport (or tests) can construct one directly.
    pub fn new(
        state: watch::Receiver<ConnectivityState>,
        outbound: mpsc::UnboundedSender<ClientFrame>,
    ) -> Self {
        Self { state, outbound }
    }

    pub fn connectivity(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.connectivity() == ConnectivityState::Connected
    }

    /// Watch connectivity changes.
    pub fn watch(&self) -> watch::Receiver<ConnectivityState> {
        self.state.clone()
    }

    /// Fire-and-forget send. When not currently connected the frame is
    /// silently dropped, not queued.
    pub fn send(&self, frame: ClientFrame) {
        if !self.is_connected() {
            debug!(?frame, "push channel down, frame dropped");
            return;
        }
        let _ = self.outbound.send(frame);
    }
}

/// Owns the single push-channel connection and its retry loop.
pub struct ConnectionManager {
    url: String,
    state_tx: watch::Sender<ConnectivityState>,
    handle: ConnectionHandle,
    outbound_rx: mpsc::UnboundedReceiver<ClientFrame>,
    retries: u32,
}

impl ConnectionManager {
    pub fn new(url: impl Into<String>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectivityState::Disconnected);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            url: url.into(),
            handle: ConnectionHandle::new(state_rx, outbound_tx),
            state_tx,
            outbound_rx,
            retries: 0,
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Drive the connection until cancelled, forwarding inbound text frames
    /// to `inbound` in arrival order.
    pub fn spawn(self, inbound: mpsc::Sender<String>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(inbound, cancel))
    }

    async fn run(mut self, inbound: mpsc::Sender<String>, cancel: CancellationToken) {
        loop {
            self.set_state(ConnectivityState::Connecting);
            let dialed = tokio::select! {
                _ = cancel.cancelled() => return,
                dialed = connect_async(self.url.as_str()) => dialed,
            };

            match dialed {
                Ok((socket, _)) => {
                    info!(url = %self.url, "push channel connected");
                    self.retries = 0;
                    self.set_state(ConnectivityState::Connected);
                    self.serve(socket, &inbound, &cancel).await;
                    if cancel.is_cancelled() {
                        self.set_state(ConnectivityState::Disconnected);
                        return;
                    }
                    info!(url = %self.url, "push channel disconnected");
                }
                Err(err) => {
                    warn!(url = %self.url, error = %err, retries = self.retries, "push channel dial failed");
                }
            }

            self.set_state(ConnectivityState::Disconnected);
            self.retries += 1;
            telemetry::record_reconnect_attempt();

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
    }

    /// Pump one live socket until it drops or the monitor shuts down.
    async fn serve(
        &mut self,
        socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
        inbound: &mpsc::Sender<String>,
        cancel: &CancellationToken,
    ) {
        let (mut sink, mut stream) = socket.split();

        // The system-wide subscription is re-established on every connect.
        match (ClientFrame::SubscribeSystem {}).encode() {
            Ok(text) => {
                if sink.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
            Err(err) => warn!(error = %err, "subscribe frame encode failed"),
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.close().await;
                    return;
                }
                frame = self.outbound_rx.recv() => {
                    let Some(frame) = frame else { return };
                    let text = match frame.encode() {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(error = %err, "outbound frame encode failed");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        if inbound.send(text).await.is_err() {
                            return;
                        }
                    }
                    // Ping/pong are handled by the transport; binary frames
                    // are not part of this protocol.
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "push channel read failed");
                        return;
                    }
                },
            }
        }
    }

    fn set_state(&self, state: ConnectivityState) {
        let _ = self.state_tx.send(state);
    }
}
