use futures_util::{SinkExt, StreamExt};
use std::pin::pin;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};
use url::Url;

use super::{ReconnectPolicy, TransportError, TransportEvent};
use crate::protocol::Frame;

pub mod config;
use config::WebSocketConfig;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A supervised websocket that reconnects on its own.
///
/// Outbound frames go through [`WebSocketTransport::send`]; lifecycle changes
/// and inbound frames arrive through [`WebSocketTransport::recv`]. Frames
/// queued while no connection is up are discarded before the next connection
/// is reported open.
pub struct WebSocketTransport {
    outbound: Option<mpsc::UnboundedSender<Frame>>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    task: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    pub fn spawn(config: WebSocketConfig, policy: ReconnectPolicy) -> Result<Self, TransportError> {
        let url = config.build_url()?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(supervise(url, policy, outbound_rx, events_tx));
        Ok(Self {
            outbound: Some(outbound_tx),
            events: events_rx,
            task: Some(task),
        })
    }

    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let sender = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        sender.send(frame).map_err(|_| TransportError::Closed)
    }

    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Closes the current connection and stops reconnecting.
    pub async fn close(&mut self) {
        self.outbound.take();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum PumpExit {
    Closed(Option<String>),
    Shutdown,
}

async fn supervise(
    url: Url,
    policy: ReconnectPolicy,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut attempt = 0u32;
    loop {
        if events.send(TransportEvent::Connecting { attempt }).is_err() {
            return;
        }
        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                let stale = discard_pending(&mut outbound);
                if stale > 0 {
                    debug!(
                        target: "transport::websocket",
                        frames = stale,
                        "discarded frames queued while disconnected"
                    );
                }
                info!(target: "transport::websocket", %url, attempt, "connected");
                attempt = 0;
                if events.send(TransportEvent::Opened).is_err() {
                    return;
                }
                match pump(socket, &mut outbound, &events).await {
                    PumpExit::Shutdown => {
                        debug!(target: "transport::websocket", "transport shut down");
                        return;
                    }
                    PumpExit::Closed(reason) => {
                        info!(target: "transport::websocket", reason = ?reason, "connection closed");
                        if events.send(TransportEvent::Closed { reason }).is_err() {
                            return;
                        }
                    }
                }
            }
            Err(err) => {
                warn!(
                    target: "transport::supervisor",
                    %url,
                    attempt,
                    error = %err,
                    "connect attempt failed"
                );
            }
        }

        attempt += 1;
        if !policy.allows(attempt) {
            warn!(
                target: "transport::supervisor",
                attempts = attempt - 1,
                "giving up on reconnecting"
            );
            let _ = events.send(TransportEvent::GaveUp);
            return;
        }
        let delay = policy.delay_for(attempt);
        if events
            .send(TransportEvent::Reconnecting { attempt, delay })
            .is_err()
        {
            return;
        }
        if !backoff(delay, &mut outbound).await {
            return;
        }
    }
}

/// Waits out the reconnect delay. Returns `false` when the owner went away.
async fn backoff(delay: std::time::Duration, outbound: &mut mpsc::UnboundedReceiver<Frame>) -> bool {
    let mut timer = pin!(sleep(delay));
    loop {
        tokio::select! {
            _ = &mut timer => return true,
            frame = outbound.recv() => match frame {
                Some(frame) => trace!(
                    target: "transport::supervisor",
                    bytes = frame.len(),
                    "dropping frame while disconnected"
                ),
                None => return false,
            },
        }
    }
}

fn discard_pending(outbound: &mut mpsc::UnboundedReceiver<Frame>) -> usize {
    let mut discarded = 0;
    while outbound.try_recv().is_ok() {
        discarded += 1;
    }
    discarded
}

async fn pump(
    socket: Socket,
    outbound: &mut mpsc::UnboundedReceiver<Frame>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> PumpExit {
    let (mut sink, mut source) = socket.split();
    loop {
        tokio::select! {
            incoming = source.next() => {
                let frame = match incoming {
                    Some(Ok(Message::Text(text))) => Frame::Text(text),
                    Some(Ok(Message::Binary(bytes))) => Frame::Binary(bytes),
                    Some(Ok(Message::Close(close))) => {
                        return PumpExit::Closed(close.map(|frame| frame.reason.into_owned()));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => return PumpExit::Closed(Some(err.to_string())),
                    None => return PumpExit::Closed(None),
                };
                trace!(target: "transport::websocket", bytes = frame.len(), "frame received");
                if events.send(TransportEvent::Frame(frame)).is_err() {
                    return PumpExit::Shutdown;
                }
            }
            outgoing = outbound.recv() => {
                let Some(frame) = outgoing else {
                    let _ = sink.send(Message::Close(None)).await;
                    return PumpExit::Shutdown;
                };
                let message = match frame {
                    Frame::Text(text) => Message::Text(text),
                    Frame::Binary(bytes) => Message::Binary(bytes),
                };
                if let Err(err) = sink.send(message).await {
                    return PumpExit::Closed(Some(err.to_string()));
                }
            }
        }
    }
}
