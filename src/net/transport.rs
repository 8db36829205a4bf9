//! WebSocket transport
//!
//! A [`Connector`] opens one socket per call and hands back a
//! [`TransportHandle`]: an outbound frame sender plus a stream of
//! [`TransportEvent`]s. The socket itself lives in its own task and goes away
//! when the handle is dropped. The session task never sees the raw socket.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;

use crate::game::constants::net::{CLOSE_NORMAL, CLOSE_REASON_CLIENT};
use crate::net::framing::{self, FramingError, InboundFrame};

/// Close code used when the socket died without a close handshake
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Progress of one socket
#[derive(Debug)]
pub enum TransportEvent {
    /// Handshake complete
    Opened,
    /// Inbound text frame
    Text(String),
    /// Inbound frame rejected by framing
    Rejected(FramingError),
    /// Transport-level failure; a `Closed` always follows
    Error(String),
    /// Socket is gone (or never opened)
    Closed { code: u16, reason: String },
}

/// Frame queued for the socket task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport task has exited")]
    Closed,
}

/// Owner side of one socket
#[derive(Debug)]
pub struct TransportHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportHandle {
    pub fn new(
        outbound: mpsc::UnboundedSender<Outbound>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { outbound, events }
    }

    pub fn send(&self, frame: Outbound) -> Result<(), TransportError> {
        self.outbound.send(frame).map_err(|_| TransportError::Closed)
    }

    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

/// Opens sockets
pub trait Connector: Send + Sync + 'static {
    /// Start opening a socket to `url`. Returns immediately; the outcome
    /// arrives as [`TransportEvent::Opened`] or an error followed by
    /// [`TransportEvent::Closed`].
    fn open(&self, url: &str) -> TransportHandle;
}

/// tokio-tungstenite connector
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, url: &str) -> TransportHandle {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(url.to_string(), outbound_rx, events_tx));
        TransportHandle::new(outbound_tx, events_rx)
    }
}

fn closed(events: &mpsc::UnboundedSender<TransportEvent>, code: u16, reason: &str) {
    let _ = events.send(TransportEvent::Closed {
        code,
        reason: reason.to_string(),
    });
}

async fn run_socket(
    url: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::warn!("WebSocket connect failed: {}", e);
            let _ = events.send(TransportEvent::Error(e.to_string()));
            closed(&events, CLOSE_ABNORMAL, "connect failed");
            return;
        }
    };

    if events.send(TransportEvent::Opened).is_err() {
        // Owner went away during the handshake
        return;
    }

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                match frame {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = write.send(framing::text_frame(text)).await {
                            tracing::warn!("WebSocket send failed: {}", e);
                            let _ = events.send(TransportEvent::Error(e.to_string()));
                            closed(&events, CLOSE_ABNORMAL, "send failed");
                            return;
                        }
                    }
                    Some(Outbound::Close { code, reason }) => {
                        let _ = write.send(framing::close_frame(code, &reason)).await;
                        return;
                    }
                    None => {
                        let _ = write.send(framing::close_frame(CLOSE_NORMAL, CLOSE_REASON_CLIENT)).await;
                        return;
                    }
                }
            }
            message = read.next() => {
                match message {
                    Some(Ok(message)) => match framing::read_frame(message) {
                        Ok(InboundFrame::Text(text)) => {
                            if events.send(TransportEvent::Text(text)).is_err() {
                                return;
                            }
                        }
                        Ok(InboundFrame::Close { code, reason }) => {
                            closed(&events, code, &reason);
                            return;
                        }
                        Ok(InboundFrame::Control) => {}
                        Err(e) => {
                            let _ = events.send(TransportEvent::Rejected(e));
                        }
                    },
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error: {}", e);
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        closed(&events, CLOSE_ABNORMAL, "stream error");
                        return;
                    }
                    None => {
                        closed(&events, CLOSE_ABNORMAL, "stream ended");
                        return;
                    }
                }
            }
        }
    }
}
