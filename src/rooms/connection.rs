use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::sync::{Notify, mpsc, mpsc::error::TrySendError};
use tracing::{debug, warn};

use super::SignalError;

/// Messages a connection may have queued before new ones are dropped.
pub const OUTBOX_CAPACITY: usize = 256;

/// Lifetime drops after which a peer counts as gone.
pub const MAX_TOTAL_DROPS: u64 = 100;

#[derive(Debug, Default)]
struct Backpressure {
    drops: AtomicU64,
    stalled: AtomicBool,
    notify: Notify,
}

/// Sending half of a connection.
///
/// Sends are queued for the connection's writer task and never wait on the
/// network, so they may happen while the room registry is locked. A peer
/// that lets its queue overflow [`MAX_TOTAL_DROPS`] times is marked stalled
/// and every later send fails as if the connection were closed.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<String>,
    backpressure: Arc<Backpressure>,
}

impl Outbox {
    pub fn channel() -> (Outbox, mpsc::Receiver<String>) {
        Outbox::with_capacity(OUTBOX_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Outbox, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        let outbox = Outbox {
            tx,
            backpressure: Arc::default(),
        };
        (outbox, rx)
    }

    pub fn send(&self, text: impl Into<String>) -> Result<(), SignalError> {
        if self.is_stalled() {
            return Err(SignalError::ConnectionClosed);
        }

        match self.tx.try_send(text.into()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(SignalError::ConnectionClosed),
            Err(TrySendError::Full(_)) => {
                let drops = self.backpressure.drops.fetch_add(1, Ordering::Relaxed) + 1;
                if drops >= MAX_TOTAL_DROPS {
                    warn!(drops, "peer stopped reading, disconnecting");
                    self.backpressure.stalled.store(true, Ordering::Release);
                    self.backpressure.notify.notify_waiters();
                    return Err(SignalError::ConnectionClosed);
                }
                Err(SignalError::Lagging { drops })
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed() || self.is_stalled()
    }

    pub fn is_stalled(&self) -> bool {
        self.backpressure.stalled.load(Ordering::Acquire)
    }

    /// Resolves once this peer has been marked stalled.
    pub async fn stalled(&self) {
        loop {
            let notified = self.backpressure.notify.notified();
            if self.is_stalled() {
                return;
            }
            notified.await;
        }
    }
}

/// Receiving half of a connection.
pub trait Inbox: Send {
    /// Waits for the next complete text message. Fails with
    /// [`SignalError::ConnectionClosed`] once the peer is gone.
    fn receive(&mut self) -> impl Future<Output = Result<String, SignalError>> + Send;
}

pub struct WsInbox(pub SplitStream<WebSocket>);

impl Inbox for WsInbox {
    async fn receive(&mut self) -> Result<String, SignalError> {
        loop {
            let Some(msg) = self.0.next().await else {
                return Err(SignalError::ConnectionClosed);
            };

            match msg.map_err(|_| SignalError::ConnectionClosed)? {
                Message::Text(text) => return Ok(text.as_str().to_owned()),
                Message::Binary(data) => return Ok(String::from_utf8(data.to_vec())?),
                Message::Close(_) => return Err(SignalError::ConnectionClosed),
                Message::Ping(_) | Message::Pong(_) => continue,
            }
        }
    }
}

impl Inbox for mpsc::UnboundedReceiver<String> {
    async fn receive(&mut self) -> Result<String, SignalError> {
        self.recv().await.ok_or(SignalError::ConnectionClosed)
    }
}

/// Writes queued messages to the socket until every [`Outbox`] is dropped or
/// the socket fails.
pub async fn pump(mut rx: mpsc::Receiver<String>, mut sink: SplitSink<WebSocket, Message>) {
    while let Some(text) = rx.recv().await {
        if let Err(e) = sink.send(Message::Text(text.into())).await {
            debug!(error = %e, "socket write failed");
            break;
        }
    }
    rx.close();
    let _ = sink.close().await;
}
