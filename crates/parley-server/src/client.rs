//! Per-connection state and tasks.
//!
//! Each registered connection owns two cooperative tasks: a reader that
//! publishes inbound frames to the transport and a writer that drains the
//! bounded outbound queue onto the socket, confirming durable delivery via
//! [`MessageStore::mark_sent`]. The hub writes control frames (welcome,
//! goodbye) directly through the shared [`FrameSink`], bypassing the queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use parley_shared::constants::OVERLOAD_TEXT;
use parley_store::MessageStore;

use crate::api::AppState;
use crate::transport::{Transport, TransportError};

/// A serialized response bound for one connection, paired with the message
/// uuid so the writer can confirm Sent status after the wire write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutFrame {
    pub payload: Vec<u8>,
    pub uuid: String,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("socket send failed: {0}")]
    Socket(String),

    #[error("sink closed")]
    Closed,
}

/// Write half of a connection. The hub, the writer task and the reader's
/// overload warning all go through this one surface.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Write one UTF-8 payload as a single text frame.
    async fn send(&self, payload: &[u8]) -> Result<(), SinkError>;

    /// Close the underlying socket.
    async fn close(&self);
}

/// [`FrameSink`] over an axum WebSocket write half.
pub struct WsSink {
    inner: tokio::sync::Mutex<SplitSink<WebSocket, Message>>,
}

impl WsSink {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            inner: tokio::sync::Mutex::new(sink),
        }
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&self, payload: &[u8]) -> Result<(), SinkError> {
        let text = String::from_utf8_lossy(payload).into_owned();
        self.inner
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| SinkError::Socket(e.to_string()))
    }

    async fn close(&self) {
        let _ = self.inner.lock().await.close().await;
    }
}

/// Bounded buffer of raw inbound frames, used by the in-process transport
/// when the global queue is full.
pub struct OverflowQueue {
    frames: Mutex<VecDeque<Vec<u8>>>,
    capacity: usize,
}

impl OverflowQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Buffer a frame. Returns false when the queue is at capacity.
    pub fn push(&self, frame: Vec<u8>) -> bool {
        let mut frames = self.frames.lock().expect("overflow mutex poisoned");
        if frames.len() >= self.capacity {
            return false;
        }
        frames.push_back(frame);
        true
    }

    pub fn pop(&self) -> Option<Vec<u8>> {
        self.frames.lock().expect("overflow mutex poisoned").pop_front()
    }

    /// Return a frame taken with [`pop`](Self::pop) to the head of the
    /// queue. Bypasses the capacity check: the frame was already buffered.
    pub fn requeue_front(&self, frame: Vec<u8>) {
        self.frames
            .lock()
            .expect("overflow mutex poisoned")
            .push_front(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.lock().expect("overflow mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A registered connection.
///
/// Owned by the hub's registry while registered; the reader and writer tasks
/// hold their own `Arc`s. Dropping the outbound sender ends the writer.
pub struct Client {
    pub uuid: String,
    sink: Arc<dyn FrameSink>,
    outbound: Mutex<Option<mpsc::Sender<OutFrame>>>,
    overflow: OverflowQueue,
}

impl Client {
    /// Build a client with fresh bounded queues. The returned receiver is
    /// handed to [`spawn_writer`].
    pub fn new(
        uuid: impl Into<String>,
        sink: Arc<dyn FrameSink>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<OutFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        let client = Arc::new(Self {
            uuid: uuid.into(),
            sink,
            outbound: Mutex::new(Some(tx)),
            overflow: OverflowQueue::new(capacity),
        });
        (client, rx)
    }

    pub fn overflow(&self) -> &OverflowQueue {
        &self.overflow
    }

    /// Enqueue an outbound frame without blocking. Returns false when the
    /// queue is full or already closed; the caller drops that delivery.
    pub fn enqueue(&self, frame: OutFrame) -> bool {
        let outbound = self.outbound.lock().expect("outbound mutex poisoned");
        match outbound.as_ref() {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        }
    }

    /// Close the outbound queue, which terminates the writer task once it
    /// drains. Idempotent.
    pub fn close_outbound(&self) {
        self.outbound
            .lock()
            .expect("outbound mutex poisoned")
            .take();
    }

    /// Write a control frame directly to the socket, bypassing the queue.
    pub async fn send_control(&self, text: &str) {
        if let Err(e) = self.sink.send(text.as_bytes()).await {
            warn!(client = %self.uuid, error = %e, "control frame write failed");
        }
    }

    pub async fn close_socket(&self) {
        self.sink.close().await;
    }
}

/// Read loop: socket → transport. Exits on read error or close; the hub
/// learns of the absence on the next Leave or replacing Join.
pub fn spawn_reader(
    client: Arc<Client>,
    mut stream: SplitStream<WebSocket>,
    transport: Arc<dyn Transport>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(client = %client.uuid, "reader task started");
        while let Some(next) = stream.next().await {
            let frame = match next {
                Ok(Message::Text(text)) => text.as_bytes().to_vec(),
                Ok(Message::Binary(data)) => data.to_vec(),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!(client = %client.uuid, error = %e, "socket read failed");
                    break;
                }
            };

            match transport.publish(client.overflow(), frame).await {
                Ok(()) => {}
                Err(TransportError::Overloaded) => {
                    warn!(client = %client.uuid, "transport overloaded, refusing frame");
                    client.send_control(OVERLOAD_TEXT).await;
                }
                Err(e) => {
                    warn!(client = %client.uuid, error = %e, "publish failed, dropping frame");
                }
            }
        }
        debug!(client = %client.uuid, "reader task finished");
    })
}

/// Write loop: outbound queue → socket, then durable Sent confirmation.
/// A socket write error closes the connection, which also ends the reader.
pub fn spawn_writer(
    client: Arc<Client>,
    mut outbound: mpsc::Receiver<OutFrame>,
    store: Arc<dyn MessageStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(client = %client.uuid, "writer task started");
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = client.sink.send(&frame.payload).await {
                warn!(client = %client.uuid, error = %e, "socket write failed, closing connection");
                client.close_socket().await;
                break;
            }
            if let Err(e) = store.mark_sent(&frame.uuid) {
                warn!(uuid = %frame.uuid, error = %e, "failed to mark message sent");
            }
        }
        debug!(client = %client.uuid, "writer task finished");
    })
}

/// Turn an upgraded socket into a registered client: build the queues,
/// signal Join to the hub, start the reader and writer tasks.
pub async fn admission(socket: WebSocket, client_id: String, state: AppState) {
    let (sink, stream) = socket.split();
    let sink: Arc<dyn FrameSink> = Arc::new(WsSink::new(sink));

    let (client, outbound_rx) = Client::new(client_id, sink, state.config.channel_size);
    state.hub.register(client.clone()).await;

    spawn_reader(client.clone(), stream, state.transport.clone());
    spawn_writer(client.clone(), outbound_rx, state.store.clone());

    info!(client = %client.uuid, "websocket connection established");
}
