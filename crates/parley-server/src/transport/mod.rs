//! The decoupling layer between connection readers and the hub router.
//!
//! Both implementations present the same semantics downstream: a stream of
//! opaque inbound frames consumed by the single router loop. They differ in
//! how producers are absorbed: the in-process queue pushes back explicitly,
//! the log absorbs bursts by appending durably.

pub mod inproc;
pub mod log;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::client::OverflowQueue;
use crate::config::{ServerConfig, TransportMode};

#[derive(Debug, Error)]
pub enum TransportError {
    /// Both the global queue and the caller's overflow queue are full.
    /// The caller sends an explicit wire warning to the offending sender.
    #[error("transport overloaded")]
    Overloaded,

    #[error("transport closed")]
    Closed,

    #[error("publish timed out")]
    Timeout,

    #[error("log IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("offset encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish one raw inbound frame, using the caller's overflow queue for
    /// backpressure where the implementation needs it.
    async fn publish(&self, overflow: &OverflowQueue, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Next frame for the router. Returns `None` once the transport has
    /// been shut down and the remaining frames are drained.
    async fn recv(&self) -> Option<Vec<u8>>;

    /// Stop accepting publishes; `recv` drains and then ends.
    async fn shutdown(&self);
}

/// Construct the transport selected by the configuration.
pub async fn build(config: &ServerConfig) -> Result<Arc<dyn Transport>, TransportError> {
    match config.message_mode {
        TransportMode::InProc => Ok(Arc::new(inproc::InProcTransport::new(config.channel_size))),
        TransportMode::Log => Ok(Arc::new(log::LogTransport::open(config.log.clone()).await?)),
    }
}
