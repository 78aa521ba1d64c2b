//! Bounded in-process transport.
//!
//! One global FIFO feeds the router. Producers follow a three-step
//! discipline: drain their own overflow into the global queue while it has
//! room (preserving per-sender order), then publish directly, then buffer in
//! the overflow, and only when both queues are full refuse the frame. The
//! refusal is explicit: the sender gets a wire warning, unlike the silent
//! per-recipient drop on the outbound side.

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Mutex;

use crate::client::OverflowQueue;
use crate::transport::{Transport, TransportError};

pub struct InProcTransport {
    /// Producer side. `None` after shutdown; dropping the last sender lets
    /// the receiver drain to completion.
    tx: StdMutex<Option<mpsc::Sender<Vec<u8>>>>,
    rx: Mutex<mpsc::Receiver<Vec<u8>>>,
}

impl InProcTransport {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx: StdMutex::new(Some(tx)),
            rx: Mutex::new(rx),
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<Vec<u8>>> {
        self.tx.lock().expect("sender mutex poisoned").clone()
    }
}

#[async_trait]
impl Transport for InProcTransport {
    async fn publish(&self, overflow: &OverflowQueue, frame: Vec<u8>) -> Result<(), TransportError> {
        let Some(tx) = self.sender() else {
            return Err(TransportError::Closed);
        };

        // Buffered frames go first so per-sender order is preserved.
        while let Some(buffered) = overflow.pop() {
            match tx.try_send(buffered) {
                Ok(()) => {}
                Err(TrySendError::Full(returned)) => {
                    overflow.requeue_front(returned);
                    return if overflow.push(frame) {
                        Ok(())
                    } else {
                        Err(TransportError::Overloaded)
                    };
                }
                Err(TrySendError::Closed(_)) => return Err(TransportError::Closed),
            }
        }

        match tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(returned)) => {
                if overflow.push(returned) {
                    Ok(())
                } else {
                    Err(TransportError::Overloaded)
                }
            }
            Err(TrySendError::Closed(_)) => Err(TransportError::Closed),
        }
    }

    async fn recv(&self) -> Option<Vec<u8>> {
        self.rx.lock().await.recv().await
    }

    async fn shutdown(&self) {
        self.tx.lock().expect("sender mutex poisoned").take();
    }
}
