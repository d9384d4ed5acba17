//! Live subscriber endpoints.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::frame::EventFrame;
use crate::error::SinkError;

/// A connected subscriber the hub writes frames to
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, frame: &EventFrame) -> Result<(), SinkError>;
}

/// Subscriber backed by a bounded channel; the receiving half feeds an HTTP response
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<String>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<String>) -> Self {
        Self { sender }
    }

    /// Sink plus the receiver that yields encoded frames
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&self, frame: &EventFrame) -> Result<(), SinkError> {
        // never wait on a slow reader
        self.sender
            .try_send(frame.encode())
            .map_err(|error| match error {
                mpsc::error::TrySendError::Full(_) => SinkError::Full,
                mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
            })
    }
}
