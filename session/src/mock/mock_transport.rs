use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{timeout, Duration};

use crate::error::{Error, Result};
use crate::{Channel, Transport};

/// MockTransport records every datagram handed to it.
pub struct MockTransport {
    sent_tx: mpsc::UnboundedSender<(Vec<u8>, Channel)>,
    sent_rx: Mutex<mpsc::UnboundedReceiver<(Vec<u8>, Channel)>>,
    failing: AtomicBool,
}

impl Default for MockTransport {
    fn default() -> Self {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        MockTransport {
            sent_tx,
            sent_rx: Mutex::new(sent_rx),
            failing: AtomicBool::new(false),
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport::default()
    }

    /// set_failing makes subsequent sends fail with `TransportFailure`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// written waits up to 100ms for the next datagram sent.
    pub async fn written(&self) -> Option<(Vec<u8>, Channel)> {
        let mut sent_rx = self.sent_rx.lock().await;
        timeout(Duration::from_millis(100), sent_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// try_written returns a datagram already sent, without waiting.
    pub async fn try_written(&self) -> Option<(Vec<u8>, Channel)> {
        let mut sent_rx = self.sent_rx.lock().await;
        sent_rx.try_recv().ok()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, buf: &[u8], channel: Channel) -> Result<usize> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::TransportFailure("mock transport failing".to_owned()));
        }
        self.sent_tx
            .send((buf.to_vec(), channel))
            .map_err(|err| Error::TransportFailure(err.to_string()))?;
        Ok(buf.len())
    }
}
