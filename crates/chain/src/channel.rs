use crate::metrics::ChannelMetrics;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendError, TryRecvError, TrySendError};

/// Bounded mpsc sender that keeps a shared depth counter for metrics.
pub struct TrackedSender<T> {
    sender: mpsc::Sender<T>,
    len: Arc<AtomicUsize>,
    metrics: Option<ChannelMetrics>,
}

pub struct TrackedReceiver<T> {
    receiver: mpsc::Receiver<T>,
    len: Arc<AtomicUsize>,
    metrics: Option<ChannelMetrics>,
}

pub fn tracked_channel<T>(
    capacity: usize,
    metrics: Option<ChannelMetrics>,
) -> (TrackedSender<T>, TrackedReceiver<T>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let len = Arc::new(AtomicUsize::new(0));
    let sender = TrackedSender {
        sender,
        len: len.clone(),
        metrics: metrics.clone(),
    };
    let receiver = TrackedReceiver {
        receiver,
        len,
        metrics,
    };
    (sender, receiver)
}

impl<T> Clone for TrackedSender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            len: self.len.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<T> TrackedSender<T> {
    /// Waits for capacity; errors only once the receiver is gone.
    pub async fn send(&self, value: T) -> Result<(), SendError<T>> {
        self.sender.send(value).await?;
        self.record_push();
        Ok(())
    }

    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        match self.sender.try_send(value) {
            Ok(()) => {
                self.record_push();
                Ok(())
            }
            Err(err) => {
                if matches!(err, TrySendError::Full(_)) {
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_dropped();
                    }
                }
                Err(err)
            }
        }
    }

    fn record_push(&self) {
        let len = self.len.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(metrics) = &self.metrics {
            metrics.set_queue_depth(len);
        }
    }
}

impl<T> TrackedReceiver<T> {
    pub async fn recv(&mut self) -> Option<T> {
        let item = self.receiver.recv().await;
        if item.is_some() {
            self.record_pop();
        }
        item
    }

    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        let item = self.receiver.try_recv()?;
        self.record_pop();
        Ok(item)
    }

    /// Takes everything queued right now without waiting.
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::new();
        while let Ok(item) = self.try_recv() {
            items.push(item);
        }
        items
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record_pop(&self) {
        let _ = self
            .len
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |value| value.checked_sub(1));
        if let Some(metrics) = &self.metrics {
            metrics.set_queue_depth(self.len.load(Ordering::SeqCst));
        }
    }
}
