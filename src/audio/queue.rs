//! Bounded, lossy delivery queue between the audio thread and the
//! notification bridge.
//!
//! Both ends are non-blocking. On full the newest frame is dropped; on empty
//! the consumer gets `None`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};

use super::frame::Frame;

pub fn delivery_queue(capacity: usize) -> (DeliverySender, DeliveryReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        DeliverySender {
            tx,
            dropped: dropped.clone(),
        },
        DeliveryReceiver { rx, dropped },
    )
}

#[derive(Clone)]
pub struct DeliverySender {
    tx: Sender<Frame>,
    dropped: Arc<AtomicU64>,
}

impl DeliverySender {
    /// Returns `false` when the frame was dropped.
    pub fn offer(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

#[derive(Clone)]
pub struct DeliveryReceiver {
    rx: Receiver<Frame>,
    dropped: Arc<AtomicU64>,
}

impl DeliveryReceiver {
    pub fn poll(&self) -> Option<Frame> {
        match self.rx.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Discard everything currently queued. Returns how many frames went.
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(0)
    }

    /// Frames dropped on the producer side since startup.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
