//! Bounded, drop-on-full queues between the three execution contexts.
//!
//! Both queues are `tokio::sync::mpsc` channels:
//!
//! * `try_send` never blocks and is safe from the cpal driver thread, which
//!   is not part of the tokio runtime.
//! * `recv().await` is the pipeline's only suspension point.
//! * `try_recv` lets the egui thread poll without a runtime.
//!
//! A full queue is not an error.  [`try_publish`] reports
//! [`SendOutcome::DroppedFull`] and the caller bumps the matching counter.

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

/// What happened to an item offered to a bounded queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// Queue at capacity; the offered item was discarded.
    DroppedFull,
    /// Receiver gone; the offered item was discarded.
    Closed,
}

impl SendOutcome {
    pub fn is_dropped(self) -> bool {
        self != SendOutcome::Queued
    }
}

/// Create a bounded queue.  A capacity of zero is raised to one.
pub fn bounded<T>(capacity: usize) -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
    mpsc::channel(capacity.max(1))
}

/// Offer `item` without blocking; the newest item is the one dropped when the
/// queue is full.
pub fn try_publish<T>(tx: &mpsc::Sender<T>, item: T) -> SendOutcome {
    match tx.try_send(item) {
        Ok(()) => SendOutcome::Queued,
        Err(TrySendError::Full(_)) => SendOutcome::DroppedFull,
        Err(TrySendError::Closed(_)) => SendOutcome::Closed,
    }
}

/// Drain everything currently queued and keep only the newest item.
///
/// Consumers that render "the latest state" call this once per refresh so a
/// slow UI never works through a backlog.
pub fn drain_latest<T>(rx: &mut mpsc::Receiver<T>) -> Option<T> {
    let mut latest = None;
    loop {
        match rx.try_recv() {
            Ok(item) => latest = Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
    latest
}
