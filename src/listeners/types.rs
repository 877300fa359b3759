//! Listener traits and adapters.

use crate::candidate::Candidate;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Callback invoked after a store advance with the changed subtrees under
/// the registered path.
///
/// Called at most once per store advance; the batch holds one candidate per
/// disjoint changed subtree. Callbacks run after the store's version has
/// advanced, so a reader opened from inside a callback already sees the new
/// state.
pub trait TreeChangeListener: Send + Sync {
    fn on_tree_changed(&self, changes: &[Candidate]);
}

/// Listener that forwards change batches into a bounded channel.
///
/// A consumer that falls behind the buffer, or disconnects, permanently
/// stops the listener rather than blocking the notifier.
pub struct ChannelListener {
    sender: Sender<Vec<Candidate>>,
    dead: AtomicBool,
}

impl ChannelListener {
    /// Create the listener and the receiving end for its events.
    pub fn new(buffer_size: usize) -> (Arc<Self>, Receiver<Vec<Candidate>>) {
        let (sender, receiver) = bounded(buffer_size);
        (
            Arc::new(ChannelListener {
                sender,
                dead: AtomicBool::new(false),
            }),
            receiver,
        )
    }

    /// True once the consumer overflowed or disconnected.
    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }
}

impl TreeChangeListener for ChannelListener {
    fn on_tree_changed(&self, changes: &[Candidate]) {
        if self.is_dead() {
            return;
        }
        match self.sender.try_send(changes.to_vec()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dead.store(true, Ordering::Release);
            }
        }
    }
}
