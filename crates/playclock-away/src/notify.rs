//! Fan-out of away/active notifications.

use std::sync::{Mutex, MutexGuard, PoisonError};

use playclock_model::AwayStatusChanged;
use tokio::sync::mpsc;

/// Channel sender for one notification subscriber.
pub type AwaySender = mpsc::UnboundedSender<AwayStatusChanged>;

/// Delivers [`AwayStatusChanged`] events to every subscriber.
///
/// Sends never block: each subscriber has an unbounded channel. A
/// subscriber that dropped its receiver is removed on the next publish.
#[derive(Debug, Default)]
pub struct AwayNotifier {
    subscribers: Mutex<Vec<AwaySender>>,
}

impl AwayNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber. It receives every event published after
    /// this call.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<AwayStatusChanged> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers().push(tx);
        rx
    }

    /// Sends `event` to every live subscriber. Returns how many got it.
    pub fn publish(&self, event: AwayStatusChanged) -> usize {
        let mut subscribers = self.subscribers();
        subscribers.retain(|tx| tx.send(event).is_ok());
        subscribers.len()
    }

    /// Number of subscribers still registered. Dropped ones are only
    /// pruned by [`publish`](Self::publish).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<AwaySender>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
