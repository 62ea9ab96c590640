//! "Data changed" notifications.
//!
//! The core publishes an event after every successful local save or
//! merge-persist. Subscribers (a push stream, a log, a UI refresh) are not
//! known to the core; they just hold a receiver.

use tokio::sync::broadcast;

use crate::models::Collection;

/// What changed in the local dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataChanged {
    /// A local write to one collection (including deletions).
    Records(Collection),
    /// A local write to the settings document.
    Settings,
    /// A sync cycle persisted a merged snapshot.
    SyncMerged,
    /// A peer pushed a snapshot that was merged and persisted.
    PeerPushed,
}

/// Fan-out of [`DataChanged`] events.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<DataChanged>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DataChanged> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: DataChanged) {
        tracing::trace!(?event, "Publishing change");
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let notifier = ChangeNotifier::new();
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();

        notifier.publish(DataChanged::Records(Collection::Tasks));
        notifier.publish(DataChanged::SyncMerged);

        assert_eq!(
            first.recv().await.unwrap(),
            DataChanged::Records(Collection::Tasks)
        );
        assert_eq!(first.recv().await.unwrap(), DataChanged::SyncMerged);
        assert_eq!(
            second.recv().await.unwrap(),
            DataChanged::Records(Collection::Tasks)
        );
    }

    #[test]
    fn test_publish_without_subscribers() {
        let notifier = ChangeNotifier::new();
        notifier.publish(DataChanged::Settings);
    }
}
