use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::domain::PollId;
use crate::registry::SocietyId;

/// Table a change notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Polls,
    PollOptions,
    SurveyQuestions,
    PollResponses,
    SurveyResponses,
    Participants,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollChange {
    pub society_id: SocietyId,
    pub poll_id: PollId,
    pub table: ChangeTable,
    pub kind: ChangeKind,
}

/// In-process change channel for the poll tables.
///
/// Ordering across tables is not guaranteed to consumers and callbacks may see
/// a change more than once, so they must be idempotent.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<PollChange>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, change: PollChange) {
        // No receivers is not an error.
        let _ = self.sender.send(change);
    }

    pub fn receiver(&self) -> broadcast::Receiver<PollChange> {
        self.sender.subscribe()
    }

    /// Deliver changes for one society to `callback` on a spawned task.
    pub fn subscribe<F, Fut>(&self, society_id: SocietyId, mut callback: F) -> SubscriptionHandle
    where
        F: FnMut(PollChange) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut receiver = self.sender.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(change) if change.society_id == society_id => callback(change).await,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(society = %society_id.0, skipped, "poll change subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(society = %society_id.0, "poll change feed closed");
                        break;
                    }
                }
            }
        });
        SubscriptionHandle { task }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Keeps a subscription alive; dropping it or calling `unsubscribe` stops delivery.
pub struct SubscriptionHandle {
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn unsubscribe(self) {
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn change(society: &str, table: ChangeTable) -> PollChange {
        PollChange {
            society_id: SocietyId(society.to_string()),
            poll_id: PollId("poll-1".to_string()),
            table,
            kind: ChangeKind::Insert,
        }
    }

    #[tokio::test]
    async fn subscriber_only_sees_its_society() {
        let feed = ChangeFeed::new(16);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = feed.subscribe(SocietyId("soc-a".to_string()), move |change| {
            let sink = sink.clone();
            async move {
                sink.lock().expect("sink").push(change);
            }
        });

        feed.publish(change("soc-b", ChangeTable::Polls));
        feed.publish(change("soc-a", ChangeTable::PollResponses));

        for _ in 0..50 {
            if !seen.lock().expect("sink").is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let seen = seen.lock().expect("sink").clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].table, ChangeTable::PollResponses);
        assert!(handle.is_active());
        handle.unsubscribe();
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let feed = ChangeFeed::default();
        feed.publish(change("soc-a", ChangeTable::Polls));
        let mut receiver = feed.receiver();
        feed.publish(change("soc-a", ChangeTable::Participants));
        assert_eq!(
            receiver.try_recv().expect("buffered").table,
            ChangeTable::Participants
        );
    }
}
