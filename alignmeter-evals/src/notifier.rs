// Copyright 2025 Alignmeter (https://github.com/alignmeter)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Alignment change notifications.
//!
//! Publishing is fire-and-forget: a consumer that is not listening must never
//! fail a recalculation flow.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use alignmeter_core::AlignmentEvent;

/// Publisher for alignment metadata updates.
#[async_trait]
pub trait AlignmentNotifier: Send + Sync {
    async fn publish(&self, event: AlignmentEvent);
}

/// Broadcast-channel notifier for in-process consumers.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<AlignmentEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlignmentEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl AlignmentNotifier for BroadcastNotifier {
    async fn publish(&self, event: AlignmentEvent) {
        // A send error only means there are no subscribers right now.
        if self.tx.send(event).is_err() {
            debug!("alignment event dropped: no subscribers");
        }
    }
}

/// Notifier that records every event; used by the test suites to assert on
/// the set/cleared lifecycle of `recalculating_at`.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<AlignmentEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AlignmentEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl AlignmentNotifier for RecordingNotifier {
    async fn publish(&self, event: AlignmentEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alignmeter_core::AlignmentMetricMetadata;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscriber() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();

        let event = AlignmentEvent::updated(1, Uuid::nil(), AlignmentMetricMetadata::default());
        notifier.publish(event.clone()).await;

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let notifier = BroadcastNotifier::new(8);
        // Must not panic or error.
        notifier
            .publish(AlignmentEvent::updated(
                1,
                Uuid::nil(),
                AlignmentMetricMetadata::default(),
            ))
            .await;
    }
}
