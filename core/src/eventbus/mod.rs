//! Event Bus (spec §4.7): typed in-memory pub/sub with bounded
//! per-subscriber queues. Producers never block - a full queue increments
//! a dropped-event counter instead, surfaced on the stream as a
//! `dropped=N` keepalive hint.

mod events;

pub use events::Event;

use std::sync::{
  Arc,
  atomic::{AtomicU64, Ordering},
};

use tokio::sync::{Mutex, mpsc};

const DEFAULT_QUEUE_CAPACITY: usize = 64;

struct Subscription {
  tx: mpsc::Sender<Event>,
  dropped: Arc<AtomicU64>,
}

pub struct Subscriber {
  rx: mpsc::Receiver<Event>,
  dropped: Arc<AtomicU64>,
}

impl Subscriber {
  pub async fn recv(&mut self) -> Option<Event> {
    self.rx.recv().await
  }

  /// Events dropped for this subscriber since it connected, because its
  /// queue was full when a producer tried to send.
  pub fn dropped_count(&self) -> u64 {
    self.dropped.load(Ordering::Relaxed)
  }
}

pub struct EventBus {
  capacity: usize,
  subscribers: Mutex<Vec<Subscription>>,
}

impl Default for EventBus {
  fn default() -> Self {
    EventBus::new(DEFAULT_QUEUE_CAPACITY)
  }
}

impl EventBus {
  pub fn new(capacity: usize) -> Self {
    EventBus {
      capacity: if capacity == 0 { DEFAULT_QUEUE_CAPACITY } else { capacity },
      subscribers: Mutex::new(Vec::new()),
    }
  }

  pub async fn subscribe(&self) -> Subscriber {
    let (tx, rx) = mpsc::channel(self.capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    self
      .subscribers
      .lock()
      .await
      .push(Subscription { tx, dropped: dropped.clone() });
    Subscriber { rx, dropped }
  }

  /// Fans `event` out to every live subscriber. Never blocks: a full
  /// queue increments that subscriber's drop counter. Closed (dropped)
  /// subscribers are pruned lazily here.
  pub async fn publish(&self, event: Event) {
    let mut subs = self.subscribers.lock().await;
    subs.retain(|sub| match sub.tx.try_send(event.clone()) {
      Ok(()) => true,
      Err(mpsc::error::TrySendError::Full(_)) => {
        sub.dropped.fetch_add(1, Ordering::Relaxed);
        true
      }
      Err(mpsc::error::TrySendError::Closed(_)) => false,
    });
  }

  pub async fn subscriber_count(&self) -> usize {
    self.subscribers.lock().await.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use events::Event;

  #[tokio::test]
  async fn delivers_to_all_subscribers_fifo() {
    let bus = EventBus::new(4);
    let mut a = bus.subscribe().await;
    let mut b = bus.subscribe().await;

    bus.publish(Event::keepalive(0)).await;
    bus.publish(Event::keepalive(0)).await;

    assert!(a.recv().await.is_some());
    assert!(a.recv().await.is_some());
    assert!(b.recv().await.is_some());
    assert!(b.recv().await.is_some());
  }

  #[tokio::test]
  async fn overflow_increments_dropped_without_blocking() {
    let bus = EventBus::new(1);
    let mut sub = bus.subscribe().await;

    bus.publish(Event::keepalive(0)).await;
    bus.publish(Event::keepalive(0)).await; // queue full, dropped
    bus.publish(Event::keepalive(0)).await; // dropped again

    assert_eq!(sub.dropped_count(), 2);
    assert!(sub.recv().await.is_some());
  }

  #[tokio::test]
  async fn disconnecting_subscriber_is_pruned() {
    let bus = EventBus::new(4);
    let sub = bus.subscribe().await;
    drop(sub);
    bus.publish(Event::keepalive(0)).await;
    assert_eq!(bus.subscriber_count().await, 0);
  }
}
