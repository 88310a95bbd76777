//! Event dispatch: a bounded queue of `(event, subscription)` pairs
//! drained by a worker thread into a delivery service,
//! with bounded retry and age-based eviction.

use crate::events::UpsEvent;
use crate::subscription::Subscription;
use chrono::Utc;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// The error a delivery service reports for one failed delivery.
#[derive(Debug)]
pub struct DeliveryError {
    /// A description of the failure.
    pub message: String,
}

/// The service which carries events to their subscribers.
///
/// Implementations wrap whatever channel reaches the subscriber:
/// an N-EVENT-REPORT sender, a WebSocket session, a test probe.
pub trait DeliveryService: Send + Sync {
    /// Deliver one event to one subscriber.
    fn deliver(&self, event: &UpsEvent, subscription: &Subscription) -> Result<(), DeliveryError>;
}

/// Configuration of the event dispatcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchConfig {
    /// The queue capacity; the oldest item is dropped on overflow.
    pub max_queue_size: usize,
    /// How many delivery attempts an item gets before it is dropped.
    pub max_delivery_attempts: u32,
    /// Items older than this are evicted without delivery.
    pub event_retention: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            max_queue_size: 1024,
            max_delivery_attempts: 3,
            event_retention: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone)]
struct QueuedDelivery {
    event: UpsEvent,
    subscription: Subscription,
    attempts: u32,
}

#[derive(Default)]
struct Queue {
    items: VecDeque<QueuedDelivery>,
    stopped: bool,
}

/// The event dispatcher.
///
/// Events are fanned out to the interested subscriptions by the
/// engine; each pair is queued here and delivered asynchronously
/// by the worker thread.
pub struct EventDispatcher {
    config: DispatchConfig,
    queue: Arc<(Mutex<Queue>, Condvar)>,
    worker: Option<thread::JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    delivered: Arc<AtomicU64>,
}

impl EventDispatcher {
    /// Start a dispatcher draining into the given delivery service.
    pub fn start(config: DispatchConfig, delivery: Arc<dyn DeliveryService>) -> Self {
        let queue: Arc<(Mutex<Queue>, Condvar)> = Arc::default();
        let stop = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicU64::new(0));
        let delivered = Arc::new(AtomicU64::new(0));

        let worker_queue = queue.clone();
        let worker_stop = stop.clone();
        let worker_dropped = dropped.clone();
        let worker_delivered = delivered.clone();
        let worker = thread::spawn(move || {
            worker_loop(
                config,
                worker_queue,
                delivery,
                worker_stop,
                worker_dropped,
                worker_delivered,
            )
        });

        EventDispatcher {
            config,
            queue,
            worker: Some(worker),
            stop,
            dropped,
            delivered,
        }
    }

    /// Enqueue one event for each of the given subscriptions.
    pub fn enqueue(&self, event: &UpsEvent, subscriptions: Vec<Subscription>) {
        if subscriptions.is_empty() {
            return;
        }
        let (lock, condvar) = &*self.queue;
        let mut queue = lock.lock();
        for subscription in subscriptions {
            if queue.items.len() >= self.config.max_queue_size {
                // FIFO drop on overflow
                queue.items.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("event queue full, dropping the oldest item");
            }
            queue.items.push_back(QueuedDelivery {
                event: event.clone(),
                subscription,
                attempts: 0,
            });
        }
        condvar.notify_one();
    }

    /// Drop all queued deliveries addressed to the given AE title,
    /// as after an unsubscribe.
    pub fn purge_subscriber(&self, ae_title: &str) {
        let (lock, _) = &*self.queue;
        let mut queue = lock.lock();
        queue.items.retain(|item| item.subscription.ae_title != ae_title);
    }

    /// The number of deliveries dropped so far
    /// (queue overflow, retention eviction or attempts exhausted).
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// The number of successful deliveries so far.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Wait until the queue is empty (used by tests).
    pub fn drain(&self) {
        loop {
            {
                let (lock, _) = &*self.queue;
                if lock.lock().items.is_empty() {
                    return;
                }
            }
            thread::sleep(Duration::from_millis(2));
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        let (lock, condvar) = &*self.queue;
        {
            let mut queue = lock.lock();
            queue.stopped = true;
        }
        condvar.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    config: DispatchConfig,
    queue: Arc<(Mutex<Queue>, Condvar)>,
    delivery: Arc<dyn DeliveryService>,
    stop: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    delivered: Arc<AtomicU64>,
) {
    let (lock, condvar) = &*queue;
    loop {
        let item = {
            let mut queue = lock.lock();
            loop {
                if stop.load(Ordering::SeqCst) || queue.stopped {
                    return;
                }
                match queue.items.pop_front() {
                    Some(item) => break item,
                    None => condvar.wait(&mut queue),
                }
            }
        };

        // retention eviction happens at dequeue time
        let age = Utc::now().signed_duration_since(item.event.timestamp);
        if age.to_std().map(|a| a > config.event_retention).unwrap_or(false) {
            debug!(
                "evicting event for {} older than the retention window",
                item.subscription.ae_title
            );
            dropped.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        match delivery.deliver(&item.event, &item.subscription) {
            Ok(()) => {
                delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                let attempts = item.attempts + 1;
                if attempts >= config.max_delivery_attempts {
                    warn!(
                        "dropping event for {} after {} delivery attempts: {}",
                        item.subscription.ae_title, attempts, e.message
                    );
                    dropped.fetch_add(1, Ordering::Relaxed);
                } else {
                    let mut queue = lock.lock();
                    queue.items.push_back(QueuedDelivery { attempts, ..item });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProcedureStepState;
    use parking_lot::Mutex as PlMutex;

    #[derive(Default)]
    struct Probe {
        delivered: PlMutex<Vec<(String, String)>>,
        fail_first: PlMutex<u32>,
        delay: Option<Duration>,
    }

    impl DeliveryService for Probe {
        fn deliver(
            &self,
            event: &UpsEvent,
            subscription: &Subscription,
        ) -> Result<(), DeliveryError> {
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            let mut failures = self.fail_first.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(DeliveryError {
                    message: "injected failure".to_string(),
                });
            }
            self.delivered
                .lock()
                .push((subscription.ae_title.clone(), event.workitem_uid.clone()));
            Ok(())
        }
    }

    fn subscription(ae_title: &str) -> Subscription {
        Subscription {
            subscriber_id: uuid::Uuid::new_v4(),
            ae_title: ae_title.to_string(),
            workitem_uid: None,
            deletion_lock: false,
            suspended: false,
            event_filter: None,
        }
    }

    fn event() -> UpsEvent {
        UpsEvent::state_report("1.2.3", ProcedureStepState::Completed, None)
    }

    #[test]
    fn delivers_to_every_subscription() {
        let probe = Arc::new(Probe::default());
        let dispatcher = EventDispatcher::start(DispatchConfig::default(), probe.clone());
        dispatcher.enqueue(&event(), vec![subscription("A"), subscription("B")]);
        dispatcher.drain();
        drop(dispatcher);
        let delivered = probe.delivered.lock();
        assert_eq!(delivered.len(), 2);
    }

    #[test]
    fn failed_deliveries_are_retried_up_to_the_limit() {
        let probe = Arc::new(Probe::default());
        *probe.fail_first.lock() = 2;
        let config = DispatchConfig {
            max_delivery_attempts: 3,
            ..Default::default()
        };
        let dispatcher = EventDispatcher::start(config, probe.clone());
        dispatcher.enqueue(&event(), vec![subscription("A")]);
        dispatcher.drain();
        drop(dispatcher);
        assert_eq!(probe.delivered.lock().len(), 1);
    }

    #[test]
    fn attempts_exhausted_drops_and_counts() {
        let probe = Arc::new(Probe::default());
        *probe.fail_first.lock() = 10;
        let config = DispatchConfig {
            max_delivery_attempts: 3,
            ..Default::default()
        };
        let dispatcher = EventDispatcher::start(config, probe.clone());
        dispatcher.enqueue(&event(), vec![subscription("A")]);
        dispatcher.drain();
        // allow the worker to resolve the last attempt
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(dispatcher.dropped_count(), 1);
        assert_eq!(dispatcher.delivered_count(), 0);
        drop(dispatcher);
    }

    #[test]
    fn queue_overflow_drops_the_oldest() {
        let mut probe = Probe::default();
        // keep the worker busy so that the queue backs up
        probe.delay = Some(Duration::from_millis(50));
        let probe = Arc::new(probe);
        *probe.fail_first.lock() = 1000;
        let config = DispatchConfig {
            max_queue_size: 2,
            max_delivery_attempts: 1000,
            ..Default::default()
        };
        let dispatcher = EventDispatcher::start(config, probe.clone());
        for _ in 0..5 {
            dispatcher.enqueue(&event(), vec![subscription("A")]);
        }
        assert!(dispatcher.dropped_count() >= 1);
        drop(dispatcher);
    }
}
