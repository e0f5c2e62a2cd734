// ============================================================================
// mediamend-core/src/events/bus.rs
// ============================================================================
//
// EVENT BUS: Bounded Multi-Producer, Single-Consumer Progress Queue
//
// Backpressure rule: when the queue is full an intermediate event makes room
// by evicting the oldest queued intermediate event, or is itself dropped if
// only terminal events are queued. Terminal events are always enqueued, even
// past capacity, so every item's final status reaches the consumer.

use super::ProgressEvent;

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

#[derive(Debug)]
struct BusState {
    queue: VecDeque<ProgressEvent>,
    publishers: usize,
    dropped: usize,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<BusState>,
    available: Condvar,
    capacity: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Creates a bus holding at most `capacity` intermediate events.
pub fn event_bus(capacity: usize) -> (EventPublisher, EventReceiver) {
    let shared = Arc::new(Shared {
        state: Mutex::new(BusState {
            queue: VecDeque::with_capacity(capacity.max(1)),
            publishers: 1,
            dropped: 0,
        }),
        available: Condvar::new(),
        capacity: capacity.max(1),
    });
    (
        EventPublisher {
            shared: Arc::clone(&shared),
        },
        EventReceiver { shared },
    )
}

/// Sending half. Cloning registers another producer.
#[derive(Debug)]
pub struct EventPublisher {
    shared: Arc<Shared>,
}

impl EventPublisher {
    /// Never blocks.
    pub fn publish(&self, event: ProgressEvent) {
        let mut state = self.shared.lock();
        if state.queue.len() >= self.shared.capacity && !event.is_terminal() {
            match state.queue.iter().position(|queued| !queued.is_terminal()) {
                Some(oldest) => {
                    state.queue.remove(oldest);
                    state.dropped += 1;
                }
                None => {
                    state.dropped += 1;
                    return;
                }
            }
        }
        state.queue.push_back(event);
        self.shared.available.notify_one();
    }
}

impl Clone for EventPublisher {
    fn clone(&self) -> Self {
        self.shared.lock().publishers += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for EventPublisher {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.publishers -= 1;
        if state.publishers == 0 {
            self.shared.available.notify_all();
        }
    }
}

/// Receiving half.
#[derive(Debug)]
pub struct EventReceiver {
    shared: Arc<Shared>,
}

impl EventReceiver {
    /// Blocks for the next event. `None` once every publisher is gone and the
    /// queue is drained.
    pub fn recv(&self) -> Option<ProgressEvent> {
        let mut state = self.shared.lock();
        loop {
            if let Some(event) = state.queue.pop_front() {
                return Some(event);
            }
            if state.publishers == 0 {
                return None;
            }
            state = self
                .shared
                .available
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Blocking iterator over the remaining events.
    pub fn iter(&self) -> impl Iterator<Item = ProgressEvent> + '_ {
        std::iter::from_fn(move || self.recv())
    }

    /// Intermediate events shed because the consumer fell behind.
    pub fn dropped_count(&self) -> usize {
        self.shared.lock().dropped
    }
}
