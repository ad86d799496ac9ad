//! In-memory queue for tests and single-process hosts.
//!
//! Records every outbound event in an append-only log. Each handle created
//! with `new_subscriber()` reads the shared log from its own position.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use super::{Event, OutboundEvent, PublishError, Publisher};

/// In-memory outbound event log.
///
/// ## Example
///
/// ```
/// use offer_sync::bus::{InMemoryQueue, OutboundEvent, OutboundPublisher};
/// use offer_sync::surface::SurfaceKind;
///
/// let queue = InMemoryQueue::new();
/// queue.emit(&OutboundEvent::ChannelError {
///     surface: SurfaceKind::Map,
///     cause: "offline".into(),
/// }).unwrap();
///
/// let event = queue.poll(0).unwrap().unwrap();
/// assert_eq!(event.event_type, "ChannelError");
/// ```
#[derive(Clone)]
pub struct InMemoryQueue {
    log: Arc<RwLock<Vec<Event>>>,
    position: Arc<Mutex<usize>>,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self {
            log: Arc::new(RwLock::new(Vec::new())),
            position: Arc::new(Mutex::new(0)),
        }
    }

    /// Another reader over the same log, starting from the beginning.
    pub fn new_subscriber(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
            position: Arc::new(Mutex::new(0)),
        }
    }

    /// All events in publish order.
    pub fn events(&self) -> Vec<Event> {
        self.log.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// All event types in publish order.
    pub fn event_types(&self) -> Vec<String> {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    /// Decode every event of the given type, skipping undecodable payloads.
    pub fn decoded_by_type(&self, event_type: &str) -> Vec<OutboundEvent> {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.event_type == event_type)
            .filter_map(|e| e.decode().ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.log.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.log.write().unwrap_or_else(PoisonError::into_inner).clear();
        *self.position.lock().unwrap_or_else(PoisonError::into_inner) = 0;
    }

    /// Next unread event, waiting up to `timeout_ms`.
    pub fn poll(&self, timeout_ms: u64) -> Result<Option<Event>, PublishError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            {
                let log = self
                    .log
                    .read()
                    .map_err(|_| PublishError::Unavailable("log lock poisoned".into()))?;
                let mut pos = self
                    .position
                    .lock()
                    .map_err(|_| PublishError::Unavailable("position lock poisoned".into()))?;

                if *pos < log.len() {
                    let event = log[*pos].clone();
                    *pos += 1;
                    return Ok(Some(event));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Publisher for InMemoryQueue {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        self.log
            .write()
            .map_err(|_| PublishError::Unavailable("log lock poisoned".into()))?
            .push(event);
        Ok(())
    }

    fn publish_batch(&self, events: Vec<Event>) -> Result<(), PublishError> {
        self.log
            .write()
            .map_err(|_| PublishError::Unavailable("log lock poisoned".into()))?
            .extend(events);
        Ok(())
    }
}
