//! ---
//! srr_section: "02-messaging-bus"
//! srr_subsection: "module"
//! srr_type: "source"
//! srr_scope: "code"
//! srr_description: "Message-bus envelope, transports, and request client."
//! srr_version: "v0.1.0"
//! srr_owner: "tbd"
//! ---
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::types::Message;
use crate::{BusError, Result};

/// Transport seam between the coordinator and whatever bus backs the fleet.
pub trait MessageBus: Send + Sync {
    /// Enqueue a message on the named queue.
    fn send(&self, queue: &str, message: Message) -> Result<()>;
    /// Block for the next message on the named queue, up to `timeout`.
    fn receive(&self, queue: &str, timeout: Duration) -> Result<Message>;
    /// Human-readable transport name for logging.
    fn name(&self) -> &'static str;
}

#[derive(Default)]
struct Queues {
    queues: Mutex<HashMap<String, VecDeque<Message>>>,
    available: Condvar,
}

/// In-memory bus backed by mutex-protected queues and a condvar, for tests
/// and single-process integration.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    inner: Arc<Queues>,
}

impl InMemoryBus {
    /// Create a fresh, empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently pending on `queue`.
    pub fn pending(&self, queue: &str) -> usize {
        let queues = self.inner.queues.lock().expect("bus queues poisoned");
        queues.get(queue).map(VecDeque::len).unwrap_or(0)
    }
}

impl MessageBus for InMemoryBus {
    fn send(&self, queue: &str, message: Message) -> Result<()> {
        let mut queues = self.inner.queues.lock().expect("bus queues poisoned");
        queues.entry(queue.to_owned()).or_default().push_back(message);
        self.inner.available.notify_all();
        Ok(())
    }

    fn receive(&self, queue: &str, timeout: Duration) -> Result<Message> {
        let deadline = Instant::now() + timeout;
        let mut queues = self.inner.queues.lock().expect("bus queues poisoned");
        loop {
            if let Some(message) = queues.get_mut(queue).and_then(VecDeque::pop_front) {
                return Ok(message);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BusError::Timeout {
                    queue: queue.to_owned(),
                });
            }
            let (guard, wait) = self
                .inner
                .available
                .wait_timeout(queues, remaining)
                .expect("bus queues poisoned");
            queues = guard;
            if wait.timed_out() {
                // one more pop attempt before reporting the timeout
                if let Some(message) = queues.get_mut(queue).and_then(VecDeque::pop_front) {
                    return Ok(message);
                }
                return Err(BusError::Timeout {
                    queue: queue.to_owned(),
                });
            }
        }
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

/// Placeholder MQTT transport; production deployments plug in here.
pub struct MqttBus;

impl MessageBus for MqttBus {
    fn send(&self, _queue: &str, _message: Message) -> Result<()> {
        Err(BusError::Unimplemented("mqtt transport"))
    }

    fn receive(&self, _queue: &str, _timeout: Duration) -> Result<Message> {
        Err(BusError::Unimplemented("mqtt transport"))
    }

    fn name(&self) -> &'static str {
        "mqtt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_then_receive_preserves_order() {
        let bus = InMemoryBus::new();
        for i in 0..3 {
            let mut message = Message::default();
            message.body = format!("{}", i);
            bus.send("q", message).unwrap();
        }
        assert_eq!(bus.pending("q"), 3);
        for i in 0..3 {
            let message = bus.receive("q", Duration::from_millis(10)).unwrap();
            assert_eq!(message.body, format!("{}", i));
        }
    }

    #[test]
    fn receive_times_out_on_empty_queue() {
        let bus = InMemoryBus::new();
        let err = bus.receive("empty", Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, BusError::Timeout { queue } if queue == "empty"));
    }

    #[test]
    fn receive_wakes_on_cross_thread_send() {
        let bus = InMemoryBus::new();
        let sender = bus.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let mut message = Message::default();
            message.body = "late".into();
            sender.send("q", message).unwrap();
        });
        let message = bus.receive("q", Duration::from_secs(2)).unwrap();
        assert_eq!(message.body, "late");
        handle.join().unwrap();
    }

    #[test]
    fn placeholder_transport_reports_unimplemented() {
        let bus = MqttBus;
        assert!(matches!(
            bus.send("q", Message::default()),
            Err(BusError::Unimplemented("mqtt transport"))
        ));
    }
}
