//! ---
//! srr_section: "02-messaging-bus"
//! srr_subsection: "module"
//! srr_type: "source"
//! srr_scope: "code"
//! srr_description: "Message-bus envelope, transports, and request client."
//! srr_version: "v0.1.0"
//! srr_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::metrics::RequestMetrics;
use crate::types::Message;
use crate::{BusError, MessageBus, Result};

/// Typed request/reply client addressing remote agents by `(queue, agent)`.
///
/// Every request carries the envelope fields the fleet contract requires:
/// subject, from, to, reply-to, and a fresh correlation id. Replies are
/// matched by correlation id; stale replies on the shared reply queue are
/// dropped with a warning.
#[derive(Clone)]
pub struct RequestClient {
    bus: Arc<dyn MessageBus>,
    agent_name: String,
    reply_queue: String,
    timeout: Duration,
    metrics: Option<Arc<RequestMetrics>>,
}

impl RequestClient {
    /// Construct a client. `timeout` is expressed in milliseconds at the
    /// configuration boundary and truncated to whole seconds here, with a
    /// one second floor.
    pub fn new(
        bus: Arc<dyn MessageBus>,
        agent_name: impl Into<String>,
        reply_queue: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            bus,
            agent_name: agent_name.into(),
            reply_queue: reply_queue.into(),
            timeout: whole_seconds(timeout),
            metrics: None,
        }
    }

    /// Attach a metrics exporter fed on every request.
    pub fn with_metrics(mut self, metrics: Arc<RequestMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Name this client stamps into the `from` envelope field.
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Underlying bus handle.
    pub fn bus(&self) -> Arc<dyn MessageBus> {
        self.bus.clone()
    }

    /// Send `body` to `agent` on `queue` as `action` and await the matching
    /// typed reply.
    pub fn request<Q, R>(&self, queue: &str, agent: &str, action: &str, body: &Q) -> Result<R>
    where
        Q: Serialize,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_string(body)?;
        let message = Message::request(action, &self.agent_name, agent, &self.reply_queue, payload);
        let correlation = message.correlation_id().to_owned();

        debug!(queue, agent, action, correlation = %correlation, "sending agent request");
        let started = Instant::now();
        if let Err(err) = self.bus.send(queue, message) {
            self.observe_error();
            return Err(err);
        }
        self.observe_sent();

        let deadline = started + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.observe_error();
                return Err(BusError::Timeout {
                    queue: self.reply_queue.clone(),
                });
            }
            let reply = match self.bus.receive(&self.reply_queue, remaining) {
                Ok(reply) => reply,
                Err(err) => {
                    self.observe_error();
                    return Err(err);
                }
            };
            if reply.correlation_id() != correlation {
                warn!(
                    expected = %correlation,
                    received = %reply.correlation_id(),
                    "dropping stale reply"
                );
                continue;
            }
            self.observe_reply(started.elapsed());
            debug!(queue, agent, action, "agent replied");
            return Ok(serde_json::from_str(&reply.body)?);
        }
    }

    fn observe_sent(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.observe_sent();
        }
    }

    fn observe_reply(&self, latency: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.observe_reply(latency);
        }
    }

    fn observe_error(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.observe_error();
        }
    }
}

fn whole_seconds(timeout: Duration) -> Duration {
    Duration::from_secs((timeout.as_millis() as u64 / 1000).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryBus;
    use serde::Deserialize;

    #[derive(Serialize)]
    struct Ping {
        value: u32,
    }

    #[derive(Deserialize, Debug, PartialEq)]
    struct Pong {
        value: u32,
    }

    fn spawn_responder(bus: InMemoryBus, queue: &'static str) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            let request = bus.receive(queue, Duration::from_secs(5)).expect("request");
            let ping: serde_json::Value = serde_json::from_str(&request.body).unwrap();
            let reply_queue = request.reply_to().unwrap().to_owned();
            let pong = format!(r#"{{"value":{}}}"#, ping["value"]);
            bus.send(&reply_queue, Message::reply(&request, pong)).unwrap();
        })
    }

    #[test]
    fn request_round_trips_through_responder() {
        let bus = InMemoryBus::new();
        let responder = spawn_responder(bus.clone(), "agent.q");
        let client = RequestClient::new(
            Arc::new(bus),
            "etn-srr",
            "srr.reply",
            Duration::from_millis(5_000),
        );
        let pong: Pong = client
            .request("agent.q", "etn-asset", "save", &Ping { value: 7 })
            .unwrap();
        assert_eq!(pong, Pong { value: 7 });
        responder.join().unwrap();
    }

    #[test]
    fn stale_replies_are_skipped() {
        let bus = InMemoryBus::new();
        // Pre-seed a reply that belongs to nobody.
        let mut stale = Message::default();
        stale.set_meta(crate::types::meta::CORRELATION_ID, "stale-id");
        stale.body = r#"{"value":0}"#.into();
        bus.send("srr.reply", stale).unwrap();

        let responder = spawn_responder(bus.clone(), "agent.q");
        let client = RequestClient::new(
            Arc::new(bus),
            "etn-srr",
            "srr.reply",
            Duration::from_millis(5_000),
        );
        let pong: Pong = client
            .request("agent.q", "etn-asset", "save", &Ping { value: 3 })
            .unwrap();
        assert_eq!(pong.value, 3);
        responder.join().unwrap();
    }

    #[test]
    fn missing_responder_times_out() {
        let bus = InMemoryBus::new();
        let client = RequestClient::new(
            Arc::new(bus),
            "etn-srr",
            "srr.reply",
            Duration::from_millis(800), // floors to one second
        );
        let err = client
            .request::<_, Pong>("agent.q", "etn-asset", "save", &Ping { value: 1 })
            .unwrap_err();
        assert!(matches!(err, BusError::Timeout { .. }));
    }

    #[test]
    fn timeout_truncates_to_whole_seconds() {
        assert_eq!(whole_seconds(Duration::from_millis(2_900)), Duration::from_secs(2));
        assert_eq!(whole_seconds(Duration::from_millis(10)), Duration::from_secs(1));
    }
}
