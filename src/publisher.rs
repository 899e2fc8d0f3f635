//! Fan-out of committed domain events to NATS.

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventPublisher { nats: Option<async_nats::Client> }

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    /// Events are best-effort: a failed publish is logged, never surfaced to
    /// the caller whose change has already been committed.
    pub async fn publish(&self, events: Vec<DomainEvent>) {
        for event in events {
            let subject = event.subject();
            let Some(client) = &self.nats else {
                tracing::debug!(%subject, ?event, "domain event");
                continue;
            };
            match serde_json::to_vec(&event) {
                Ok(payload) => {
                    if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                        tracing::warn!(%subject, error = %e, "failed to publish domain event");
                    }
                }
                Err(e) => tracing::warn!(%subject, error = %e, "failed to encode domain event"),
            }
        }
    }
}
