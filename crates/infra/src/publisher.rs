//! Post-commit publication of domain events.

use std::sync::Arc;

use equiplend_events::{EventBus, InMemoryEventBus, JsonEnvelope};
use equiplend_requisitions::{Requisition, RequisitionEvent};

use crate::store::CommittedProductEvent;

pub const PRODUCT_AGGREGATE: &str = "inventory.product";
pub const REQUISITION_AGGREGATE: &str = "requisition";

pub type SharedBus = Arc<InMemoryEventBus<JsonEnvelope>>;

/// Wraps committed events in envelopes and puts them on the bus.
///
/// Runs only after the store committed; a failure here is logged and never
/// surfaces to the caller.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    bus: SharedBus,
}

impl EventPublisher {
    pub fn new(bus: SharedBus) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &SharedBus {
        &self.bus
    }

    /// `events` were applied in order to reach `after`.
    pub fn requisition_events(&self, after: &Requisition, events: &[RequisitionEvent]) {
        let first_version = after.version + 1 - events.len() as u64;
        for (idx, event) in events.iter().enumerate() {
            let envelope = JsonEnvelope::from_typed(
                *after.id.as_uuid(),
                REQUISITION_AGGREGATE,
                first_version + idx as u64,
                event,
            );
            self.publish(envelope);
        }
    }

    pub fn product_events(&self, events: &[CommittedProductEvent]) {
        for committed in events {
            let envelope = JsonEnvelope::from_typed(
                *committed.event.product_id().as_uuid(),
                PRODUCT_AGGREGATE,
                committed.version,
                &committed.event,
            );
            self.publish(envelope);
        }
    }

    fn publish(&self, envelope: Result<JsonEnvelope, serde_json::Error>) {
        let envelope = match envelope {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode event envelope");
                return;
            }
        };
        let event_type = envelope.event_type().to_string();
        if let Err(e) = self.bus.publish(envelope) {
            tracing::error!(error = ?e, event_type = %event_type, "event publication failed");
        }
    }
}
