//! Low-stock monitoring: a bus subscriber that turns `LowStockReached`
//! events into warnings and keeps the recent ones for inspection.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use serde::Serialize;

use equiplend_core::ProductId;
use equiplend_events::{EventBus, JsonEnvelope};
use equiplend_inventory::ProductEvent;

use crate::publisher::SharedBus;

const LOW_STOCK_EVENT: &str = "inventory.product.low_stock";
const MAX_ALERTS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowStockAlert {
    pub product_id: ProductId,
    pub stock: i64,
    pub min_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Background thread fed by the event bus.
///
/// Stops on its own once every handle to the bus has been dropped.
pub struct LowStockMonitor {
    alerts: Arc<Mutex<VecDeque<LowStockAlert>>>,
    handle: JoinHandle<()>,
}

impl LowStockMonitor {
    pub fn spawn(bus: &SharedBus) -> Self {
        let subscription = bus.subscribe();
        let alerts: Arc<Mutex<VecDeque<LowStockAlert>>> = Arc::default();

        let sink = alerts.clone();
        let handle = std::thread::spawn(move || {
            while let Ok(envelope) = subscription.recv() {
                if let Some(alert) = low_stock_alert(&envelope) {
                    tracing::warn!(
                        product_id = %alert.product_id,
                        stock = alert.stock,
                        min_stock = alert.min_stock,
                        "product stock at or below minimum"
                    );
                    if let Ok(mut alerts) = sink.lock() {
                        if alerts.len() == MAX_ALERTS {
                            alerts.pop_front();
                        }
                        alerts.push_back(alert);
                    }
                }
            }
            tracing::debug!("low-stock monitor stopped");
        });

        Self { alerts, handle }
    }

    /// Recent alerts, oldest first.
    pub fn alerts(&self) -> Vec<LowStockAlert> {
        self.alerts
            .lock()
            .map(|alerts| alerts.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

fn low_stock_alert(envelope: &JsonEnvelope) -> Option<LowStockAlert> {
    if envelope.event_type() != LOW_STOCK_EVENT {
        return None;
    }
    match envelope.decode::<ProductEvent>() {
        Ok(ProductEvent::LowStockReached(e)) => Some(LowStockAlert {
            product_id: e.product_id,
            stock: e.stock,
            min_stock: e.min_stock,
            occurred_at: e.occurred_at,
        }),
        Ok(_) => None,
        Err(e) => {
            tracing::error!(error = %e, "undecodable low-stock event");
            None
        }
    }
}
