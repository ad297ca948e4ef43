use std::sync::Arc;

use equiplend_events::InMemoryEventBus;
use equiplend_infra::{
    ApprovalStateMachine, EventPublisher, InMemoryLendingStore, InventoryService, LendingStore,
    LowStockMonitor, Persistence, PostgresLendingStore, RequisitionService, SharedBus, StoreError,
};

/// Services shared by every handler.
pub struct AppServices {
    pub inventory: InventoryService,
    pub requisitions: RequisitionService,
    pub approval: ApprovalStateMachine,
    pub monitor: LowStockMonitor,
}

impl AppServices {
    pub fn new(store: Arc<dyn LendingStore>) -> Self {
        let bus: SharedBus = Arc::new(InMemoryEventBus::new());
        let monitor = LowStockMonitor::spawn(&bus);
        let publisher = EventPublisher::new(bus);

        Self {
            inventory: InventoryService::new(store.clone(), publisher.clone()),
            requisitions: RequisitionService::new(store.clone(), publisher.clone()),
            approval: ApprovalStateMachine::new(store, publisher),
            monitor,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryLendingStore::new()))
    }
}

pub async fn build_services(persistence: &Persistence) -> Result<AppServices, StoreError> {
    match persistence {
        Persistence::InMemory => {
            tracing::info!("using in-memory stores");
            Ok(AppServices::in_memory())
        }
        Persistence::Postgres {
            database_url,
            max_connections,
        } => {
            let store = PostgresLendingStore::connect(database_url, *max_connections).await?;
            tracing::info!(max_connections, "connected to postgres; migrations applied");
            Ok(AppServices::new(Arc::new(store)))
        }
    }
}
