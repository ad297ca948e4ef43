//! Infrastructure layer: storage, configuration, and the services that
//! orchestrate domain aggregates against them.

pub mod approval;
pub mod config;
pub mod error;
pub mod inventory;
pub mod monitor;
pub mod publisher;
pub mod requisitions;
pub mod store;


pub use approval::ApprovalStateMachine;
pub use config::{AppConfig, ConfigError, Persistence};
pub use error::{ServiceError, ServiceResult};
pub use inventory::InventoryService;
pub use monitor::{LowStockAlert, LowStockMonitor};
pub use publisher::{EventPublisher, SharedBus};
pub use requisitions::{ItemAvailability, NewRequisition, RequisitionService, RequisitionView};
pub use store::{InMemoryLendingStore, LendingStore, PostgresLendingStore, StoreError};
