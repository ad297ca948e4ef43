//! Persistence boundary for products and requisitions.
//!
//! Everything that must change together goes through [`LendingStore::commit`]
//! as one [`UnitOfWork`]: the store loads the affected products inside its
//! atomic scope, runs the product aggregate's decisions against that locked
//! state, checks the requisition's expected version, and only then writes.
//! If any step fails, nothing is written.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use equiplend_core::{Aggregate, AggregateRoot, DomainError, ExpectedVersion, ProductId, RequisitionId, UserId};
use equiplend_inventory::{
    DecrementStock, IncrementStock, Product, ProductCommand, ProductEvent, SetProductActive,
};
use equiplend_requisitions::{Requisition, RequisitionNumber, RequisitionStatus};

mod in_memory;
mod postgres;

pub use in_memory::InMemoryLendingStore;
pub use postgres::PostgresLendingStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A business rule rejected the unit (nothing was written).
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// One product mutation inside a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductChange {
    Decrement { product_id: ProductId, quantity: i64 },
    Increment { product_id: ProductId, quantity: i64 },
    SetActive { product_id: ProductId, active: bool },
}

impl ProductChange {
    pub fn product_id(&self) -> ProductId {
        match self {
            ProductChange::Decrement { product_id, .. }
            | ProductChange::Increment { product_id, .. }
            | ProductChange::SetActive { product_id, .. } => *product_id,
        }
    }

    fn to_command(self, occurred_at: DateTime<Utc>) -> ProductCommand {
        match self {
            ProductChange::Decrement { product_id, quantity } => {
                ProductCommand::DecrementStock(DecrementStock {
                    product_id,
                    quantity,
                    occurred_at,
                })
            }
            ProductChange::Increment { product_id, quantity } => {
                ProductCommand::IncrementStock(IncrementStock {
                    product_id,
                    quantity,
                    occurred_at,
                })
            }
            ProductChange::SetActive { product_id, active } => {
                ProductCommand::SetActive(SetProductActive {
                    product_id,
                    active,
                    occurred_at,
                })
            }
        }
    }
}

/// New requisition state plus the version it must replace.
#[derive(Debug, Clone)]
pub struct RequisitionWrite {
    pub state: Requisition,
    pub expected_version: ExpectedVersion,
}

/// A set of writes that commit together or not at all.
#[derive(Debug, Clone)]
pub struct UnitOfWork {
    pub occurred_at: DateTime<Utc>,
    pub product_changes: Vec<ProductChange>,
    pub requisition: Option<RequisitionWrite>,
}

impl UnitOfWork {
    pub fn new(occurred_at: DateTime<Utc>) -> Self {
        Self {
            occurred_at,
            product_changes: Vec::new(),
            requisition: None,
        }
    }

    pub fn change(mut self, change: ProductChange) -> Self {
        self.product_changes.push(change);
        self
    }

    pub fn with_requisition(mut self, state: Requisition, expected_version: ExpectedVersion) -> Self {
        self.requisition = Some(RequisitionWrite {
            state,
            expected_version,
        });
        self
    }

    /// Distinct product ids touched, in ascending order (the lock order).
    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<_> = self.product_changes.iter().map(|c| c.product_id()).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// A product event together with the product version it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedProductEvent {
    pub version: u64,
    pub event: ProductEvent,
}

#[derive(Debug, Clone, Default)]
pub struct CommitReceipt {
    /// Post-commit state of every product the unit touched.
    pub products: Vec<Product>,
    pub product_events: Vec<CommittedProductEvent>,
}

/// Query over stored requisitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequisitionFilter {
    pub requester_id: Option<UserId>,
    pub status: Option<RequisitionStatus>,
    pub include_deleted: bool,
}

impl RequisitionFilter {
    pub fn requester(requester_id: UserId) -> Self {
        Self {
            requester_id: Some(requester_id),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: Option<RequisitionStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn matches(&self, r: &Requisition) -> bool {
        (self.include_deleted || !r.is_deleted())
            && self.requester_id.is_none_or(|id| r.requester_id == id)
            && self.status.is_none_or(|s| r.status == s)
    }
}

/// Storage for products and requisitions.
///
/// Listing order is newest first (`requested_at` descending).
#[async_trait]
pub trait LendingStore: Send + Sync {
    /// Insert a newly registered product. `Conflict` if the id exists.
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Fetch several products; missing ids are simply absent from the result.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError>;

    /// All products ordered by name.
    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    /// Allocate the next requisition number for `day`.
    async fn next_requisition_number(&self, day: NaiveDate) -> Result<RequisitionNumber, StoreError>;

    /// Persist a new requisition header and its items together.
    async fn insert_requisition(&self, requisition: &Requisition) -> Result<(), StoreError>;

    /// Fetch a requisition, soft-deleted ones included.
    async fn get_requisition(&self, id: RequisitionId) -> Result<Option<Requisition>, StoreError>;

    async fn list_requisitions(&self, filter: &RequisitionFilter) -> Result<Vec<Requisition>, StoreError>;

    /// Apply a unit of work atomically.
    async fn commit(&self, unit: UnitOfWork) -> Result<CommitReceipt, StoreError>;
}

/// Run the unit's product changes against locked product state.
///
/// Changes are applied in the order given, so the first failing change is the
/// one reported. Works on the map passed in; callers discard it on error.
pub(crate) fn stage_product_changes(
    products: &mut HashMap<ProductId, Product>,
    unit: &UnitOfWork,
) -> Result<CommitReceipt, DomainError> {
    let mut receipt = CommitReceipt::default();
    let mut touched: Vec<ProductId> = Vec::new();

    for change in &unit.product_changes {
        let product_id = change.product_id();
        let product = products
            .get_mut(&product_id)
            .ok_or_else(|| DomainError::not_found(format!("product {product_id}")))?;

        let events = product.handle(&change.to_command(unit.occurred_at))?;
        for event in events {
            product.apply(&event);
            receipt.product_events.push(CommittedProductEvent {
                version: product.version(),
                event,
            });
        }
        if !touched.contains(&product_id) {
            touched.push(product_id);
        }
    }

    receipt.products = touched
        .iter()
        .filter_map(|id| products.get(id).cloned())
        .collect();
    Ok(receipt)
}

/// Newest first; ties broken by id (time-ordered) so the order is total.
pub(crate) fn sort_newest_first(requisitions: &mut [Requisition]) {
    requisitions.sort_by(|a, b| {
        b.requested_at
            .cmp(&a.requested_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
