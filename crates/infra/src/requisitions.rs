//! Creating and reading requisitions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use equiplend_auth::{Action, Principal, authorize};
use equiplend_core::{AggregateRoot, DomainError, ProductId, RequisitionId};
use equiplend_requisitions::{
    CreateRequisition, NewRequisitionItem, Requisition, RequisitionEvent, RequisitionStatus,
    validate_request,
};

use crate::error::ServiceResult;
use crate::publisher::EventPublisher;
use crate::store::{LendingStore, RequisitionFilter};

/// Input for a new requisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequisition {
    pub purpose: String,
    pub notes: Option<String>,
    pub items: Vec<NewRequisitionItem>,
}

/// Current stock next to what a line asks for. Display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemAvailability {
    pub line_no: u32,
    pub product_id: ProductId,
    pub product_name: Option<String>,
    pub requested: i64,
    pub available_stock: i64,
    pub sufficient: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequisitionView {
    #[serde(flatten)]
    pub requisition: Requisition,
    pub availability: Vec<ItemAvailability>,
}

#[derive(Clone)]
pub struct RequisitionService {
    store: Arc<dyn LendingStore>,
    publisher: EventPublisher,
}

impl RequisitionService {
    pub fn new(store: Arc<dyn LendingStore>, publisher: EventPublisher) -> Self {
        Self { store, publisher }
    }

    /// Submit a new PENDING requisition. Stock is not touched.
    pub async fn create(&self, principal: &Principal, input: NewRequisition) -> ServiceResult<Requisition> {
        authorize(principal, &Action::CreateRequisition)?;
        validate_request(&input.purpose, &input.items)?;

        let ids: Vec<ProductId> = input.items.iter().map(|i| i.product_id).collect();
        let products: HashMap<ProductId, _> = self
            .store
            .get_products(&ids)
            .await?
            .into_iter()
            .map(|p| (*p.id(), p))
            .collect();
        for id in &ids {
            match products.get(id) {
                None => return Err(DomainError::not_found(format!("product {id}")).into()),
                Some(p) if !p.is_active() => {
                    return Err(DomainError::validation(format!("product {id} is inactive")).into());
                }
                Some(_) => {}
            }
        }

        let now = Utc::now();
        let number = self.store.next_requisition_number(now.date_naive()).await?;
        let created = Requisition::create(&CreateRequisition {
            requisition_id: RequisitionId::new(),
            number,
            requester_id: principal.user_id,
            purpose: input.purpose,
            notes: input.notes,
            items: input.items,
            occurred_at: now,
        })?;
        let requisition = Requisition::from_created(&created);

        self.store.insert_requisition(&requisition).await?;
        self.publisher
            .requisition_events(&requisition, &[RequisitionEvent::Created(created)]);

        tracing::info!(
            requisition_id = %requisition.id,
            number = %requisition.number,
            requester_id = %requisition.requester_id,
            items = requisition.items.len(),
            "requisition created"
        );
        Ok(requisition)
    }

    /// One requisition with per-item availability. Non-admins only see their own.
    pub async fn get(&self, principal: &Principal, id: RequisitionId) -> ServiceResult<RequisitionView> {
        let requisition = load_visible(self.store.as_ref(), id).await?;
        authorize(
            principal,
            &Action::ReadRequisition {
                owner: requisition.requester_id,
            },
        )?;

        let ids: Vec<ProductId> = requisition.items.iter().map(|i| i.product_id).collect();
        let products: HashMap<ProductId, _> = self
            .store
            .get_products(&ids)
            .await?
            .into_iter()
            .map(|p| (*p.id(), p))
            .collect();

        let availability = requisition
            .items
            .iter()
            .map(|item| {
                let product = products.get(&item.product_id);
                let available_stock = product.map(|p| p.stock()).unwrap_or(0);
                ItemAvailability {
                    line_no: item.line_no,
                    product_id: item.product_id,
                    product_name: product.map(|p| p.name().to_string()),
                    requested: item.quantity,
                    available_stock,
                    sufficient: available_stock >= item.quantity,
                }
            })
            .collect();

        Ok(RequisitionView {
            requisition,
            availability,
        })
    }

    pub async fn list_mine(&self, principal: &Principal) -> ServiceResult<Vec<Requisition>> {
        authorize(principal, &Action::ListOwnRequisitions)?;
        Ok(self
            .store
            .list_requisitions(&RequisitionFilter::requester(principal.user_id))
            .await?)
    }

    pub async fn list_all(
        &self,
        principal: &Principal,
        status: Option<RequisitionStatus>,
    ) -> ServiceResult<Vec<Requisition>> {
        authorize(principal, &Action::ListAllRequisitions)?;
        Ok(self
            .store
            .list_requisitions(&RequisitionFilter::default().with_status(status))
            .await?)
    }
}

/// Fetch a requisition that has not been soft-deleted.
pub(crate) async fn load_visible(store: &dyn LendingStore, id: RequisitionId) -> ServiceResult<Requisition> {
    store
        .get_requisition(id)
        .await?
        .filter(|r| !r.is_deleted())
        .ok_or_else(|| DomainError::not_found(format!("requisition {id}")).into())
}
