//! Product catalogue and stock administration.

use std::sync::Arc;

use chrono::Utc;

use equiplend_auth::{Action, Principal, authorize};
use equiplend_core::{Aggregate, AggregateRoot, DomainError, ProductId};
use equiplend_inventory::{Product, ProductCommand, RegisterProduct};

use crate::error::{ServiceError, ServiceResult};
use crate::publisher::EventPublisher;
use crate::store::{CommitReceipt, CommittedProductEvent, LendingStore, ProductChange, UnitOfWork};

#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn LendingStore>,
    publisher: EventPublisher,
}

impl InventoryService {
    pub fn new(store: Arc<dyn LendingStore>, publisher: EventPublisher) -> Self {
        Self { store, publisher }
    }

    pub async fn register(
        &self,
        principal: &Principal,
        name: &str,
        initial_stock: i64,
        min_stock: i64,
    ) -> ServiceResult<Product> {
        authorize(principal, &Action::ManageProducts)?;

        let product_id = ProductId::new();
        let mut product = Product::empty(product_id);
        let events = product.execute(&ProductCommand::RegisterProduct(RegisterProduct {
            product_id,
            name: name.to_string(),
            initial_stock,
            min_stock,
            occurred_at: Utc::now(),
        }))?;

        self.store.insert_product(&product).await?;

        let committed: Vec<_> = events
            .into_iter()
            .map(|event| CommittedProductEvent {
                version: product.version(),
                event,
            })
            .collect();
        self.publisher.product_events(&committed);

        tracing::info!(
            product_id = %product_id,
            name = %product.name(),
            stock = product.stock(),
            min_stock = product.min_stock(),
            "product registered"
        );
        Ok(product)
    }

    /// Externally reachable `Increment`.
    pub async fn restock(
        &self,
        principal: &Principal,
        product_id: ProductId,
        quantity: i64,
    ) -> ServiceResult<Product> {
        authorize(principal, &Action::ManageProducts)?;

        let product = self
            .apply_change(ProductChange::Increment { product_id, quantity })
            .await?;
        tracing::info!(product_id = %product_id, quantity, stock = product.stock(), "product restocked");
        Ok(product)
    }

    /// Withdraw a product from lending or return it.
    pub async fn set_active(
        &self,
        principal: &Principal,
        product_id: ProductId,
        active: bool,
    ) -> ServiceResult<Product> {
        authorize(principal, &Action::ManageProducts)?;

        let product = self
            .apply_change(ProductChange::SetActive { product_id, active })
            .await?;
        tracing::info!(product_id = %product_id, active, "product activation changed");
        Ok(product)
    }

    pub async fn get(&self, principal: &Principal, product_id: ProductId) -> ServiceResult<Product> {
        authorize(principal, &Action::ReadProducts)?;

        self.store
            .get_product(product_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("product {product_id}")).into())
    }

    pub async fn list(&self, principal: &Principal) -> ServiceResult<Vec<Product>> {
        authorize(principal, &Action::ReadProducts)?;
        Ok(self.store.list_products().await?)
    }

    /// Active products whose stock is at or below their threshold.
    pub async fn list_low_stock(&self, principal: &Principal) -> ServiceResult<Vec<Product>> {
        authorize(principal, &Action::ManageProducts)?;

        let mut products = self.store.list_products().await?;
        products.retain(|p| p.is_active() && p.is_low_stock());
        Ok(products)
    }

    /// `CheckAvailable`: true iff the product's current stock covers `quantity`.
    pub async fn check_available(&self, product_id: ProductId, quantity: i64) -> ServiceResult<bool> {
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("product {product_id}")))?;
        Ok(product.is_available(quantity))
    }

    async fn apply_change(&self, change: ProductChange) -> ServiceResult<Product> {
        let product_id = change.product_id();
        let unit = UnitOfWork::new(Utc::now()).change(change);
        let CommitReceipt {
            products,
            product_events,
        } = self.store.commit(unit).await?;

        self.publisher.product_events(&product_events);

        products
            .into_iter()
            .find(|p| *p.id() == product_id)
            .ok_or_else(|| ServiceError::Persistence(format!("product {product_id} missing from commit receipt")))
    }
}
