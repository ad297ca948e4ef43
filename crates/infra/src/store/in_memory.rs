use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::NaiveDate;

use equiplend_core::{AggregateRoot, DomainError, ProductId, RequisitionId};
use equiplend_inventory::Product;
use equiplend_requisitions::{Requisition, RequisitionNumber};

use super::{
    CommitReceipt, LendingStore, RequisitionFilter, StoreError, UnitOfWork, sort_newest_first,
    stage_product_changes,
};

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    requisitions: HashMap<RequisitionId, Requisition>,
    sequences: HashMap<NaiveDate, u32>,
}

/// In-memory store.
///
/// Intended for tests/dev. One lock guards every table; a unit of work holds
/// the write lock from the first product read to the last write.
#[derive(Debug, Default)]
pub struct InMemoryLendingStore {
    tables: RwLock<Tables>,
}

impl InMemoryLendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl LendingStore for InMemoryLendingStore {
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let id = *product.id();
        if tables.products.contains_key(&id) {
            return Err(DomainError::conflict(format!("product {id} already exists")).into());
        }
        tables.products.insert(id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        let tables = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.products.get(id).cloned())
            .collect())
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let mut products: Vec<_> = self.read()?.products.values().cloned().collect();
        products.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));
        Ok(products)
    }

    async fn next_requisition_number(&self, day: NaiveDate) -> Result<RequisitionNumber, StoreError> {
        let mut tables = self.write()?;
        let seq = tables.sequences.entry(day).or_insert(0);
        *seq += 1;
        Ok(RequisitionNumber::new(day, *seq))
    }

    async fn insert_requisition(&self, requisition: &Requisition) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables.requisitions.contains_key(&requisition.id) {
            return Err(DomainError::conflict(format!(
                "requisition {} already exists",
                requisition.id
            ))
            .into());
        }
        if tables
            .requisitions
            .values()
            .any(|r| r.number == requisition.number)
        {
            return Err(DomainError::conflict(format!(
                "requisition number {} already in use",
                requisition.number
            ))
            .into());
        }
        tables.requisitions.insert(requisition.id, requisition.clone());
        Ok(())
    }

    async fn get_requisition(&self, id: RequisitionId) -> Result<Option<Requisition>, StoreError> {
        Ok(self.read()?.requisitions.get(&id).cloned())
    }

    async fn list_requisitions(&self, filter: &RequisitionFilter) -> Result<Vec<Requisition>, StoreError> {
        let mut out: Vec<_> = self
            .read()?
            .requisitions
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        sort_newest_first(&mut out);
        Ok(out)
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<CommitReceipt, StoreError> {
        let mut tables = self.write()?;

        if let Some(write) = &unit.requisition {
            let id = write.state.id;
            let current = tables
                .requisitions
                .get(&id)
                .ok_or_else(|| DomainError::not_found(format!("requisition {id}")))?;
            write.expected_version.check(current.version)?;
        }

        // Stage on copies so a failure part-way leaves the tables untouched.
        let mut staged: HashMap<ProductId, Product> = unit
            .product_ids()
            .into_iter()
            .filter_map(|id| tables.products.get(&id).map(|p| (id, p.clone())))
            .collect();
        let receipt = stage_product_changes(&mut staged, &unit)?;

        for product in &receipt.products {
            tables.products.insert(*product.id(), product.clone());
        }
        if let Some(write) = unit.requisition {
            tables.requisitions.insert(write.state.id, write.state);
        }

        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use equiplend_core::{ExpectedVersion, UserId};
    use equiplend_requisitions::{CreateRequisition, NewRequisitionItem};

    use crate::store::ProductChange;

    fn product(stock: i64) -> Product {
        Product::restore(ProductId::new(), "Camera".to_string(), stock, 0, true, 1)
    }

    fn requisition(items: Vec<NewRequisitionItem>) -> Requisition {
        let created = Requisition::create(&CreateRequisition {
            requisition_id: RequisitionId::new(),
            number: RequisitionNumber::new(Utc::now().date_naive(), 1),
            requester_id: UserId::new(),
            purpose: "Lab".to_string(),
            notes: None,
            items,
            occurred_at: Utc::now(),
        })
        .unwrap();
        Requisition::from_created(&created)
    }

    #[tokio::test]
    async fn numbers_are_sequential_per_day() {
        let store = InMemoryLendingStore::new();
        let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let next = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();

        assert_eq!(store.next_requisition_number(day).await.unwrap().as_str(), "REQ-20261019-0001");
        assert_eq!(store.next_requisition_number(day).await.unwrap().as_str(), "REQ-20261019-0002");
        assert_eq!(store.next_requisition_number(next).await.unwrap().as_str(), "REQ-20261020-0001");
    }

    #[tokio::test]
    async fn same_instant_lists_later_id_first_past_four_digit_suffixes() {
        let store = InMemoryLendingStore::new();
        let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let at = Utc::now();

        let mut older = requisition(vec![NewRequisitionItem {
            product_id: ProductId::new(),
            quantity: 1,
        }]);
        older.id = RequisitionId::from_uuid(uuid::Uuid::from_u128(1));
        older.number = RequisitionNumber::new(day, 9999);
        older.requested_at = at;
        let mut newer = older.clone();
        newer.id = RequisitionId::from_uuid(uuid::Uuid::from_u128(2));
        newer.number = RequisitionNumber::new(day, 10000);

        store.insert_requisition(&older).await.unwrap();
        store.insert_requisition(&newer).await.unwrap();

        let listed: Vec<_> = store
            .list_requisitions(&RequisitionFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.number.as_str().to_string())
            .collect();
        assert_eq!(listed, vec!["REQ-20261019-10000", "REQ-20261019-9999"]);
    }

    #[tokio::test]
    async fn failed_unit_writes_nothing() {
        let store = InMemoryLendingStore::new();
        let a = product(5);
        let b = product(1);
        store.insert_product(&a).await.unwrap();
        store.insert_product(&b).await.unwrap();

        let unit = UnitOfWork::new(Utc::now())
            .change(ProductChange::Decrement { product_id: *a.id(), quantity: 2 })
            .change(ProductChange::Decrement { product_id: *b.id(), quantity: 2 });

        let err = store.commit(unit).await.unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::InsufficientStock { .. })));
        assert_eq!(store.get_product(*a.id()).await.unwrap().unwrap().stock(), 5);
        assert_eq!(store.get_product(*b.id()).await.unwrap().unwrap().stock(), 1);
    }

    #[tokio::test]
    async fn stale_requisition_version_is_a_conflict() {
        let store = InMemoryLendingStore::new();
        let r = requisition(vec![NewRequisitionItem {
            product_id: ProductId::new(),
            quantity: 1,
        }]);
        store.insert_requisition(&r).await.unwrap();

        let unit = UnitOfWork::new(Utc::now()).with_requisition(r.clone(), ExpectedVersion::Exact(r.version + 1));
        assert!(matches!(
            store.commit(unit).await,
            Err(StoreError::Domain(DomainError::Conflict(_)))
        ));
    }

    #[tokio::test]
    async fn duplicate_numbers_are_rejected() {
        let store = InMemoryLendingStore::new();
        let item = NewRequisitionItem {
            product_id: ProductId::new(),
            quantity: 1,
        };
        store.insert_requisition(&requisition(vec![item.clone()])).await.unwrap();

        let err = store.insert_requisition(&requisition(vec![item])).await.unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::Conflict(_))));
    }
}
