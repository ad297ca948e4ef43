use serde::{Deserialize, Serialize};

use equiplend_core::{AggregateRoot, ProductId};
use equiplend_infra::NewRequisition;
use equiplend_inventory::{Product, ProductStatus};
use equiplend_requisitions::NewRequisitionItem;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRequisitionRequest {
    pub purpose: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<RequisitionItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct RequisitionItemRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl From<CreateRequisitionRequest> for NewRequisition {
    fn from(body: CreateRequisitionRequest) -> Self {
        NewRequisition {
            purpose: body.purpose,
            notes: body.notes,
            items: body
                .items
                .into_iter()
                .map(|item| NewRequisitionItem {
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApplyStatusRequest {
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRequisitionsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterProductRequest {
    pub name: String,
    pub stock: i64,
    #[serde(default)]
    pub min_stock: i64,
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: ProductId,
    pub name: String,
    pub stock: i64,
    pub min_stock: i64,
    pub status: ProductStatus,
    pub active: bool,
    pub low_stock: bool,
    pub version: u64,
}

impl From<&Product> for ProductResponse {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id_typed(),
            name: p.name().to_string(),
            stock: p.stock(),
            min_stock: p.min_stock(),
            status: p.status(),
            active: p.is_active(),
            low_stock: p.is_low_stock(),
            version: p.version(),
        }
    }
}

pub fn products(list: &[Product]) -> Vec<ProductResponse> {
    list.iter().map(ProductResponse::from).collect()
}
