//! Administrator endpoints. Role checks happen in the services; these
//! handlers only parse input and shape responses.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::{get, post, put},
    Json, Router,
};

use equiplend_auth::{authorize, Action, Principal};
use equiplend_core::{ProductId, RequisitionId};
use equiplend_requisitions::RequisitionStatus;

use crate::app::routes::common::{body, parse_id, respond};
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/requests", get(list_requisitions))
        .route("/requests/:id", axum::routing::delete(delete_requisition))
        .route("/requests/:id/status", put(apply_status))
        .route("/products", post(register_product))
        .route("/products/low-stock", get(list_low_stock))
        .route("/products/alerts", get(list_low_stock_alerts))
        .route("/products/:id/restock", post(restock_product))
        .route("/products/:id/active", put(set_product_active))
}

pub async fn list_requisitions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<dto::ListRequisitionsQuery>,
) -> Response {
    let status = match query.status.as_deref().map(str::parse::<RequisitionStatus>).transpose() {
        Ok(v) => v,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_status", e.to_string()),
    };

    let result = services.requisitions.list_all(&principal, status).await;
    respond(result, StatusCode::OK, "requisitions retrieved")
}

pub async fn apply_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    payload: Result<Json<dto::ApplyStatusRequest>, JsonRejection>,
) -> Response {
    let id: RequisitionId = match parse_id(&id, "requisition") {
        Ok(v) => v,
        Err(res) => return res,
    };
    let input = match body(payload) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let target: RequisitionStatus = match input.status.parse() {
        Ok(v) => v,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_status", e.to_string()),
    };

    let result = services
        .approval
        .apply_status(&principal, id, target, input.notes)
        .await;
    respond(result, StatusCode::OK, "requisition status updated")
}

pub async fn delete_requisition(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Response {
    let id: RequisitionId = match parse_id(&id, "requisition") {
        Ok(v) => v,
        Err(res) => return res,
    };

    let result = services.approval.soft_delete(&principal, id).await;
    respond(result, StatusCode::OK, "requisition deleted")
}

pub async fn register_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<dto::RegisterProductRequest>, JsonRejection>,
) -> Response {
    let input = match body(payload) {
        Ok(v) => v,
        Err(res) => return res,
    };

    let result = services
        .inventory
        .register(&principal, &input.name, input.stock, input.min_stock)
        .await;
    respond(
        result.map(|p| dto::ProductResponse::from(&p)),
        StatusCode::CREATED,
        "product registered",
    )
}

pub async fn restock_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    payload: Result<Json<dto::RestockRequest>, JsonRejection>,
) -> Response {
    let id: ProductId = match parse_id(&id, "product") {
        Ok(v) => v,
        Err(res) => return res,
    };
    let input = match body(payload) {
        Ok(v) => v,
        Err(res) => return res,
    };

    let result = services.inventory.restock(&principal, id, input.quantity).await;
    respond(
        result.map(|p| dto::ProductResponse::from(&p)),
        StatusCode::OK,
        "product restocked",
    )
}

pub async fn set_product_active(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    payload: Result<Json<dto::SetActiveRequest>, JsonRejection>,
) -> Response {
    let id: ProductId = match parse_id(&id, "product") {
        Ok(v) => v,
        Err(res) => return res,
    };
    let input = match body(payload) {
        Ok(v) => v,
        Err(res) => return res,
    };

    let result = services.inventory.set_active(&principal, id, input.active).await;
    respond(
        result.map(|p| dto::ProductResponse::from(&p)),
        StatusCode::OK,
        "product updated",
    )
}

pub async fn list_low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
) -> Response {
    let result = services.inventory.list_low_stock(&principal).await;
    respond(result.map(|p| dto::products(&p)), StatusCode::OK, "low-stock products retrieved")
}

/// Recent low-stock warnings observed on the event bus.
pub async fn list_low_stock_alerts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
) -> Response {
    if let Err(e) = authorize(&principal, &Action::ManageProducts) {
        return errors::service_error_to_response(e.into());
    }
    errors::json_ok(StatusCode::OK, "low-stock alerts retrieved", services.monitor.alerts())
}
