use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, post, put},
    Json, Router,
};

use equiplend_auth::Principal;
use equiplend_core::RequisitionId;

use crate::app::dto;
use crate::app::routes::common::{body, parse_id, respond};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_requisition))
        .route("/my", get(list_my_requisitions))
        .route("/:id", get(get_requisition))
        .route("/:id/cancel", put(cancel_requisition))
}

pub async fn create_requisition(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<dto::CreateRequisitionRequest>, JsonRejection>,
) -> Response {
    let input = match body(payload) {
        Ok(v) => v,
        Err(res) => return res,
    };

    let result = services.requisitions.create(&principal, input.into()).await;
    respond(result, StatusCode::CREATED, "requisition created")
}

pub async fn list_my_requisitions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
) -> Response {
    let result = services.requisitions.list_mine(&principal).await;
    respond(result, StatusCode::OK, "requisitions retrieved")
}

pub async fn get_requisition(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Response {
    let id: RequisitionId = match parse_id(&id, "requisition") {
        Ok(v) => v,
        Err(res) => return res,
    };

    let result = services.requisitions.get(&principal, id).await;
    respond(result, StatusCode::OK, "requisition retrieved")
}

pub async fn cancel_requisition(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Response {
    let id: RequisitionId = match parse_id(&id, "requisition") {
        Ok(v) => v,
        Err(res) => return res,
    };

    let result = services.approval.cancel(&principal, id).await;
    respond(result, StatusCode::OK, "requisition cancelled")
}
