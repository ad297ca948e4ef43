use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};

use equiplend_auth::Principal;
use equiplend_core::ProductId;

use crate::app::dto;
use crate::app::routes::common::{parse_id, respond};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
) -> Response {
    let result = services.inventory.list(&principal).await;
    respond(result.map(|p| dto::products(&p)), StatusCode::OK, "products retrieved")
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Response {
    let id: ProductId = match parse_id(&id, "product") {
        Ok(v) => v,
        Err(res) => return res,
    };

    let result = services.inventory.get(&principal, id).await;
    respond(
        result.map(|p| dto::ProductResponse::from(&p)),
        StatusCode::OK,
        "product retrieved",
    )
}
