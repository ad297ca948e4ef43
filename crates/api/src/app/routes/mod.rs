use axum::{routing::get, Router};

pub mod admin;
pub mod common;
pub mod products;
pub mod requests;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/requests", requests::router())
        .nest("/products", products::router())
        .nest("/admin", admin::router())
}
