//! Axum router and service wiring.
//!
//! - `services.rs`: store selection and service construction
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: request bodies and response shapes
//! - `errors.rs`: response envelopes and error mapping

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Router over in-memory stores.
pub fn build_app(jwt_secret: String) -> Router {
    router(jwt_secret, Arc::new(AppServices::in_memory()))
}

/// Full router over the given services.
pub fn router(jwt_secret: String, services: Arc<AppServices>) -> Router {
    let jwt = Arc::new(equiplend_auth::Hs256JwtValidator::new(jwt_secret.into_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
