//! Authentication and authorization boundary.
//!
//! Decoupled from HTTP and storage: the API layer verifies a bearer token into
//! a [`Principal`], and services ask the [`gate`] whether that principal may
//! perform an [`Action`] before any state changes.

pub mod claims;
pub mod gate;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use gate::{AuthzError, authorize};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Action;
pub use principal::Principal;
pub use roles::Role;
