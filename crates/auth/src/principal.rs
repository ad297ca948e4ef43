use serde::{Deserialize, Serialize};

use equiplend_core::UserId;

use crate::Role;

/// An authenticated caller, as established by the transport layer.
///
/// The core trusts this value; verifying where it came from is the job of
/// whoever constructs it (see [`crate::JwtValidator`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn requester(user_id: UserId) -> Self {
        Self::new(user_id, Role::Requester)
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}
