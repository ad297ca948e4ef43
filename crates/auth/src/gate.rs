//! Access gate: role and ownership checks, run before any state change.
//!
//! - No IO
//! - No panics
//! - No business logic (lifecycle rules live in the state machine)

use thiserror::Error;

use equiplend_core::UserId;

use crate::{Action, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' may not perform '{action}'")]
    Forbidden { role: Role, action: &'static str },

    #[error("forbidden: '{action}' is limited to the requisition's owner")]
    NotOwner { action: &'static str },
}

/// Decide whether `principal` may perform `action`.
///
/// Admin is a superset of requester, except that cancelling always requires
/// ownership.
pub fn authorize(principal: &Principal, action: &Action) -> Result<(), AuthzError> {
    let decision = match (principal.role, action) {
        (_, Action::CreateRequisition | Action::ListOwnRequisitions | Action::ReadProducts) => {
            Ok(())
        }
        (_, Action::CancelRequisition { owner }) => owned_by(principal, *owner, action),

        (Role::Admin, Action::ReadRequisition { .. }) => Ok(()),
        (Role::Requester, Action::ReadRequisition { owner }) => owned_by(principal, *owner, action),

        (
            Role::Admin,
            Action::ListAllRequisitions
            | Action::ApproveRequisition
            | Action::RejectRequisition
            | Action::IssueRequisition
            | Action::CompleteRequisition
            | Action::UpdateRequisitionStatus
            | Action::DeleteRequisition
            | Action::ManageProducts,
        ) => Ok(()),
        (
            Role::Requester,
            Action::ListAllRequisitions
            | Action::ApproveRequisition
            | Action::RejectRequisition
            | Action::IssueRequisition
            | Action::CompleteRequisition
            | Action::UpdateRequisitionStatus
            | Action::DeleteRequisition
            | Action::ManageProducts,
        ) => Err(AuthzError::Forbidden {
            role: principal.role,
            action: action.as_str(),
        }),
    };

    if let Err(err) = &decision {
        tracing::debug!(user_id = %principal.user_id, action = %action, error = %err, "access denied");
    }
    decision
}

fn owned_by(principal: &Principal, owner: UserId, action: &Action) -> Result<(), AuthzError> {
    if principal.user_id == owner {
        Ok(())
    } else {
        Err(AuthzError::NotOwner {
            action: action.as_str(),
        })
    }
}
