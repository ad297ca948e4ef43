//! Requisition lifecycle orchestration.
//!
//! Every status change goes through [`ApprovalStateMachine`]: the access gate
//! runs first, the requisition aggregate decides whether the transition is an
//! edge of the lifecycle graph, and the store commits the new state together
//! with any stock movement. Events go out only after the commit.

use std::sync::Arc;

use chrono::Utc;

use equiplend_auth::{Action, Principal, authorize};
use equiplend_core::{Aggregate, DomainError, ExpectedVersion, RequisitionId};
use equiplend_requisitions::{
    ApproveRequisition, ArchiveRequisition, CancelRequisition, CompleteRequisition,
    IssueRequisition, RejectRequisition, Requisition, RequisitionCommand, RequisitionStatus,
};

use crate::error::ServiceResult;
use crate::publisher::EventPublisher;
use crate::requisitions::load_visible;
use crate::store::{LendingStore, ProductChange, UnitOfWork};

#[derive(Clone)]
pub struct ApprovalStateMachine {
    store: Arc<dyn LendingStore>,
    publisher: EventPublisher,
}

impl ApprovalStateMachine {
    pub fn new(store: Arc<dyn LendingStore>, publisher: EventPublisher) -> Self {
        Self { store, publisher }
    }

    /// PENDING -> APPROVED, decrementing every item's stock in the same unit.
    ///
    /// If any item is short, nothing changes and the first short product is
    /// reported as `InsufficientStock`.
    pub async fn approve(
        &self,
        principal: &Principal,
        id: RequisitionId,
        note: Option<String>,
    ) -> ServiceResult<Requisition> {
        authorize(principal, &Action::ApproveRequisition)?;
        let current = load_visible(self.store.as_ref(), id).await?;

        let reservations = current
            .demand()
            .into_iter()
            .map(|(product_id, quantity)| ProductChange::Decrement { product_id, quantity })
            .collect();
        let command = RequisitionCommand::Approve(ApproveRequisition {
            requisition_id: id,
            approver_id: principal.user_id,
            note,
            occurred_at: Utc::now(),
        });
        self.transition(current, command, reservations).await
    }

    pub async fn reject(
        &self,
        principal: &Principal,
        id: RequisitionId,
        reason: Option<String>,
    ) -> ServiceResult<Requisition> {
        authorize(principal, &Action::RejectRequisition)?;
        let current = load_visible(self.store.as_ref(), id).await?;

        let command = RequisitionCommand::Reject(RejectRequisition {
            requisition_id: id,
            admin_id: principal.user_id,
            reason,
            occurred_at: Utc::now(),
        });
        self.transition(current, command, Vec::new()).await
    }

    pub async fn issue(
        &self,
        principal: &Principal,
        id: RequisitionId,
        note: Option<String>,
    ) -> ServiceResult<Requisition> {
        authorize(principal, &Action::IssueRequisition)?;
        let current = load_visible(self.store.as_ref(), id).await?;

        let command = RequisitionCommand::Issue(IssueRequisition {
            requisition_id: id,
            issuer_id: principal.user_id,
            note,
            occurred_at: Utc::now(),
        });
        self.transition(current, command, Vec::new()).await
    }

    pub async fn complete(
        &self,
        principal: &Principal,
        id: RequisitionId,
        note: Option<String>,
    ) -> ServiceResult<Requisition> {
        authorize(principal, &Action::CompleteRequisition)?;
        let current = load_visible(self.store.as_ref(), id).await?;

        let command = RequisitionCommand::Complete(CompleteRequisition {
            requisition_id: id,
            admin_id: principal.user_id,
            note,
            occurred_at: Utc::now(),
        });
        self.transition(current, command, Vec::new()).await
    }

    /// Owner-only, from PENDING. Stock is untouched (nothing was reserved yet).
    pub async fn cancel(&self, principal: &Principal, id: RequisitionId) -> ServiceResult<Requisition> {
        let current = load_visible(self.store.as_ref(), id).await?;
        authorize(
            principal,
            &Action::CancelRequisition {
                owner: current.requester_id,
            },
        )?;

        let command = RequisitionCommand::Cancel(CancelRequisition {
            requisition_id: id,
            requester_id: principal.user_id,
            occurred_at: Utc::now(),
        });
        self.transition(current, command, Vec::new()).await
    }

    /// Mark a terminal requisition deleted. It disappears from reads and lists.
    pub async fn soft_delete(&self, principal: &Principal, id: RequisitionId) -> ServiceResult<Requisition> {
        authorize(principal, &Action::DeleteRequisition)?;
        let current = load_visible(self.store.as_ref(), id).await?;

        let command = RequisitionCommand::Archive(ArchiveRequisition {
            requisition_id: id,
            admin_id: principal.user_id,
            occurred_at: Utc::now(),
        });
        self.transition(current, command, Vec::new()).await
    }

    /// Route an admin status update to the matching transition.
    ///
    /// Admin only. `notes` becomes the rejection reason for REJECTED and the
    /// admin note otherwise; CANCELLED still requires the admin to own the requisition.
    pub async fn apply_status(
        &self,
        principal: &Principal,
        id: RequisitionId,
        target: RequisitionStatus,
        notes: Option<String>,
    ) -> ServiceResult<Requisition> {
        authorize(principal, &Action::UpdateRequisitionStatus)?;

        match target {
            RequisitionStatus::Approved => self.approve(principal, id, notes).await,
            RequisitionStatus::Rejected => self.reject(principal, id, notes).await,
            RequisitionStatus::Issued => self.issue(principal, id, notes).await,
            RequisitionStatus::Completed => self.complete(principal, id, notes).await,
            RequisitionStatus::Cancelled => self.cancel(principal, id).await,
            RequisitionStatus::Pending => {
                let current = load_visible(self.store.as_ref(), id).await?;
                Err(DomainError::invalid_transition(current.status, RequisitionStatus::Pending).into())
            }
        }
    }

    async fn transition(
        &self,
        current: Requisition,
        command: RequisitionCommand,
        product_changes: Vec<ProductChange>,
    ) -> ServiceResult<Requisition> {
        let events = current.handle(&command).inspect_err(|e| {
            tracing::debug!(requisition_id = %current.id, status = %current.status, error = %e, "transition refused");
        })?;

        let mut next = current.clone();
        for event in &events {
            next.apply(event);
        }

        let mut unit = UnitOfWork::new(next.updated_at)
            .with_requisition(next.clone(), ExpectedVersion::Exact(current.version));
        for change in product_changes {
            unit = unit.change(change);
        }

        let receipt = self.store.commit(unit).await.inspect_err(|e| {
            tracing::info!(requisition_id = %current.id, number = %current.number, error = %e, "transition aborted");
        })?;

        self.publisher.requisition_events(&next, &events);
        self.publisher.product_events(&receipt.product_events);

        tracing::info!(
            requisition_id = %next.id,
            number = %next.number,
            from = %current.status,
            to = %next.status,
            deleted = next.is_deleted(),
            stock_changes = receipt.product_events.len(),
            "requisition transitioned"
        );
        Ok(next)
    }
}
