use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use equiplend_core::{Aggregate, AggregateRoot, DomainError, ProductId, RequisitionId, UserId};
use equiplend_events::Event;

use crate::{RequisitionNumber, RequisitionStatus};

/// Requested line as submitted by the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequisitionItem {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Line item owned by a requisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionItem {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
    /// Zero until issuance, then equal to `quantity`.
    pub issued_quantity: i64,
}

/// Aggregate root: Requisition (header + line items).
///
/// # Invariants
/// - At least one item, every quantity >= 1, no product listed twice.
/// - `number` and `requester_id` never change after creation.
/// - Status only moves along the edges of [`RequisitionStatus`]'s graph.
/// - Never hard-deleted; `deleted_at` marks a soft delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requisition {
    pub id: RequisitionId,
    pub number: RequisitionNumber,
    pub requester_id: UserId,
    pub status: RequisitionStatus,
    pub purpose: String,
    pub notes: Option<String>,
    pub admin_note: Option<String>,
    pub rejection_reason: Option<String>,
    pub items: Vec<RequisitionItem>,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<UserId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<UserId>,
    pub issued_at: Option<DateTime<Utc>>,
    pub issued_by: Option<UserId>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<UserId>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

/// Shared validation for a new requisition's header and lines.
pub fn validate_request(purpose: &str, items: &[NewRequisitionItem]) -> Result<(), DomainError> {
    if purpose.trim().is_empty() {
        return Err(DomainError::validation("purpose cannot be empty"));
    }
    if items.is_empty() {
        return Err(DomainError::validation("a requisition needs at least one item"));
    }

    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if item.quantity < 1 {
            return Err(DomainError::validation(format!(
                "quantity for product {} must be at least 1",
                item.product_id
            )));
        }
        if !seen.insert(item.product_id) {
            return Err(DomainError::validation(format!(
                "product {} is listed more than once",
                item.product_id
            )));
        }
    }
    Ok(())
}

impl Requisition {
    /// Decide creation of a new requisition.
    ///
    /// Creation touches no stock; reservation happens on approval.
    pub fn create(cmd: &CreateRequisition) -> Result<RequisitionCreated, DomainError> {
        validate_request(&cmd.purpose, &cmd.items)?;

        Ok(RequisitionCreated {
            requisition_id: cmd.requisition_id,
            number: cmd.number.clone(),
            requester_id: cmd.requester_id,
            purpose: cmd.purpose.trim().to_string(),
            notes: normalize(cmd.notes.as_deref()),
            items: cmd.items.clone(),
            occurred_at: cmd.occurred_at,
        })
    }

    /// Build the initial state from its creation event.
    pub fn from_created(e: &RequisitionCreated) -> Self {
        let items = e
            .items
            .iter()
            .enumerate()
            .map(|(idx, item)| RequisitionItem {
                line_no: (idx as u32) + 1,
                product_id: item.product_id,
                quantity: item.quantity,
                issued_quantity: 0,
            })
            .collect();

        Self {
            id: e.requisition_id,
            number: e.number.clone(),
            requester_id: e.requester_id,
            status: RequisitionStatus::Pending,
            purpose: e.purpose.clone(),
            notes: e.notes.clone(),
            admin_note: None,
            rejection_reason: None,
            items,
            requested_at: e.occurred_at,
            approved_at: None,
            approved_by: None,
            rejected_at: None,
            rejected_by: None,
            issued_at: None,
            issued_by: None,
            completed_at: None,
            completed_by: None,
            cancelled_at: None,
            deleted_at: None,
            updated_at: e.occurred_at,
            version: 1,
        }
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.requester_id == user_id
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Quantity requested per product (each product appears once).
    pub fn demand(&self) -> Vec<(ProductId, i64)> {
        self.items.iter().map(|i| (i.product_id, i.quantity)).collect()
    }
}

impl AggregateRoot for Requisition {
    type Id = RequisitionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateRequisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequisition {
    pub requisition_id: RequisitionId,
    pub number: RequisitionNumber,
    pub requester_id: UserId,
    pub purpose: String,
    pub notes: Option<String>,
    pub items: Vec<NewRequisitionItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveRequisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveRequisition {
    pub requisition_id: RequisitionId,
    pub approver_id: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectRequisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectRequisition {
    pub requisition_id: RequisitionId,
    pub admin_id: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: IssueRequisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRequisition {
    pub requisition_id: RequisitionId,
    pub issuer_id: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteRequisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteRequisition {
    pub requisition_id: RequisitionId,
    pub admin_id: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelRequisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequisition {
    pub requisition_id: RequisitionId,
    pub requester_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ArchiveRequisition (soft delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRequisition {
    pub requisition_id: RequisitionId,
    pub admin_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequisitionCommand {
    Approve(ApproveRequisition),
    Reject(RejectRequisition),
    Issue(IssueRequisition),
    Complete(CompleteRequisition),
    Cancel(CancelRequisition),
    Archive(ArchiveRequisition),
}

impl RequisitionCommand {
    pub fn requisition_id(&self) -> RequisitionId {
        match self {
            RequisitionCommand::Approve(c) => c.requisition_id,
            RequisitionCommand::Reject(c) => c.requisition_id,
            RequisitionCommand::Issue(c) => c.requisition_id,
            RequisitionCommand::Complete(c) => c.requisition_id,
            RequisitionCommand::Cancel(c) => c.requisition_id,
            RequisitionCommand::Archive(c) => c.requisition_id,
        }
    }

    /// Status the command moves the requisition into (None for archive).
    pub fn target_status(&self) -> Option<RequisitionStatus> {
        match self {
            RequisitionCommand::Approve(_) => Some(RequisitionStatus::Approved),
            RequisitionCommand::Reject(_) => Some(RequisitionStatus::Rejected),
            RequisitionCommand::Issue(_) => Some(RequisitionStatus::Issued),
            RequisitionCommand::Complete(_) => Some(RequisitionStatus::Completed),
            RequisitionCommand::Cancel(_) => Some(RequisitionStatus::Cancelled),
            RequisitionCommand::Archive(_) => None,
        }
    }
}

/// Event: RequisitionCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionCreated {
    pub requisition_id: RequisitionId,
    pub number: RequisitionNumber,
    pub requester_id: UserId,
    pub purpose: String,
    pub notes: Option<String>,
    pub items: Vec<NewRequisitionItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequisitionApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionApproved {
    pub requisition_id: RequisitionId,
    pub approver_id: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequisitionRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionRejected {
    pub requisition_id: RequisitionId,
    pub admin_id: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequisitionIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionIssued {
    pub requisition_id: RequisitionId,
    pub issuer_id: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequisitionCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionCompleted {
    pub requisition_id: RequisitionId,
    pub admin_id: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequisitionCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionCancelled {
    pub requisition_id: RequisitionId,
    pub requester_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequisitionArchived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionArchived {
    pub requisition_id: RequisitionId,
    pub admin_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequisitionEvent {
    Created(RequisitionCreated),
    Approved(RequisitionApproved),
    Rejected(RequisitionRejected),
    Issued(RequisitionIssued),
    Completed(RequisitionCompleted),
    Cancelled(RequisitionCancelled),
    Archived(RequisitionArchived),
}

impl Event for RequisitionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RequisitionEvent::Created(_) => "requisition.created",
            RequisitionEvent::Approved(_) => "requisition.approved",
            RequisitionEvent::Rejected(_) => "requisition.rejected",
            RequisitionEvent::Issued(_) => "requisition.issued",
            RequisitionEvent::Completed(_) => "requisition.completed",
            RequisitionEvent::Cancelled(_) => "requisition.cancelled",
            RequisitionEvent::Archived(_) => "requisition.archived",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RequisitionEvent::Created(e) => e.occurred_at,
            RequisitionEvent::Approved(e) => e.occurred_at,
            RequisitionEvent::Rejected(e) => e.occurred_at,
            RequisitionEvent::Issued(e) => e.occurred_at,
            RequisitionEvent::Completed(e) => e.occurred_at,
            RequisitionEvent::Cancelled(e) => e.occurred_at,
            RequisitionEvent::Archived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Requisition {
    type Command = RequisitionCommand;
    type Event = RequisitionEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RequisitionEvent::Created(e) => {
                let version = self.version;
                *self = Requisition::from_created(e);
                self.version = version;
            }
            RequisitionEvent::Approved(e) => {
                self.status = RequisitionStatus::Approved;
                self.approved_at = Some(e.occurred_at);
                self.approved_by = Some(e.approver_id);
                if e.note.is_some() {
                    self.admin_note = e.note.clone();
                }
            }
            RequisitionEvent::Rejected(e) => {
                self.status = RequisitionStatus::Rejected;
                self.rejected_at = Some(e.occurred_at);
                self.rejected_by = Some(e.admin_id);
                self.rejection_reason = e.reason.clone();
                if e.reason.is_some() {
                    self.admin_note = e.reason.clone();
                }
            }
            RequisitionEvent::Issued(e) => {
                self.status = RequisitionStatus::Issued;
                self.issued_at = Some(e.occurred_at);
                self.issued_by = Some(e.issuer_id);
                for item in &mut self.items {
                    item.issued_quantity = item.quantity;
                }
                if e.note.is_some() {
                    self.admin_note = e.note.clone();
                }
            }
            RequisitionEvent::Completed(e) => {
                self.status = RequisitionStatus::Completed;
                self.completed_at = Some(e.occurred_at);
                self.completed_by = Some(e.admin_id);
                if e.note.is_some() {
                    self.admin_note = e.note.clone();
                }
            }
            RequisitionEvent::Cancelled(e) => {
                self.status = RequisitionStatus::Cancelled;
                self.cancelled_at = Some(e.occurred_at);
            }
            RequisitionEvent::Archived(e) => {
                self.deleted_at = Some(e.occurred_at);
            }
        }

        self.updated_at = event.occurred_at();
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if self.id != command.requisition_id() {
            return Err(DomainError::invariant("requisition_id mismatch"));
        }
        if self.is_deleted() {
            return Err(DomainError::not_found(format!("requisition {}", self.id)));
        }
        if let Some(next) = command.target_status() {
            self.status.ensure_transition(next)?;
        }

        let event = match command {
            RequisitionCommand::Approve(cmd) => RequisitionEvent::Approved(RequisitionApproved {
                requisition_id: cmd.requisition_id,
                approver_id: cmd.approver_id,
                note: normalize(cmd.note.as_deref()),
                occurred_at: cmd.occurred_at,
            }),
            RequisitionCommand::Reject(cmd) => RequisitionEvent::Rejected(RequisitionRejected {
                requisition_id: cmd.requisition_id,
                admin_id: cmd.admin_id,
                reason: normalize(cmd.reason.as_deref()),
                occurred_at: cmd.occurred_at,
            }),
            RequisitionCommand::Issue(cmd) => RequisitionEvent::Issued(RequisitionIssued {
                requisition_id: cmd.requisition_id,
                issuer_id: cmd.issuer_id,
                note: normalize(cmd.note.as_deref()),
                occurred_at: cmd.occurred_at,
            }),
            RequisitionCommand::Complete(cmd) => {
                RequisitionEvent::Completed(RequisitionCompleted {
                    requisition_id: cmd.requisition_id,
                    admin_id: cmd.admin_id,
                    note: normalize(cmd.note.as_deref()),
                    occurred_at: cmd.occurred_at,
                })
            }
            RequisitionCommand::Cancel(cmd) => {
                if !self.is_owned_by(cmd.requester_id) {
                    return Err(DomainError::forbidden(
                        "only the requester may cancel a requisition",
                    ));
                }
                RequisitionEvent::Cancelled(RequisitionCancelled {
                    requisition_id: cmd.requisition_id,
                    requester_id: cmd.requester_id,
                    occurred_at: cmd.occurred_at,
                })
            }
            RequisitionCommand::Archive(cmd) => {
                if !self.status.is_terminal() {
                    return Err(DomainError::invalid_transition(self.status, "DELETED"));
                }
                RequisitionEvent::Archived(RequisitionArchived {
                    requisition_id: cmd.requisition_id,
                    admin_id: cmd.admin_id,
                    occurred_at: cmd.occurred_at,
                })
            }
        };

        Ok(vec![event])
    }
}

fn normalize(text: Option<&str>) -> Option<String> {
    text.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
}
