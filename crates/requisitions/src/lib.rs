//! Requisition domain module.
//!
//! A requisition is a requester's ask to borrow one or more products. This
//! crate owns its line items, its human-readable number, and the lifecycle
//! graph every status change must follow.

pub mod number;
pub mod requisition;
pub mod status;

pub use number::RequisitionNumber;
pub use requisition::{
    ApproveRequisition, ArchiveRequisition, CancelRequisition, CompleteRequisition,
    CreateRequisition, IssueRequisition, NewRequisitionItem, RejectRequisition, Requisition,
    RequisitionApproved, RequisitionArchived, RequisitionCancelled, RequisitionCommand,
    RequisitionCompleted, RequisitionCreated, RequisitionEvent, RequisitionIssued,
    RequisitionItem, RequisitionRejected, validate_request,
};
pub use status::RequisitionStatus;
