use equiplend_core::UserId;

/// Something a caller is trying to do.
///
/// Ownership-sensitive actions carry the owner of the target so the gate can
/// decide without touching storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateRequisition,
    ReadRequisition { owner: UserId },
    ListOwnRequisitions,
    ListAllRequisitions,
    ApproveRequisition,
    RejectRequisition,
    IssueRequisition,
    CompleteRequisition,
    /// Admin status update; routes to one of the transitions above.
    UpdateRequisitionStatus,
    CancelRequisition { owner: UserId },
    DeleteRequisition,
    ReadProducts,
    ManageProducts,
}

impl Action {
    /// Stable permission name, used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateRequisition => "requisitions.create",
            Action::ReadRequisition { .. } => "requisitions.read",
            Action::ListOwnRequisitions => "requisitions.list_own",
            Action::ListAllRequisitions => "requisitions.list_all",
            Action::ApproveRequisition => "requisitions.approve",
            Action::RejectRequisition => "requisitions.reject",
            Action::IssueRequisition => "requisitions.issue",
            Action::CompleteRequisition => "requisitions.complete",
            Action::UpdateRequisitionStatus => "requisitions.update_status",
            Action::CancelRequisition { .. } => "requisitions.cancel",
            Action::DeleteRequisition => "requisitions.delete",
            Action::ReadProducts => "products.read",
            Action::ManageProducts => "products.manage",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
