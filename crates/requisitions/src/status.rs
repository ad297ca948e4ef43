//! Requisition lifecycle graph.
//!
//! ```text
//! PENDING ──approve──> APPROVED ──issue──> ISSUED ──complete──> COMPLETED
//!    │
//!    ├──reject──> REJECTED
//!    └──cancel──> CANCELLED
//! ```
//!
//! REJECTED, COMPLETED and CANCELLED are terminal.

use serde::{Deserialize, Serialize};

use equiplend_core::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequisitionStatus {
    Pending,
    Approved,
    Rejected,
    Issued,
    Completed,
    Cancelled,
}

impl RequisitionStatus {
    pub const ALL: [RequisitionStatus; 6] = [
        RequisitionStatus::Pending,
        RequisitionStatus::Approved,
        RequisitionStatus::Rejected,
        RequisitionStatus::Issued,
        RequisitionStatus::Completed,
        RequisitionStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequisitionStatus::Pending => "PENDING",
            RequisitionStatus::Approved => "APPROVED",
            RequisitionStatus::Rejected => "REJECTED",
            RequisitionStatus::Issued => "ISSUED",
            RequisitionStatus::Completed => "COMPLETED",
            RequisitionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequisitionStatus::Rejected | RequisitionStatus::Completed | RequisitionStatus::Cancelled
        )
    }

    /// Whether `next` is an edge of the lifecycle graph from `self`.
    pub fn can_transition_to(&self, next: RequisitionStatus) -> bool {
        use RequisitionStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Approved, Issued)
                | (Issued, Completed)
        )
    }

    pub fn ensure_transition(&self, next: RequisitionStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(self, next))
        }
    }
}

impl core::fmt::Display for RequisitionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for RequisitionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| DomainError::validation(format!("unknown requisition status '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequisitionStatus::*;

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for from in RequisitionStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in RequisitionStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be invalid");
            }
        }
    }

    #[test]
    fn pending_fans_out_to_three_states() {
        let reachable: Vec<_> = RequisitionStatus::ALL
            .into_iter()
            .filter(|s| Pending.can_transition_to(*s))
            .collect();
        assert_eq!(reachable, vec![Approved, Rejected, Cancelled]);
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = Approved.ensure_transition(Completed).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                from: "APPROVED".to_string(),
                to: "COMPLETED".to_string(),
            }
        );
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("approved".parse::<RequisitionStatus>().unwrap(), Approved);
        assert_eq!(" Issued ".parse::<RequisitionStatus>().unwrap(), Issued);
        assert!("lost".parse::<RequisitionStatus>().is_err());
    }

    #[test]
    fn no_self_loops() {
        for s in RequisitionStatus::ALL {
            assert!(!s.can_transition_to(s));
        }
    }
}
