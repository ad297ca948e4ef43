use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use equiplend_core::DomainError;

const PREFIX: &str = "REQ";

/// Human-readable requisition number: `REQ-YYYYMMDD-NNNN`.
///
/// The date is the creation day and the suffix a per-day sequence allocated by
/// the store. Assigned once at creation and never changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequisitionNumber(String);

impl RequisitionNumber {
    pub fn new(day: NaiveDate, sequence: u32) -> Self {
        Self(format!("{PREFIX}-{}-{sequence:04}", day.format("%Y%m%d")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let invalid = || DomainError::validation(format!("malformed requisition number '{raw}'"));

        let mut parts = raw.splitn(3, '-');
        let (Some(prefix), Some(day), Some(seq)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        if prefix != PREFIX || day.len() != 8 || seq.len() < 4 {
            return Err(invalid());
        }
        let day = NaiveDate::parse_from_str(day, "%Y%m%d").map_err(|_| invalid())?;
        let seq: u32 = seq.parse().map_err(|_| invalid())?;
        if seq == 0 {
            return Err(invalid());
        }
        Ok(Self::new(day, seq))
    }
}

impl TryFrom<String> for RequisitionNumber {
    type Error = DomainError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<RequisitionNumber> for String {
    fn from(number: RequisitionNumber) -> Self {
        number.0
    }
}

impl core::fmt::Display for RequisitionNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn formats_date_and_padded_sequence() {
        assert_eq!(RequisitionNumber::new(day(), 7).as_str(), "REQ-20261019-0007");
        assert_eq!(RequisitionNumber::new(day(), 12345).as_str(), "REQ-20261019-12345");
    }

    #[test]
    fn parse_accepts_own_output() {
        let n = RequisitionNumber::new(day(), 42);
        assert_eq!(RequisitionNumber::parse(n.as_str()).unwrap(), n);
    }

    #[test]
    fn deserializing_goes_through_parse() {
        let n: RequisitionNumber = serde_json::from_str("\"REQ-20261019-0042\"").unwrap();
        assert_eq!(n, RequisitionNumber::new(day(), 42));
        assert_eq!(serde_json::to_string(&n).unwrap(), "\"REQ-20261019-0042\"");

        for raw in ["\"REQ\"", "\"REQ-2026\"", "\"\""] {
            assert!(serde_json::from_str::<RequisitionNumber>(raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn parse_rejects_malformed() {
        for raw in ["", "REQ-2026-0001", "ORD-20261019-0001", "REQ-20261319-0001", "REQ-20261019-0000"] {
            assert!(RequisitionNumber::parse(raw).is_err(), "{raw} should be rejected");
        }
    }
}
