use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Kind of ledger entry. Borrow and return are separate entries; there is
/// no link between them other than the (user, book) pair and creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Borrow,
    Return,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Borrow => "borrow",
            Self::Return => "return",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a ledger entry.
///
/// Borrow entries move `active → returned`. Return entries are created
/// `completed`; when they carry a fine the payment workflow may move them to
/// `pending_verification`, back to `active` on rejection, and finally to
/// `completed` once paid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pending,
    Active,
    Returned,
    Completed,
    PendingVerification,
}

impl Status {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Returned => "returned",
            Self::Completed => "completed",
            Self::PendingVerification => "pending_verification",
        }
    }

    /// Entries in these states only accept payment-field updates.
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Returned | Self::Completed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a fine was (or is being) paid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Qris,
    Manual,
}

impl PaymentMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Qris => "qris",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qris" => Ok(Self::Qris),
            "manual" => Ok(Self::Manual),
            other => Err(TypeError::UnknownVariant {
                kind: "payment method",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&Status::PendingVerification).unwrap(),
            "\"pending_verification\""
        );
        assert_eq!(Status::Returned.to_string(), "returned");
    }

    #[test]
    fn settled_states() {
        assert!(Status::Returned.is_settled());
        assert!(Status::Completed.is_settled());
        assert!(!Status::Active.is_settled());
        assert!(!Status::PendingVerification.is_settled());
    }

    #[test]
    fn payment_method_parse() {
        assert_eq!("qris".parse::<PaymentMethod>(), Ok(PaymentMethod::Qris));
        assert_eq!("manual".parse::<PaymentMethod>(), Ok(PaymentMethod::Manual));
        assert!("cash".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn action_display() {
        assert_eq!(format!("{}", Action::Borrow), "borrow");
        assert_eq!(format!("{}", Action::Return), "return");
    }
}
