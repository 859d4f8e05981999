use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|_| TypeError::InvalidId {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identity of a library member, issued by the identity service.
    UserId,
    "user"
);

numeric_id!(
    /// Identity of a catalog book.
    BookId,
    "book"
);

numeric_id!(
    /// Identity of a ledger entry. Assigned by the ledger in creation order.
    TransactionId,
    "transaction"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_id() {
        let id: BookId = "42".parse().unwrap();
        assert_eq!(id, BookId::new(42));
        assert_eq!(id.get(), 42);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = "abc".parse::<TransactionId>().unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidId {
                kind: "transaction",
                value: "abc".into()
            }
        );
    }

    #[test]
    fn parse_rejects_negative() {
        assert!("-1".parse::<UserId>().is_err());
    }

    #[test]
    fn serde_is_transparent() {
        let json = serde_json::to_string(&BookId::new(7)).unwrap();
        assert_eq!(json, "7");
        let parsed: BookId = serde_json::from_str("7").unwrap();
        assert_eq!(parsed, BookId::new(7));
    }

    #[test]
    fn debug_and_display() {
        let id = UserId::new(3);
        assert_eq!(format!("{id}"), "3");
        assert_eq!(format!("{id:?}"), "UserId(3)");
    }
}
