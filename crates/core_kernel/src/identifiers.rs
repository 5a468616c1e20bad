//! Strongly-typed identifiers for domain entities
//!
//! Newtype wrappers around UUIDs provide type safety and prevent
//! accidental mixing of different identifier types (an `InvoiceId` can
//! never be passed where a `JournalEntryId` is expected).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates a new time-ordered identifier (v7)
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Strip prefix if present
                let uuid_str = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(uuid_str)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

// Tenancy
define_id!(OrgId, "ORG");
define_id!(UserId, "USR");

// Parties
define_id!(CustomerId, "CUST");
define_id!(VendorId, "VEND");

// Ledger
define_id!(AccountId, "ACC");
define_id!(JournalEntryId, "JNL");
define_id!(JournalLineId, "JNLL");

// Financial documents
define_id!(InvoiceId, "INV");
define_id!(PaymentId, "PAY");
define_id!(CreditNoteId, "CN");
define_id!(ExpenseId, "EXP");
define_id!(AdvanceId, "ADV");
define_id!(AllocationId, "ALLOC");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_id_display() {
        let id = InvoiceId::new();
        assert!(id.to_string().starts_with("INV-"));
    }

    #[test]
    fn test_id_parsing_round_trip() {
        let original = JournalEntryId::new();
        let parsed: JournalEntryId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_bare_uuid_parses() {
        let uuid = Uuid::new_v4();
        let parsed: AccountId = uuid.to_string().parse().unwrap();
        assert_eq!(parsed.as_uuid(), &uuid);
    }
}
