use std::fmt;
use std::str::FromStr;

use snafu::ensure;

use super::error::{InvalidIdSnafu, StorageError, StorageResult};

/// Longest owner or key the store accepts, in bytes.
pub const MAX_SCOPE_ID_LEN: usize = 512;

// Owner and key wrappers share one shape so every scoped lookup validates identically.
macro_rules! define_scope_id {
    ($name:ident, $id_type:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> StorageResult<Self> {
                let trimmed = raw.trim();
                ensure!(
                    !trimmed.is_empty(),
                    InvalidIdSnafu {
                        stage: "parse-scope-id",
                        id_type: $id_type,
                        raw: raw.to_string(),
                        reason: "must not be blank",
                    }
                );
                ensure!(
                    trimmed.len() <= MAX_SCOPE_ID_LEN,
                    InvalidIdSnafu {
                        stage: "parse-scope-id",
                        id_type: $id_type,
                        raw: raw.to_string(),
                        reason: "is too long",
                    }
                );
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = StorageError;

            fn from_str(raw: &str) -> StorageResult<Self> {
                Self::parse(raw)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_scope_id!(OwnerScope, "owner");
define_scope_id!(EntryKey, "key");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_surrounding_whitespace() {
        let owner = OwnerScope::parse("  michi ").unwrap();
        assert_eq!(owner.as_str(), "michi");
        assert_eq!(owner.to_string(), "michi");
    }

    #[test]
    fn parse_rejects_blank_and_oversized_values() {
        assert!(matches!(
            EntryKey::parse("   "),
            Err(StorageError::InvalidId { id_type: "key", .. })
        ));

        let oversized = "k".repeat(MAX_SCOPE_ID_LEN + 1);
        assert!(matches!(
            "x".repeat(MAX_SCOPE_ID_LEN).parse::<EntryKey>(),
            Ok(_)
        ));
        assert!(matches!(
            oversized.parse::<OwnerScope>(),
            Err(StorageError::InvalidId {
                id_type: "owner",
                ..
            })
        ));
    }
}
