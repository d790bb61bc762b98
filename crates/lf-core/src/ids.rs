//! Record identifiers.
//!
//! Stores hand ids back as text regardless of the underlying column type, so
//! both sides of an association are opaque strings here. A source id is
//! whatever the source table holds, the empty string included. A target id
//! is never empty: an empty default target means none has been set.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

macro_rules! string_id_impls {
    ($Name:ident) => {
        impl $Name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $Name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl PartialEq<str> for $Name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $Name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

/// Identifier of a source record: the side that must end up linked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Wrap an id exactly as the store returned it.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

string_id_impls!(SourceId);

/// Identifier of a target record, such as the default target of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    /// Create a target id, panicking if it is empty.
    ///
    /// Values read from config or a store go through [`try_new`](Self::try_new).
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        assert!(!id.is_empty(), "TargetId must not be empty");
        Self(id)
    }

    /// `None` when `id` is empty.
    pub fn try_new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        (!id.is_empty()).then_some(Self(id))
    }
}

impl<'de> Deserialize<'de> for TargetId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let id = String::deserialize(deserializer)?;
        TargetId::try_new(id).ok_or_else(|| serde::de::Error::custom("TargetId must not be empty"))
    }
}

string_id_impls!(TargetId);
