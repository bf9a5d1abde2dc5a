use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Content-addressed change identifier: `chg_` followed by the first 12 hex
/// characters of `SHA-256(summary \0 diff)`. Identical input always derives
/// the identical id, so resubmissions of the same request are recognizable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ChangeId(String);

/// Per-round review identifier: `rev_` followed by a ULID. A fresh one is
/// issued for each checkpoint, so use-consent and apply-approval are tracked
/// independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ReviewId(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    InvalidPrefix { expected: &'static str, got: String },
    InvalidUlid { value: String },
    InvalidFormat { value: String },
}

impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPrefix { expected, got } => {
                write!(f, "invalid prefix: expected {expected}, got {got}")
            }
            Self::InvalidUlid { value } => write!(f, "invalid ulid: {value}"),
            Self::InvalidFormat { value } => write!(f, "invalid id format: {value}"),
        }
    }
}

impl std::error::Error for IdError {}

const CHANGE_ID_HEX_LEN: usize = 12;

impl ChangeId {
    pub const PREFIX: &'static str = "chg_";

    pub fn derive(summary: &str, unified_diff: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(summary.as_bytes());
        hasher.update([0u8]);
        hasher.update(unified_diff.as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(format!("{}{}", Self::PREFIX, &digest[..CHANGE_ID_HEX_LEN]))
    }

    pub fn new(value: String) -> Result<Self, IdError> {
        let Some(rest) = value.strip_prefix(Self::PREFIX) else {
            let got = value.split('_').next().unwrap_or("").to_string();
            return Err(IdError::InvalidPrefix {
                expected: Self::PREFIX,
                got,
            });
        };
        if rest.len() != CHANGE_ID_HEX_LEN || !rest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(IdError::InvalidFormat { value });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ReviewId {
    pub const PREFIX: &'static str = "rev_";

    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, Ulid::new()))
    }

    pub fn new(value: String) -> Result<Self, IdError> {
        let Some(rest) = value.strip_prefix(Self::PREFIX) else {
            let got = value.split('_').next().unwrap_or("").to_string();
            return Err(IdError::InvalidPrefix {
                expected: Self::PREFIX,
                got,
            });
        };
        if rest.len() != 26 {
            return Err(IdError::InvalidFormat { value });
        }
        if Ulid::from_str(rest).is_err() {
            return Err(IdError::InvalidUlid { value });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! id_impls {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let value = String::deserialize(deserializer)?;
                Self::new(value).map_err(serde::de::Error::custom)
            }
        }
    };
}

id_impls!(ChangeId);
id_impls!(ReviewId);
