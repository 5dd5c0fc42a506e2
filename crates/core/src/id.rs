//! Strongly-typed identifiers used across the engine.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ForecastError;

/// Stock-keeping unit code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(String);

/// Product category (e.g. `sarees`, `suits`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

macro_rules! impl_code_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Build from a raw code; surrounding whitespace is trimmed.
            pub fn new(code: impl AsRef<str>) -> Result<Self, ForecastError> {
                let code = code.as_ref().trim();
                if code.is_empty() {
                    return Err(ForecastError::validation(concat!($name, " cannot be empty")));
                }
                if code.contains(['/', '\\', ':']) {
                    return Err(ForecastError::validation(format!(
                        "{} '{}' contains a reserved character",
                        $name, code
                    )));
                }
                Ok(Self(code.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = ForecastError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

impl_code_newtype!(Sku, "sku");
impl_code_newtype!(Category, "category");

/// The unit a forecast is produced for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum Subject {
    Sku(Sku),
    Category(Category),
}

impl Subject {
    pub fn sku(code: impl AsRef<str>) -> Result<Self, ForecastError> {
        Ok(Self::Sku(Sku::new(code)?))
    }

    pub fn category(code: impl AsRef<str>) -> Result<Self, ForecastError> {
        Ok(Self::Category(Category::new(code)?))
    }

    pub fn is_category(&self) -> bool {
        matches!(self, Subject::Category(_))
    }

    pub fn as_sku(&self) -> Option<&Sku> {
        match self {
            Subject::Sku(sku) => Some(sku),
            Subject::Category(_) => None,
        }
    }

    /// Stable storage key (`sku-<code>` / `category-<code>`), safe as a file stem.
    pub fn storage_key(&self) -> String {
        match self {
            Subject::Sku(sku) => format!("sku-{sku}"),
            Subject::Category(category) => format!("category-{category}"),
        }
    }
}

impl core::fmt::Display for Subject {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Subject::Sku(sku) => write!(f, "sku:{sku}"),
            Subject::Category(category) => write!(f, "category:{category}"),
        }
    }
}

impl FromStr for Subject {
    type Err = ForecastError;

    /// Parses `sku:<code>` or `category:<code>`; a bare code is read as a SKU.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("sku", code)) => Subject::sku(code),
            Some(("category", code)) => Subject::category(code),
            Some((kind, _)) => Err(ForecastError::validation(format!(
                "unknown subject kind '{kind}'"
            ))),
            None => Subject::sku(s),
        }
    }
}

impl From<Sku> for Subject {
    fn from(value: Sku) -> Self {
        Subject::Sku(value)
    }
}

impl From<Category> for Subject {
    fn from(value: Category) -> Self {
        Subject::Category(value)
    }
}

/// Identifier of a fitted model artifact.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(Uuid);

/// Identifier of a batch run (training or forecasting).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty) => {
        impl $t {
            /// UUIDv7, so identifiers sort by creation time.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

impl_uuid_newtype!(ArtifactId);
impl_uuid_newtype!(RunId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_round_trips_through_display() {
        let sku: Subject = "sku:SAR-001".parse().unwrap();
        assert_eq!(sku.to_string(), "sku:SAR-001");

        let category: Subject = "category:sarees".parse().unwrap();
        assert!(category.is_category());
        assert_eq!(category.storage_key(), "category-sarees");
    }

    #[test]
    fn bare_code_parses_as_sku() {
        let subject: Subject = " KUR-17 ".parse().unwrap();
        assert_eq!(subject, Subject::Sku(Sku::new("KUR-17").unwrap()));
    }

    #[test]
    fn codes_reject_empty_and_path_characters() {
        assert!(Sku::new("   ").is_err());
        assert!(Category::new("../etc").is_err());
        assert!("warehouse:abc".parse::<Subject>().is_err());
    }

    #[test]
    fn subject_serializes_with_kind_tag() {
        let subject = Subject::category("suits").unwrap();
        let json = serde_json::to_value(&subject).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "category", "code": "suits"}));
    }
}
