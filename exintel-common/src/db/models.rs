//! Database models
//!
//! Entity rows for the feature matrix and its evidence tables, plus the
//! closed vocabularies stored as TEXT columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Declares a TEXT-backed enum with `as_str`, `Display`, and `FromStr`
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::InvalidInput(format!(
                        "invalid {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum!(
    /// Market segment of a tracked exchange
    MarketType {
        Turkish => "turkish",
        Global => "global",
    }
);

text_enum!(
    /// Coverage state of one matrix cell
    FeatureStatus {
        Available => "available",
        NotAvailable => "not_available",
        Beta => "beta",
        ComingSoon => "coming_soon",
        Unknown => "unknown",
    }
);

text_enum!(
    /// Write path that produced an audit entry
    UpdateSource {
        Manual => "manual",
        AiApproved => "ai_approved",
        ExcelImport => "excel_import",
    }
);

text_enum!(
    /// Review state of an AI suggestion
    SuggestionStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
);

impl FeatureStatus {
    /// The denormalized `has_feature` flag implied by this status
    pub fn has_feature(&self) -> bool {
        matches!(self, FeatureStatus::Available | FeatureStatus::Beta)
    }
}

impl SuggestionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SuggestionStatus::Pending)
    }
}

/// Tracked competitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    pub id: String,
    pub name: String,
    pub market_type: MarketType,
    pub website_url: Option<String>,
    pub announcement_url: Option<String>,
    pub twitter_handle: Option<String>,
    pub logo_url: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Grouping bucket for features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureCategory {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub sort_order: i64,
}

/// Trackable capability; `slug` is its natural key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub category_id: String,
    pub sort_order: i64,
    pub description: Option<String>,
}

/// Matrix cell, unique per (exchange, feature)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeFeature {
    pub id: String,
    pub exchange_id: String,
    pub feature_id: String,
    pub has_feature: bool,
    pub feature_status: FeatureStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit record of a status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureUpdateLog {
    pub id: String,
    pub exchange_id: String,
    pub feature_id: String,
    pub old_status: FeatureStatus,
    pub new_status: FeatureStatus,
    pub update_source: UpdateSource,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// AI-proposed status change awaiting review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureUpdateSuggestion {
    pub id: String,
    pub exchange_id: String,
    pub feature_id: String,
    pub old_status: FeatureStatus,
    pub suggested_status: FeatureStatus,
    pub ai_confidence: f64,
    pub evidence: Option<String>,
    pub source_url: Option<String>,
    pub status: SuggestionStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
}

/// Screenshot evidence, optionally tagged once classified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screenshot {
    pub id: String,
    pub exchange_id: String,
    pub storage_key: String,
    pub feature_id: Option<String>,
    pub category_id: Option<String>,
    pub notes: Option<String>,
    pub ai_classification: Option<serde_json::Value>,
    pub ai_confidence: Option<f64>,
    pub classified_at: Option<DateTime<Utc>>,
    pub uploaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_feature_follows_status() {
        assert!(FeatureStatus::Available.has_feature());
        assert!(FeatureStatus::Beta.has_feature());
        assert!(!FeatureStatus::NotAvailable.has_feature());
        assert!(!FeatureStatus::ComingSoon.has_feature());
        assert!(!FeatureStatus::Unknown.has_feature());
    }

    #[test]
    fn test_text_roundtrip() {
        for status in FeatureStatus::ALL {
            assert_eq!(status.as_str().parse::<FeatureStatus>().unwrap(), *status);
        }
        assert_eq!("ai_approved".parse::<UpdateSource>().unwrap(), UpdateSource::AiApproved);
        assert!("Available".parse::<FeatureStatus>().is_err());
    }

    #[test]
    fn test_serde_uses_stored_text() {
        let json = serde_json::to_string(&FeatureStatus::ComingSoon).unwrap();
        assert_eq!(json, "\"coming_soon\"");
        let market: MarketType = serde_json::from_str("\"turkish\"").unwrap();
        assert_eq!(market, MarketType::Turkish);
    }

    #[test]
    fn test_suggestion_terminal_states() {
        assert!(!SuggestionStatus::Pending.is_terminal());
        assert!(SuggestionStatus::Approved.is_terminal());
        assert!(SuggestionStatus::Rejected.is_terminal());
    }
}
