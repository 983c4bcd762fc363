//! AI suggestion sweep
//!
//! Walks every exchange, shows the text model the current matrix row and asks
//! which statuses have changed. Each usable answer becomes a pending
//! suggestion; nothing touches the matrix until a reviewer approves it.

use chrono::{DateTime, Utc};
use exintel_common::db::{Exchange, FeatureStatus};
use exintel_common::time;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::db::{cells, exchanges, features};
use crate::services::ai_client::{strip_code_fences, AiError, ChatModel, ChatRequest};
use crate::services::suggestion_manager::{create_suggestion, NewSuggestion};

const SYSTEM_PROMPT: &str = "You are an analyst covering cryptocurrency exchanges. \
Check the current features of the given exchange and decide whether any status in the list has changed. \
Answer with JSON only.";

/// One status change proposed by the model
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProposedUpdate {
    pub feature: String,
    #[serde(default)]
    pub old_status: Option<String>,
    pub new_status: String,
    pub confidence: f64,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
}

/// Per-exchange outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SweepResult {
    #[serde(rename_all = "camelCase")]
    Checked {
        exchange: String,
        suggestions_created: usize,
        /// Updates that named an unknown feature or carried invalid values
        suggestions_skipped: usize,
    },
    Failed { exchange: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub success: bool,
    pub checked_at: DateTime<Utc>,
    pub results: Vec<SweepResult>,
}

/// Extract the `updates` list from raw model output
///
/// Entries that do not have the expected shape are dropped; a reply that is
/// not a JSON object at all is an error.
pub fn parse_updates(content: &str) -> Result<Vec<ProposedUpdate>, AiError> {
    let raw: Value = serde_json::from_str(strip_code_fences(content))
        .map_err(|e| AiError::Parse(e.to_string()))?;
    let Value::Object(mut object) = raw else {
        return Err(AiError::Parse("expected a JSON object".to_string()));
    };

    let updates = match object.remove("updates") {
        Some(Value::Array(items)) => items,
        _ => return Ok(Vec::new()),
    };

    Ok(updates
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<ProposedUpdate>(item) {
            Ok(update) => Some(update),
            Err(e) => {
                debug!(error = %e, "Dropping malformed update entry");
                None
            }
        })
        .collect())
}

fn user_prompt(exchange: &Exchange, current: &[(String, FeatureStatus)]) -> String {
    let lines: Vec<String> = current
        .iter()
        .map(|(name, status)| format!("- {}: {}", name, status))
        .collect();

    format!(
        "Exchange: {}\nWebsite: {}\n\nCurrent feature statuses:\n{}\n\n\
         Which of these statuses may have changed? Focus on features that are \
         \"not_available\" but may now be \"available\".\n\n\
         Answer in this JSON format:\n\
         {{\n  \"updates\": [\n    {{\n      \"feature\": \"feature name\",\n      \
         \"old_status\": \"not_available\",\n      \"new_status\": \"available\",\n      \
         \"confidence\": 0.0-1.0,\n      \"evidence\": \"evidence or source for the change\",\n      \
         \"source_url\": \"reference URL if any\"\n    }}\n  ],\n  \"checked_at\": \"ISO date\"\n}}",
        exchange.name,
        exchange.website_url.as_deref().unwrap_or(""),
        lines.join("\n")
    )
}

/// Sweep dependencies
pub struct SuggestionSweep<'a> {
    pub pool: &'a SqlitePool,
    pub model: &'a dyn ChatModel,
    pub text_model: &'a str,
    /// Pause between exchanges
    pub delay: Duration,
}

impl SuggestionSweep<'_> {
    /// Check every exchange in name order
    ///
    /// A failing exchange is reported and the sweep continues.
    pub async fn run(&self) -> exintel_common::Result<SweepReport> {
        let all = {
            let mut conn = self.pool.acquire().await?;
            exchanges::list_all_exchanges(&mut conn).await?
        };

        let mut results = Vec::with_capacity(all.len());
        for (index, exchange) in all.iter().enumerate() {
            if index > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let result = match self.check_exchange(exchange).await {
                Ok((created, skipped)) => SweepResult::Checked {
                    exchange: exchange.name.clone(),
                    suggestions_created: created,
                    suggestions_skipped: skipped,
                },
                Err(e) => {
                    warn!(exchange_id = %exchange.id, error = %e, "Exchange check failed");
                    SweepResult::Failed {
                        exchange: exchange.name.clone(),
                        error: e,
                    }
                }
            };
            results.push(result);
        }

        let created: usize = results
            .iter()
            .map(|r| match r {
                SweepResult::Checked { suggestions_created, .. } => *suggestions_created,
                SweepResult::Failed { .. } => 0,
            })
            .sum();
        info!(exchanges = all.len(), suggestions_created = created, "Suggestion sweep complete");

        Ok(SweepReport {
            success: true,
            checked_at: time::now(),
            results,
        })
    }

    /// Returns (created, skipped); errors are rendered for the report
    async fn check_exchange(&self, exchange: &Exchange) -> Result<(usize, usize), String> {
        let (current, known_features) = {
            let mut conn = self.pool.acquire().await.map_err(|e| e.to_string())?;
            let current: Vec<(String, FeatureStatus)> =
                cells::list_cells_for_exchange(&mut conn, &exchange.id)
                    .await
                    .map_err(|e| e.to_string())?
                    .into_iter()
                    .map(|detail| (detail.feature_name, detail.cell.feature_status))
                    .collect();
            let known = features::list_features(&mut conn)
                .await
                .map_err(|e| e.to_string())?;
            (current, known)
        };

        let content = self
            .model
            .complete(&ChatRequest {
                model: self.text_model.to_string(),
                system_prompt: SYSTEM_PROMPT.to_string(),
                user_text: user_prompt(exchange, &current),
                image_data_url: None,
                temperature: 0.2,
                max_tokens: 2000,
            })
            .await
            .map_err(|e| e.to_string())?;
        let updates = parse_updates(&content).map_err(|e| e.to_string())?;

        let mut created = 0;
        let mut skipped = 0;
        let mut conn = self.pool.acquire().await.map_err(|e| e.to_string())?;

        for update in updates {
            let wanted = update.feature.trim().to_lowercase();
            let Some(feature) = known_features
                .iter()
                .find(|f| f.name.to_lowercase() == wanted)
            else {
                debug!(exchange_id = %exchange.id, feature = %update.feature, "Unknown feature in update");
                skipped += 1;
                continue;
            };

            let Ok(suggested_status) = update.new_status.trim().parse::<FeatureStatus>() else {
                skipped += 1;
                continue;
            };

            let new = NewSuggestion {
                exchange_id: exchange.id.clone(),
                feature_id: feature.id.clone(),
                old_status: None,
                suggested_status,
                ai_confidence: update.confidence,
                evidence: update.evidence,
                source_url: update.source_url.filter(|url| !url.trim().is_empty()),
            };

            match create_suggestion(&mut conn, &new).await {
                Ok(_) => created += 1,
                Err(e) => {
                    debug!(exchange_id = %exchange.id, error = %e, "Update rejected");
                    skipped += 1;
                }
            }
        }

        Ok((created, skipped))
    }
}
