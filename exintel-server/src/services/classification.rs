//! Screenshot classification
//!
//! Sends a screenshot plus the known category and feature names to the vision
//! model, validates the JSON it answers with, and tags the screenshot when the
//! named feature matches a known one (case-insensitive exact name). An
//! unmatched answer is still stored but leaves the tags null.

use exintel_common::db::{Feature, FeatureCategory, Screenshot};
use exintel_common::time;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::screenshots::{self, ClassificationRecord};
use crate::db::{categories, features};
use crate::services::ai_client::{strip_code_fences, AiError, ChatModel, ChatRequest};
use crate::services::screenshot_store::{folder_hint, image_data_url, ScreenshotStore, StoreError};

/// Default batch size when no ids are given
pub const DEFAULT_BATCH_LIMIT: i64 = 10;

const SYSTEM_PROMPT: &str = "You are an expert on cryptocurrency exchange products. \
You look at app and web screenshots and decide which feature category and which feature they show. \
Study the visible UI elements, texts and flow carefully. Answer with JSON only, no commentary.";

/// Validated model answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub feature: String,
    pub confidence: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ui_elements: Vec<String>,
}

/// Model output that failed validation
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("model output is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("model output missing field '{0}'")]
    MissingField(&'static str),

    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("model output names no feature")]
    EmptyFeature,
}

/// Single classification failure
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Screenshot not found: {0}")]
    ScreenshotNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ai(#[from] AiError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Database(#[from] exintel_common::Error),
}

/// Feature matched from the model's answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedFeature {
    pub id: String,
    pub name: String,
}

/// Result of one successful classification
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyOutcome {
    pub screenshot: Screenshot,
    pub classification: Classification,
    pub matched_feature: Option<MatchedFeature>,
}

/// Per-item batch outcome
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchItem {
    Success {
        #[serde(rename = "screenshotId")]
        screenshot_id: String,
        classification: Classification,
        #[serde(rename = "matchedFeature")]
        matched_feature: Option<String>,
    },
    Error {
        #[serde(rename = "screenshotId")]
        screenshot_id: String,
        error: String,
    },
}

/// Batch response
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<BatchItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Which screenshots a batch covers
#[derive(Debug, Clone)]
pub enum BatchSelection {
    Ids(Vec<String>),
    OldestUnclassified(i64),
}

/// Vocabulary offered to the model, loaded once per call or batch
#[derive(Debug, Clone, Default)]
pub struct ClassificationContext {
    pub categories: Vec<FeatureCategory>,
    pub features: Vec<Feature>,
}

impl ClassificationContext {
    pub async fn load(pool: &SqlitePool) -> exintel_common::Result<Self> {
        let mut conn = pool.acquire().await?;
        Ok(Self {
            categories: categories::list_categories(&mut conn).await?,
            features: features::list_features(&mut conn).await?,
        })
    }

    /// Case-insensitive exact match on feature name
    pub fn match_feature(&self, name: &str) -> Option<&Feature> {
        let wanted = name.trim().to_lowercase();
        self.features
            .iter()
            .find(|feature| feature.name.to_lowercase() == wanted)
    }
}

/// Dependencies of the pipeline
pub struct Classifier<'a> {
    pub pool: &'a SqlitePool,
    pub model: &'a dyn ChatModel,
    pub store: &'a dyn ScreenshotStore,
    pub vision_model: &'a str,
}

/// Validate raw model output
///
/// Returns the typed classification and the JSON object as received, which
/// is what gets persisted.
pub fn parse_classification(content: &str) -> Result<(Classification, Value), ParseError> {
    let raw: Value = serde_json::from_str(strip_code_fences(content))
        .map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    if !raw.is_object() {
        return Err(ParseError::InvalidJson("expected a JSON object".to_string()));
    }

    let text = |field: &'static str| -> Result<String, ParseError> {
        raw.get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(ParseError::MissingField(field))
    };

    let category = text("category")?;
    let feature = text("feature")?;
    if feature.trim().is_empty() {
        return Err(ParseError::EmptyFeature);
    }

    let confidence = raw
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or(ParseError::MissingField("confidence"))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ParseError::ConfidenceOutOfRange(confidence));
    }

    let description = raw
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let ui_elements = raw
        .get("ui_elements")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok((
        Classification {
            category,
            feature,
            confidence,
            description,
            ui_elements,
        },
        raw,
    ))
}

fn user_prompt(context: &ClassificationContext, hint: Option<&str>) -> String {
    let category_names: Vec<&str> = context.categories.iter().map(|c| c.name.as_str()).collect();
    let feature_names: Vec<&str> = context.features.iter().map(|f| f.name.as_str()).collect();

    let hint_text = hint
        .map(|hint| {
            format!(
                "\n\nHINT: this screenshot was filed under the folder \"{}\". \
                 Take it into account, but trust what the image shows first.",
                hint
            )
        })
        .unwrap_or_default();

    format!(
        "Analyse this crypto exchange screenshot and decide which feature or flow it belongs to.\n\n\
         Possible categories: {}\n\
         Possible features: {}{}\n\n\
         If none of the features matches exactly, pick the closest one.\n\n\
         Answer in this JSON format:\n\
         {{\n  \"category\": \"category name\",\n  \"feature\": \"feature name\",\n  \
         \"confidence\": 0.0-1.0,\n  \"description\": \"short description of the screen\",\n  \
         \"ui_elements\": [\"detected UI elements: buttons, forms, lists\"]\n}}",
        serde_json::to_string(&category_names).unwrap_or_default(),
        serde_json::to_string(&feature_names).unwrap_or_default(),
        hint_text
    )
}

impl Classifier<'_> {
    /// Classify one screenshot and persist the result
    pub async fn classify(
        &self,
        context: &ClassificationContext,
        screenshot_id: &str,
    ) -> Result<ClassifyOutcome, ClassifyError> {
        let screenshot = {
            let mut conn = self.pool.acquire().await.map_err(exintel_common::Error::from)?;
            screenshots::get_screenshot(&mut conn, screenshot_id)
                .await?
                .ok_or_else(|| ClassifyError::ScreenshotNotFound(screenshot_id.to_string()))?
        };

        let image = self.store.fetch(&screenshot.storage_key).await?;
        let hint = folder_hint(&screenshot.storage_key);

        let content = self
            .model
            .complete(&ChatRequest {
                model: self.vision_model.to_string(),
                system_prompt: SYSTEM_PROMPT.to_string(),
                user_text: user_prompt(context, hint.as_deref()),
                image_data_url: Some(image_data_url(&image)),
                temperature: 0.1,
                max_tokens: 500,
            })
            .await?;

        let (classification, raw) = parse_classification(&content)?;
        let matched = context.match_feature(&classification.feature);

        let record = ClassificationRecord {
            raw: raw.clone(),
            confidence: classification.confidence,
            feature_id: matched.map(|f| f.id.clone()),
            category_id: matched.map(|f| f.category_id.clone()),
            classified_at: time::now(),
        };

        {
            let mut conn = self.pool.acquire().await.map_err(exintel_common::Error::from)?;
            screenshots::save_classification(&mut conn, screenshot_id, &record).await?;
        }

        info!(
            screenshot_id = %screenshot_id,
            feature = %classification.feature,
            confidence = classification.confidence,
            matched = matched.is_some(),
            "Screenshot classified"
        );

        let screenshot = Screenshot {
            feature_id: record.feature_id,
            category_id: record.category_id,
            ai_classification: Some(raw),
            ai_confidence: Some(record.confidence),
            classified_at: Some(record.classified_at),
            ..screenshot
        };

        Ok(ClassifyOutcome {
            screenshot,
            classification,
            matched_feature: matched.map(|f| MatchedFeature {
                id: f.id.clone(),
                name: f.name.clone(),
            }),
        })
    }

    /// Classify screenshots one after another
    ///
    /// Waits `delay` between model calls. A failing item is recorded and the
    /// batch moves on.
    pub async fn classify_batch(
        &self,
        selection: BatchSelection,
        delay: Duration,
    ) -> exintel_common::Result<BatchReport> {
        let ids = match selection {
            BatchSelection::Ids(ids) => ids,
            BatchSelection::OldestUnclassified(limit) => {
                let mut conn = self.pool.acquire().await?;
                screenshots::oldest_unclassified_ids(&mut conn, limit).await?
            }
        };

        if ids.is_empty() {
            return Ok(BatchReport {
                total: 0,
                successful: 0,
                failed: 0,
                results: Vec::new(),
                message: Some("No unclassified screenshots found".to_string()),
            });
        }

        let context = ClassificationContext::load(self.pool).await?;
        let mut results = Vec::with_capacity(ids.len());

        for (index, id) in ids.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let item = match self.classify(&context, id).await {
                Ok(outcome) => BatchItem::Success {
                    screenshot_id: id.clone(),
                    matched_feature: outcome.matched_feature.map(|f| f.name),
                    classification: outcome.classification,
                },
                Err(e) => {
                    warn!(screenshot_id = %id, error = %e, "Screenshot classification failed");
                    BatchItem::Error {
                        screenshot_id: id.clone(),
                        error: e.to_string(),
                    }
                }
            };
            results.push(item);
        }

        let successful = results
            .iter()
            .filter(|item| matches!(item, BatchItem::Success { .. }))
            .count();
        let failed = results.len() - successful;

        info!(total = results.len(), successful, failed, "Batch classification complete");

        Ok(BatchReport {
            total: results.len(),
            successful,
            failed,
            results,
            message: None,
        })
    }
}
