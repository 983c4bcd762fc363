//! Screenshot classification with a scripted model and in-memory blobs

mod helpers;

use std::time::Duration;

use exintel_common::db::MarketType;
use exintel_server::db::screenshots::{self, NewScreenshot};
use exintel_server::services::classification::{
    BatchItem, BatchSelection, ClassificationContext, Classifier, ClassifyError,
};
use helpers::{seed_category, seed_exchange, seed_feature, test_pool, MemoryStore, ScriptedModel};
use sqlx::SqlitePool;

const KYC_ANSWER: &str = r#"```json
{"category": "Onboarding", "feature": "kyc verification", "confidence": 0.92,
 "description": "Identity check form", "ui_elements": ["camera button"]}
```"#;

async fn register(pool: &SqlitePool, exchange_id: &str, key: &str) -> String {
    let mut conn = pool.acquire().await.unwrap();
    screenshots::insert_screenshot(
        &mut conn,
        &NewScreenshot {
            exchange_id: exchange_id.to_string(),
            storage_key: key.to_string(),
            feature_id: None,
            category_id: None,
            notes: None,
        },
    )
    .await
    .unwrap()
    .id
}

#[tokio::test]
async fn classify_persists_output_and_matches_feature() {
    let pool = test_pool().await;
    let exchange = seed_exchange(&pool, "Binance", MarketType::Global).await;
    let category = seed_category(&pool, "Onboarding").await;
    let feature = seed_feature(&pool, "KYC Verification", &category.id).await;
    let key = "screenshots/Binance/KYC/Step 1/front.png";
    let id = register(&pool, &exchange.id, key).await;

    let model = ScriptedModel::answering(&[KYC_ANSWER]);
    let store = MemoryStore::default().with(key, b"\x89PNG\r\n\x1a\nrest");
    let classifier = Classifier {
        pool: &pool,
        model: &model,
        store: &store,
        vision_model: "vision-test",
    };
    let context = ClassificationContext::load(&pool).await.unwrap();

    let outcome = classifier.classify(&context, &id).await.unwrap();

    assert_eq!(outcome.classification.feature, "kyc verification");
    assert_eq!(outcome.matched_feature.as_ref().map(|f| f.id.as_str()), Some(feature.id.as_str()));
    assert_eq!(outcome.screenshot.feature_id.as_deref(), Some(feature.id.as_str()));
    assert_eq!(outcome.screenshot.category_id.as_deref(), Some(category.id.as_str()));

    let requests = model.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, "vision-test");
    assert!(requests[0].user_text.contains("KYC Verification"));
    assert!(requests[0].user_text.contains("KYC/Step 1"));
    assert!(requests[0]
        .image_data_url
        .as_deref()
        .is_some_and(|url| url.starts_with("data:image/png;base64,")));
    drop(requests);

    let mut conn = pool.acquire().await.unwrap();
    let stored = screenshots::get_screenshot(&mut conn, &id).await.unwrap().unwrap();
    assert_eq!(stored.ai_confidence, Some(0.92));
    assert!(stored.classified_at.is_some());
    assert_eq!(stored.feature_id.as_deref(), Some(feature.id.as_str()));
    let raw = stored.ai_classification.unwrap();
    assert_eq!(raw["category"], "Onboarding");
}

#[tokio::test]
async fn unmatched_feature_is_stored_without_tags() {
    let pool = test_pool().await;
    let exchange = seed_exchange(&pool, "OKX", MarketType::Global).await;
    let key = "screenshots/OKX/home.jpg";
    let id = register(&pool, &exchange.id, key).await;

    let model = ScriptedModel::answering(&[
        r#"{"category": "Products", "feature": "Something New", "confidence": 0.4}"#,
    ]);
    let store = MemoryStore::default().with(key, b"\xff\xd8\xffjpeg");
    let classifier = Classifier {
        pool: &pool,
        model: &model,
        store: &store,
        vision_model: "vision-test",
    };
    let context = ClassificationContext::load(&pool).await.unwrap();

    let outcome = classifier.classify(&context, &id).await.unwrap();
    assert!(outcome.matched_feature.is_none());
    assert!(outcome.screenshot.feature_id.is_none());
    assert_eq!(outcome.screenshot.ai_confidence, Some(0.4));
}

#[tokio::test]
async fn invalid_model_output_leaves_screenshot_untouched() {
    let pool = test_pool().await;
    let exchange = seed_exchange(&pool, "OKX", MarketType::Global).await;
    let key = "screenshots/OKX/home.png";
    let id = register(&pool, &exchange.id, key).await;

    let model = ScriptedModel::answering(&[r#"{"category": "Products", "confidence": 2.0}"#]);
    let store = MemoryStore::default().with(key, b"png");
    let classifier = Classifier {
        pool: &pool,
        model: &model,
        store: &store,
        vision_model: "vision-test",
    };
    let context = ClassificationContext::load(&pool).await.unwrap();

    let result = classifier.classify(&context, &id).await;
    assert!(matches!(result, Err(ClassifyError::Parse(_))));

    let missing = classifier.classify(&context, "no-such-id").await;
    assert!(matches!(missing, Err(ClassifyError::ScreenshotNotFound(_))));

    let mut conn = pool.acquire().await.unwrap();
    let stored = screenshots::get_screenshot(&mut conn, &id).await.unwrap().unwrap();
    assert!(stored.ai_classification.is_none());
    assert!(stored.classified_at.is_none());
}

#[tokio::test]
async fn batch_isolates_failures() {
    let pool = test_pool().await;
    let exchange = seed_exchange(&pool, "Binance", MarketType::Global).await;
    let category = seed_category(&pool, "Onboarding").await;
    seed_feature(&pool, "KYC Verification", &category.id).await;

    let first = register(&pool, &exchange.id, "screenshots/Binance/a.png").await;
    let lost = register(&pool, &exchange.id, "screenshots/Binance/lost.png").await;
    let third = register(&pool, &exchange.id, "screenshots/Binance/c.png").await;

    let model = ScriptedModel::answering(&[KYC_ANSWER, KYC_ANSWER]);
    let store = MemoryStore::default()
        .with("screenshots/Binance/a.png", b"png")
        .with("screenshots/Binance/c.png", b"png");
    let classifier = Classifier {
        pool: &pool,
        model: &model,
        store: &store,
        vision_model: "vision-test",
    };

    let report = classifier
        .classify_batch(
            BatchSelection::Ids(vec![first.clone(), lost.clone(), third.clone()]),
            Duration::ZERO,
        )
        .await
        .unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.successful, 2);
    assert_eq!(report.failed, 1);
    match &report.results[1] {
        BatchItem::Error { screenshot_id, .. } => assert_eq!(screenshot_id, &lost),
        other => panic!("expected error item, got {:?}", other),
    }
    match &report.results[2] {
        BatchItem::Success {
            screenshot_id,
            matched_feature,
            ..
        } => {
            assert_eq!(screenshot_id, &third);
            assert_eq!(matched_feature.as_deref(), Some("KYC Verification"));
        }
        other => panic!("expected success item, got {:?}", other),
    }
    // The missing blob never reached the model
    assert_eq!(model.request_count(), 2);
}

#[tokio::test]
async fn batch_without_ids_takes_oldest_unclassified() {
    let pool = test_pool().await;
    let exchange = seed_exchange(&pool, "Binance", MarketType::Global).await;
    let model = ScriptedModel::answering(&[KYC_ANSWER]);
    let store = MemoryStore::default().with("screenshots/Binance/a.png", b"png");
    let classifier = Classifier {
        pool: &pool,
        model: &model,
        store: &store,
        vision_model: "vision-test",
    };

    let empty = classifier
        .classify_batch(BatchSelection::OldestUnclassified(10), Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(empty.total, 0);
    assert_eq!(empty.message.as_deref(), Some("No unclassified screenshots found"));

    register(&pool, &exchange.id, "screenshots/Binance/a.png").await;
    let report = classifier
        .classify_batch(BatchSelection::OldestUnclassified(10), Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(report.successful, 1);

    // Once classified it is no longer picked up
    let again = classifier
        .classify_batch(BatchSelection::OldestUnclassified(10), Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(again.total, 0);
}
