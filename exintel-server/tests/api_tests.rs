//! HTTP surface tests driven through the router with `oneshot`

mod helpers;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use exintel_common::db::MarketType;
use exintel_server::build_router;
use exintel_server::config::ServiceConfig;
use exintel_server::services::ai_client::ChatModel;
use helpers::{
    count, get, json_request, read_body, read_json, seed_category, seed_exchange, seed_feature,
    test_pool, test_state, MemoryStore, ScriptedModel,
};
use serde_json::json;
use sqlx::SqlitePool;
use tower::ServiceExt;

fn app(pool: &SqlitePool) -> axum::Router {
    build_router(test_state(
        pool.clone(),
        ServiceConfig::default(),
        None,
        MemoryStore::default(),
    ))
}

fn upload(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/matrix/import")
        .header("content-type", "text/csv")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_ai_state() {
    let pool = test_pool().await;
    let response = app(&pool).oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "exintel-server");
    assert_eq!(body["ai_configured"], false);
}

#[tokio::test]
async fn cell_edit_round_trip() {
    let pool = test_pool().await;
    let exchange = seed_exchange(&pool, "Binance", MarketType::Global).await;
    let category = seed_category(&pool, "Trading").await;
    let feature = seed_feature(&pool, "Convert", &category.id).await;

    let response = app(&pool)
        .oneshot(json_request(
            "PUT",
            "/api/matrix",
            &json!({
                "exchangeId": exchange.id,
                "featureId": feature.id,
                "featureStatus": "beta",
                "updatedBy": "analyst"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["featureStatus"], "beta");
    assert_eq!(body["hasFeature"], true);
    assert_eq!(body["statusChanged"], false);

    let response = app(&pool)
        .oneshot(json_request(
            "PUT",
            "/api/matrix",
            &json!({"exchangeId": exchange.id, "featureId": feature.id, "hasFeature": false}),
        ))
        .await
        .unwrap();
    let body = read_json(response).await;
    assert_eq!(body["featureStatus"], "not_available");
    assert_eq!(body["statusChanged"], true);

    let response = app(&pool).oneshot(get("/api/matrix")).await.unwrap();
    let body = read_json(response).await;
    assert_eq!(body["exchanges"][0]["name"], "Binance");
    assert_eq!(
        body["cells"][&exchange.id][&feature.id]["featureStatus"],
        "not_available"
    );
    assert!(body["lastUpdated"].is_string());

    let response = app(&pool)
        .oneshot(get(&format!("/api/matrix/history?exchangeId={}", exchange.id)))
        .await
        .unwrap();
    let body = read_json(response).await;
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["updateSource"], "manual");
    assert_eq!(entries[0]["exchangeName"], "Binance");
}

#[tokio::test]
async fn cell_edit_rejects_bad_keys() {
    let pool = test_pool().await;
    let exchange = seed_exchange(&pool, "Binance", MarketType::Global).await;

    let response = app(&pool)
        .oneshot(json_request("PUT", "/api/matrix", &json!({"exchangeId": exchange.id})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app(&pool)
        .oneshot(json_request(
            "PUT",
            "/api/matrix",
            &json!({"exchangeId": exchange.id, "featureId": "missing"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn import_accepts_raw_body_and_reports_validation_errors() {
    let pool = test_pool().await;

    let response = app(&pool)
        .oneshot(upload("competitor name,local/global,Convert\nBinance,Global,VAR\n"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["cellsCreated"], 1);

    let response = app(&pool)
        .oneshot(upload("exchange,Convert\nBinance,VAR\n"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);

    let response = app(&pool).oneshot(upload("")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["errors"][0], "No file uploaded");

    assert_eq!(count(&pool, "exchanges").await, 1);
}

#[tokio::test]
async fn import_accepts_multipart_file_field() {
    let pool = test_pool().await;
    let boundary = "exintel-boundary";
    let body = format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"matrix.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         competitor name,local/global,Convert\nParibu,TR,YOK\n\r\n\
         --{b}--\r\n",
        b = boundary
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/matrix/import")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app(&pool).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["exchangesCreated"], 1);
}

#[tokio::test]
async fn export_serves_csv_attachment() {
    let pool = test_pool().await;
    app(&pool)
        .oneshot(upload("competitor name,local/global,Convert\nBinance,Global,VAR\n"))
        .await
        .unwrap();

    let response = app(&pool).oneshot(get("/api/matrix/export")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"feature-matrix-"));
    assert!(disposition.ends_with(".csv\""));

    let csv = String::from_utf8(read_body(response).await).unwrap();
    assert_eq!(
        csv,
        "\"competitor name\",\"local/global\",\"convert\"\n\"Binance\",\"Global\",\"VAR\"\n"
    );

    let response = app(&pool)
        .oneshot(get("/api/matrix/export?format=json&marketType=turkish"))
        .await
        .unwrap();
    let body = read_json(response).await;
    assert_eq!(body["exchanges"].as_array().unwrap().len(), 0);
    assert_eq!(body["features"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn resolve_endpoint_applies_and_skips() {
    let pool = test_pool().await;
    let exchange = seed_exchange(&pool, "Binance", MarketType::Global).await;
    let category = seed_category(&pool, "Trading").await;
    let feature = seed_feature(&pool, "Convert", &category.id).await;

    let response = app(&pool)
        .oneshot(json_request(
            "POST",
            "/api/suggestions",
            &json!({
                "exchangeId": exchange.id,
                "featureId": feature.id,
                "suggestedStatus": "available",
                "aiConfidence": 0.75
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let suggestion_id = read_json(response).await["id"].as_str().unwrap().to_string();

    let response = app(&pool).oneshot(get("/api/suggestions/pending")).await.unwrap();
    assert_eq!(read_json(response).await["pendingCount"], 1);

    let response = app(&pool)
        .oneshot(json_request(
            "POST",
            "/api/suggestions/resolve",
            &json!({"suggestionIds": [suggestion_id, "ghost"], "action": "approve"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["results"][0]["status"], "approved");
    assert_eq!(body["results"][1]["status"], "skipped");

    let response = app(&pool)
        .oneshot(get("/api/suggestions?status=approved"))
        .await
        .unwrap();
    let body = read_json(response).await;
    assert_eq!(body[0]["reviewedBy"], ServiceConfig::default().reviewer);

    let response = app(&pool)
        .oneshot(json_request(
            "POST",
            "/api/suggestions/resolve",
            &json!({"suggestionIds": [], "action": "reject"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app(&pool)
        .oneshot(get("/api/suggestions?status=done"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ai_endpoints_need_a_model() {
    let pool = test_pool().await;

    let response = app(&pool)
        .oneshot(json_request("POST", "/api/classify", &json!({"screenshotId": "x"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app(&pool)
        .oneshot(json_request("POST", "/api/classify", &json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn classify_endpoint_maps_failures() {
    let pool = test_pool().await;
    let exchange = seed_exchange(&pool, "Binance", MarketType::Global).await;
    let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel::answering(&["not json"]));
    let store = MemoryStore::default().with("screenshots/Binance/a.png", b"png");
    let router = build_router(test_state(
        pool.clone(),
        ServiceConfig::default(),
        Some(model),
        store,
    ));

    let response = router
        .clone()
        .oneshot(json_request("POST", "/api/classify", &json!({"screenshotId": "nope"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/screenshots",
            &json!({"exchangeId": exchange.id, "storageKey": "screenshots/Binance/a.png"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let id = read_json(response).await["id"].as_str().unwrap().to_string();

    let response = router
        .oneshot(json_request("POST", "/api/classify", &json!({"screenshotId": id})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn cron_requires_configured_secret() {
    let pool = test_pool().await;
    seed_exchange(&pool, "Binance", MarketType::Global).await;

    // No secret configured: disabled
    let response = app(&pool)
        .oneshot(get("/api/cron/update-matrix"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let config = ServiceConfig {
        cron_secret: Some("s3cret".to_string()),
        ..ServiceConfig::default()
    };
    let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel::answering(&[r#"{"updates": []}"#]));
    let router = build_router(test_state(
        pool.clone(),
        config,
        Some(model),
        MemoryStore::default(),
    ));

    let wrong = Request::builder()
        .method("POST")
        .uri("/api/cron/update-matrix")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(wrong).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let right = Request::builder()
        .method("POST")
        .uri("/api/cron/update-matrix")
        .header(header::AUTHORIZATION, "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(right).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["results"][0]["exchange"], "Binance");
    assert_eq!(body["results"][0]["suggestionsCreated"], 0);
}

#[tokio::test]
async fn exchange_and_feature_crud() {
    let pool = test_pool().await;

    let response = app(&pool)
        .oneshot(json_request(
            "POST",
            "/api/exchanges",
            &json!({"name": "BtcTurk", "marketType": "turkish"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let exchange_id = read_json(response).await["id"].as_str().unwrap().to_string();

    let response = app(&pool)
        .oneshot(json_request(
            "POST",
            "/api/exchanges",
            &json!({"name": "btcturk", "marketType": "global"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app(&pool)
        .oneshot(get(&format!("/api/exchanges/{}", exchange_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["marketType"], "turkish");
    assert_eq!(body["features"].as_array().unwrap().len(), 0);

    let response = app(&pool).oneshot(get("/api/exchanges/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app(&pool)
        .oneshot(json_request("POST", "/api/categories", &json!({"name": "Earn"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let category_id = read_json(response).await["id"].as_str().unwrap().to_string();

    let feature = json!({"name": "Flexible Staking", "categoryId": category_id});
    let response = app(&pool)
        .oneshot(json_request("POST", "/api/features", &feature))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(read_json(response).await["slug"], "flexible-staking");

    let response = app(&pool)
        .oneshot(json_request("POST", "/api/features", &feature))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app(&pool)
        .oneshot(json_request(
            "POST",
            "/api/features",
            &json!({"name": "Orphan", "categoryId": "missing"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app(&pool)
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/exchanges/{}", exchange_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["success"], true);
    assert_eq!(count(&pool, "exchanges").await, 0);
}

#[tokio::test]
async fn ingest_creates_exchange_from_folder() {
    let pool = test_pool().await;

    let response = app(&pool)
        .oneshot(json_request(
            "POST",
            "/api/screenshots/ingest",
            &json!({"storageKey": "screenshots/Kraken/KYC/step1.png"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["exchangeCreated"], true);
    assert_eq!(body["screenshot"]["storageKey"], "screenshots/Kraken/KYC/step1.png");

    let response = app(&pool)
        .oneshot(json_request(
            "POST",
            "/api/screenshots/ingest",
            &json!({"storageKey": "screenshots/kraken/home.png"}),
        ))
        .await
        .unwrap();
    assert_eq!(read_json(response).await["exchangeCreated"], false);
    assert_eq!(count(&pool, "exchanges").await, 1);

    let response = app(&pool)
        .oneshot(json_request(
            "POST",
            "/api/screenshots/ingest",
            &json!({"storageKey": "uploads/loose.png"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stats_summarise_the_store() {
    let pool = test_pool().await;
    app(&pool)
        .oneshot(upload(
            "competitor name,local/global,Convert,Referral\nBinance,Global,VAR,YOK\nParibu,TR,,VAR\n",
        ))
        .await
        .unwrap();
    // A later sheet with a new column only covers Binance
    app(&pool)
        .oneshot(upload("competitor name,local/global,Launchpad\nBinance,Global,BETA\n"))
        .await
        .unwrap();

    let response = app(&pool).oneshot(get("/api/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["totalExchanges"], 2);
    assert_eq!(body["turkishExchanges"], 1);
    assert_eq!(body["totalFeatures"], 3);
    assert_eq!(body["totalCells"], 5);
    assert_eq!(body["availableCells"], 3);
    assert_eq!(body["coveragePercentage"], 83);
}
