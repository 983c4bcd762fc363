//! Manual edits, matrix read model and export

mod helpers;

use exintel_common::db::{FeatureStatus, MarketType, UpdateSource};
use exintel_common::Error;
use exintel_server::db::update_logs;
use exintel_server::services::matrix_editor::{edit_cell, CellEdit};
use exintel_server::services::matrix_importer::import_spreadsheet;
use exintel_server::services::matrix_view::{load_export, load_matrix, render_csv};
use exintel_server::services::reconcile;
use exintel_server::services::reconciler::CellChange;
use helpers::{count, seed_category, seed_exchange, seed_feature, test_pool};

fn edit(exchange_id: &str, feature_id: &str) -> CellEdit {
    CellEdit {
        exchange_id: Some(exchange_id.to_string()),
        feature_id: Some(feature_id.to_string()),
        ..CellEdit::default()
    }
}

#[tokio::test]
async fn manual_edit_defaults_and_partial_updates() {
    let pool = test_pool().await;
    let exchange = seed_exchange(&pool, "Paribu", MarketType::Turkish).await;
    let category = seed_category(&pool, "Earn").await;
    let feature = seed_feature(&pool, "Locked Staking", &category.id).await;
    let mut conn = pool.acquire().await.unwrap();

    // Create with nothing but the key
    let created = edit_cell(&mut conn, &edit(&exchange.id, &feature.id)).await.unwrap();
    assert_eq!(created.cell.feature_status, FeatureStatus::Unknown);
    assert!(!created.cell.has_feature);

    // Notes only: status untouched, no audit entry
    let with_notes = edit_cell(
        &mut conn,
        &CellEdit {
            notes: Some("checked app".to_string()),
            ..edit(&exchange.id, &feature.id)
        },
    )
    .await
    .unwrap();
    assert_eq!(with_notes.cell.feature_status, FeatureStatus::Unknown);
    assert_eq!(with_notes.cell.notes.as_deref(), Some("checked app"));
    assert_eq!(update_logs::count_logs(&mut conn).await.unwrap(), 0);

    // hasFeature alone maps to a status and keeps the notes
    let flipped = edit_cell(
        &mut conn,
        &CellEdit {
            has_feature: Some(true),
            updated_by: Some("analyst".to_string()),
            ..edit(&exchange.id, &feature.id)
        },
    )
    .await
    .unwrap();
    assert_eq!(flipped.cell.feature_status, FeatureStatus::Available);
    assert!(flipped.cell.has_feature);
    assert_eq!(flipped.cell.notes.as_deref(), Some("checked app"));

    let logs = update_logs::list_logs_for_cell(&mut conn, &exchange.id, &feature.id)
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].update_source, UpdateSource::Manual);
    assert_eq!(logs[0].updated_by.as_deref(), Some("analyst"));
}

#[tokio::test]
async fn manual_edit_validates_keys() {
    let pool = test_pool().await;
    let exchange = seed_exchange(&pool, "Paribu", MarketType::Turkish).await;
    let mut conn = pool.acquire().await.unwrap();

    let missing = edit_cell(
        &mut conn,
        &CellEdit {
            exchange_id: Some(exchange.id.clone()),
            ..CellEdit::default()
        },
    )
    .await;
    assert!(matches!(missing, Err(Error::InvalidInput(_))));

    let unknown = edit_cell(&mut conn, &edit(&exchange.id, "no-such-feature")).await;
    assert!(matches!(unknown, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn has_feature_follows_status_through_every_write_path() {
    let pool = test_pool().await;
    let exchange = seed_exchange(&pool, "OKX", MarketType::Global).await;
    let category = seed_category(&pool, "Trading").await;
    let feature = seed_feature(&pool, "Convert", &category.id).await;

    {
        let mut conn = pool.acquire().await.unwrap();
        for status in FeatureStatus::ALL {
            reconcile(
                &mut conn,
                &CellChange {
                    exchange_id: &exchange.id,
                    feature_id: &feature.id,
                    status: *status,
                    notes: None,
                    source: UpdateSource::Manual,
                    updated_by: None,
                },
            )
            .await
            .unwrap();
        }
    }
    import_spreadsheet(
        &pool,
        b"competitor name,local/global,Convert,Copy Trading\nOKX,Global,BETA,soon\nKraken,Global,YOK,VAR\n",
    )
    .await
    .unwrap();

    let inconsistent: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM exchange_features
        WHERE has_feature != (feature_status IN ('available', 'beta'))
        "#,
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(inconsistent, 0);
    assert_eq!(count(&pool, "exchange_features").await, 4);
}

#[tokio::test]
async fn matrix_view_groups_cells_and_hides_empty_exchanges() {
    let pool = test_pool().await;
    import_spreadsheet(
        &pool,
        b"competitor name,local/global,Convert,Referral\nBinance,Global,VAR,YOK\nBtcTurk,TR,,VAR\n",
    )
    .await
    .unwrap();
    seed_exchange(&pool, "Empty Exchange", MarketType::Global).await;

    let mut conn = pool.acquire().await.unwrap();
    let view = load_matrix(&mut conn, None).await.unwrap();

    let names: Vec<_> = view.exchanges.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Binance", "BtcTurk"]);
    assert!(view.last_updated.is_none());

    let category_names: Vec<_> = view.categories.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(category_names, vec!["Trading", "Growth"]);

    // The blank BtcTurk cell is stored as unknown
    for exchange in &view.exchanges {
        assert_eq!(view.cells[&exchange.id].len(), 2);
    }

    let turkish = load_matrix(&mut conn, Some(MarketType::Turkish)).await.unwrap();
    assert_eq!(turkish.exchanges.len(), 1);
    assert_eq!(turkish.exchanges[0].name, "BtcTurk");
    assert_eq!(turkish.cells.len(), 1);
}

#[tokio::test]
async fn export_round_trips_through_import() {
    let pool = test_pool().await;
    let sheet = "competitor name,local/global,Convert,Referral\n\
                 Binance,Global,VAR,YOK\n\
                 BtcTurk,TR,,BETA\n";
    import_spreadsheet(&pool, sheet.as_bytes()).await.unwrap();
    seed_exchange(&pool, "Empty Exchange", MarketType::Turkish).await;

    let csv = {
        let mut conn = pool.acquire().await.unwrap();
        render_csv(&load_export(&mut conn, None).await.unwrap()).unwrap()
    };
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], r#""competitor name","local/global","convert","referral""#);
    assert_eq!(lines[1], r#""Binance","Global","VAR","YOK""#);
    assert_eq!(lines[2], r#""BtcTurk","TR","","VAR""#);
    assert_eq!(lines[3], r#""Empty Exchange","TR","","""#);

    // Beta exports as VAR, so only that cell moves on re-import; the empty
    // exchange gets its unknown cells
    let summary = import_spreadsheet(&pool, csv.as_bytes()).await.unwrap();
    assert_eq!(summary.cells_created, 2);
    assert_eq!(summary.cells_updated, 1);
}
