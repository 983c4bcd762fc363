//! Feature category persistence

use exintel_common::db::FeatureCategory;
use exintel_common::{time, uuid_utils, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

pub(crate) fn category_from_row(row: &SqliteRow) -> Result<FeatureCategory> {
    Ok(FeatureCategory {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        icon: row.try_get("icon")?,
        sort_order: row.try_get("sort_order")?,
    })
}

/// All categories in display order
pub async fn list_categories(conn: &mut SqliteConnection) -> Result<Vec<FeatureCategory>> {
    let rows = sqlx::query(
        "SELECT id, name, icon, sort_order FROM feature_categories ORDER BY sort_order, name",
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(category_from_row).collect()
}

/// Load category by id
pub async fn get_category(conn: &mut SqliteConnection, id: &str) -> Result<Option<FeatureCategory>> {
    let row = sqlx::query("SELECT id, name, icon, sort_order FROM feature_categories WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(category_from_row).transpose()
}

/// Load category by exact name
pub async fn find_category_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<FeatureCategory>> {
    let row = sqlx::query("SELECT id, name, icon, sort_order FROM feature_categories WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(category_from_row).transpose()
}

/// Next free sort position (`max + 1`, or 1 for an empty table)
pub async fn next_sort_order(conn: &mut SqliteConnection) -> Result<i64> {
    let max: Option<i64> = sqlx::query_scalar("SELECT MAX(sort_order) FROM feature_categories")
        .fetch_one(&mut *conn)
        .await?;

    Ok(max.unwrap_or(0) + 1)
}

/// Insert a category
///
/// A duplicate name fails with `Error::Conflict`.
pub async fn insert_category(
    conn: &mut SqliteConnection,
    name: &str,
    icon: Option<&str>,
    sort_order: i64,
) -> Result<FeatureCategory> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("category name is required".to_string()));
    }

    let category = FeatureCategory {
        id: uuid_utils::new_id(),
        name: name.to_string(),
        icon: icon.map(str::to_string),
        sort_order,
    };

    let result = sqlx::query(
        r#"
        INSERT INTO feature_categories (id, name, icon, sort_order, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&category.id)
    .bind(&category.name)
    .bind(&category.icon)
    .bind(category.sort_order)
    .bind(time::to_db(&time::now()))
    .execute(&mut *conn)
    .await;

    match result.map_err(Error::from) {
        Ok(_) => Ok(category),
        Err(e) if e.is_unique_violation() => Err(Error::Conflict(format!(
            "category '{}' already exists",
            category.name
        ))),
        Err(e) => Err(e),
    }
}

/// Find a category by exact name, creating it when absent
///
/// Returns the category and whether this call created it.
pub async fn find_or_create_category(
    conn: &mut SqliteConnection,
    name: &str,
    icon: Option<&str>,
    sort_order: Option<i64>,
) -> Result<(FeatureCategory, bool)> {
    if let Some(existing) = find_category_by_name(conn, name).await? {
        return Ok((existing, false));
    }

    let sort_order = match sort_order {
        Some(order) => order,
        None => next_sort_order(conn).await?,
    };

    match insert_category(conn, name, icon, sort_order).await {
        Ok(category) => Ok((category, true)),
        Err(Error::Conflict(_)) => {
            let existing = find_category_by_name(conn, name)
                .await?
                .ok_or_else(|| Error::Internal(format!("category '{}' vanished", name)))?;
            Ok((existing, false))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exintel_common::db::init_memory_database;

    #[tokio::test]
    async fn test_find_or_create_category_once() {
        let pool = init_memory_database().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let (trading, created) = find_or_create_category(&mut conn, "Trading", Some("candlestick-chart"), Some(3))
            .await
            .unwrap();
        assert!(created);
        assert_eq!(trading.sort_order, 3);

        let (again, created) = find_or_create_category(&mut conn, "Trading", None, None)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.id, trading.id);
        assert_eq!(again.icon.as_deref(), Some("candlestick-chart"));
    }

    #[tokio::test]
    async fn test_unknown_category_sorts_last() {
        let pool = init_memory_database().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        find_or_create_category(&mut conn, "Products", None, Some(7)).await.unwrap();
        let (custom, _) = find_or_create_category(&mut conn, "Custom", None, None).await.unwrap();

        assert_eq!(custom.sort_order, 8);

        let names: Vec<String> = list_categories(&mut conn)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Products", "Custom"]);
    }
}
