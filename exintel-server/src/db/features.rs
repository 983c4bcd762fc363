//! Feature persistence
//!
//! Features are matched on `slug`; the slug is derived once from the name at
//! creation and never changes afterwards.

use exintel_common::db::Feature;
use exintel_common::naming::slugify;
use exintel_common::{time, uuid_utils, Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

/// Fields accepted when creating a feature
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFeature {
    pub name: String,
    pub category_id: String,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update; the slug is not updatable
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturePatch {
    pub name: Option<String>,
    pub category_id: Option<String>,
    pub sort_order: Option<i64>,
    pub description: Option<String>,
}

/// Feature with its category name and number of exchanges offering it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSummary {
    #[serde(flatten)]
    pub feature: Feature,
    pub category_name: String,
    pub available_count: i64,
}

const SELECT_FEATURE: &str = r#"
    SELECT id, name, slug, category_id, sort_order, description
    FROM features
"#;

pub(crate) fn feature_from_row(row: &SqliteRow) -> Result<Feature> {
    Ok(Feature {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        category_id: row.try_get("category_id")?,
        sort_order: row.try_get("sort_order")?,
        description: row.try_get("description")?,
    })
}

/// Insert a feature, deriving its slug from the name
///
/// A slug collision fails with `Error::Conflict`; a name that slugifies to
/// nothing is rejected.
pub async fn insert_feature(conn: &mut SqliteConnection, new: &NewFeature) -> Result<Feature> {
    let name = new.name.trim();
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(Error::InvalidInput(format!(
            "feature name '{}' has no alphanumeric characters",
            new.name
        )));
    }

    let now = time::to_db(&time::now());
    let feature = Feature {
        id: uuid_utils::new_id(),
        name: name.to_string(),
        slug,
        category_id: new.category_id.clone(),
        sort_order: new.sort_order,
        description: new.description.clone(),
    };

    let result = sqlx::query(
        r#"
        INSERT INTO features (id, name, slug, category_id, sort_order, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&feature.id)
    .bind(&feature.name)
    .bind(&feature.slug)
    .bind(&feature.category_id)
    .bind(feature.sort_order)
    .bind(&feature.description)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await;

    match result.map_err(Error::from) {
        Ok(_) => Ok(feature),
        Err(e) if e.is_unique_violation() => Err(Error::Conflict(format!(
            "feature with slug '{}' already exists",
            feature.slug
        ))),
        Err(e) => Err(e),
    }
}

/// Load feature by id
pub async fn get_feature(conn: &mut SqliteConnection, id: &str) -> Result<Option<Feature>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_FEATURE))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(feature_from_row).transpose()
}

/// Load feature by slug
pub async fn find_feature_by_slug(conn: &mut SqliteConnection, slug: &str) -> Result<Option<Feature>> {
    let row = sqlx::query(&format!("{} WHERE slug = ?", SELECT_FEATURE))
        .bind(slug)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(feature_from_row).transpose()
}

/// Find a feature by the slug of `name`, creating it when absent
///
/// Returns the feature and whether this call created it. An existing feature
/// keeps its name, category and sort order.
pub async fn find_or_create_feature(
    conn: &mut SqliteConnection,
    new: &NewFeature,
) -> Result<(Feature, bool)> {
    let slug = slugify(&new.name);
    if let Some(existing) = find_feature_by_slug(conn, &slug).await? {
        return Ok((existing, false));
    }

    match insert_feature(conn, new).await {
        Ok(feature) => Ok((feature, true)),
        Err(Error::Conflict(_)) => {
            let existing = find_feature_by_slug(conn, &slug)
                .await?
                .ok_or_else(|| Error::Internal(format!("feature '{}' vanished", slug)))?;
            Ok((existing, false))
        }
        Err(e) => Err(e),
    }
}

/// All features ordered by category then feature sort order
pub async fn list_features(conn: &mut SqliteConnection) -> Result<Vec<Feature>> {
    let rows = sqlx::query(
        r#"
        SELECT f.id, f.name, f.slug, f.category_id, f.sort_order, f.description
        FROM features f
        JOIN feature_categories c ON c.id = f.category_id
        ORDER BY c.sort_order, c.name, f.sort_order, f.name
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(feature_from_row).collect()
}

/// Feature list with availability counts, optionally limited to one category
pub async fn list_feature_summaries(
    conn: &mut SqliteConnection,
    category_id: Option<&str>,
) -> Result<Vec<FeatureSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT f.id, f.name, f.slug, f.category_id, f.sort_order, f.description,
               c.name AS category_name,
               (SELECT COUNT(*) FROM exchange_features ef
                 WHERE ef.feature_id = f.id AND ef.has_feature = 1) AS available_count
        FROM features f
        JOIN feature_categories c ON c.id = f.category_id
        WHERE (? IS NULL OR f.category_id = ?)
        ORDER BY c.sort_order, c.name, f.sort_order, f.name
        "#,
    )
    .bind(category_id)
    .bind(category_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(FeatureSummary {
                feature: feature_from_row(row)?,
                category_name: row.try_get("category_name")?,
                available_count: row.try_get("available_count")?,
            })
        })
        .collect()
}

/// Apply a partial update
pub async fn update_feature(
    conn: &mut SqliteConnection,
    id: &str,
    patch: &FeaturePatch,
) -> Result<Option<Feature>> {
    let Some(mut feature) = get_feature(conn, id).await? else {
        return Ok(None);
    };

    if let Some(name) = &patch.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("feature name cannot be empty".to_string()));
        }
        feature.name = name.to_string();
    }
    if let Some(category_id) = &patch.category_id {
        feature.category_id = category_id.clone();
    }
    if let Some(sort_order) = patch.sort_order {
        feature.sort_order = sort_order;
    }
    if patch.description.is_some() {
        feature.description = patch.description.clone();
    }

    sqlx::query(
        r#"
        UPDATE features SET name = ?, category_id = ?, sort_order = ?, description = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&feature.name)
    .bind(&feature.category_id)
    .bind(feature.sort_order)
    .bind(&feature.description)
    .bind(time::to_db(&time::now()))
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(Some(feature))
}

/// Delete feature; its cells, logs and suggestions cascade
pub async fn delete_feature(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM features WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}
