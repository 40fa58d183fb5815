//! Household read queries

use anyhow::Result;
use sqlx::PgPool;

use super::contains_pattern;
use crate::types::{HouseholdListItem, HouseholdListRequest, Page};

const LIST_COLUMNS: &str = r#"
    h.id, h.household_key, h.address, h.latitude, h.longitude,
    h.is_debtor, h.total_debt, h.last_reading_date, h.created_at, h.updated_at,
    n.id AS neighborhood_id, n.name AS neighborhood_name,
    n.latitude AS neighborhood_latitude, n.longitude AS neighborhood_longitude
"#;

/// List households, newest first, optionally filtered by neighborhood name and debtor flag
pub async fn list_households(
    pool: &PgPool,
    request: &HouseholdListRequest,
) -> Result<(Vec<HouseholdListItem>, i64)> {
    let page = request.page.normalized();
    let pattern = request.neighborhood.as_deref().map(contains_pattern);

    let items = sqlx::query_as::<_, HouseholdListItem>(&format!(
        r#"
        SELECT {}
        FROM households h
        JOIN neighborhoods n ON n.id = h.neighborhood_id
        WHERE ($1::text IS NULL OR n.name ILIKE $1)
          AND ($2::boolean IS NULL OR h.is_debtor = $2)
        ORDER BY h.created_at DESC, h.id DESC
        LIMIT $3 OFFSET $4
        "#,
        LIST_COLUMNS
    ))
    .bind(&pattern)
    .bind(request.debtor)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM households h
        JOIN neighborhoods n ON n.id = h.neighborhood_id
        WHERE ($1::text IS NULL OR n.name ILIKE $1)
          AND ($2::boolean IS NULL OR h.is_debtor = $2)
        "#,
    )
    .bind(&pattern)
    .bind(request.debtor)
    .fetch_one(pool)
    .await?;

    Ok((items, total))
}

/// List debtor households, largest debt first
pub async fn list_debtors(pool: &PgPool, page: Page) -> Result<(Vec<HouseholdListItem>, i64)> {
    let page = page.normalized();

    let items = sqlx::query_as::<_, HouseholdListItem>(&format!(
        r#"
        SELECT {}
        FROM households h
        JOIN neighborhoods n ON n.id = h.neighborhood_id
        WHERE h.is_debtor = true
        ORDER BY h.total_debt DESC, h.id
        LIMIT $1 OFFSET $2
        "#,
        LIST_COLUMNS
    ))
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM households WHERE is_debtor = true")
        .fetch_one(pool)
        .await?;

    Ok((items, total))
}
