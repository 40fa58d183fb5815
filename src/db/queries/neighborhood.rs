//! Neighborhood read queries

use anyhow::Result;
use sqlx::PgPool;

use super::contains_pattern;
use crate::types::{
    average_consumption, HouseholdSummary, Neighborhood, NeighborhoodDetail, NeighborhoodListItem, Page,
};

/// List neighborhoods by name with household counts
pub async fn list_neighborhoods(
    pool: &PgPool,
    search: Option<&str>,
    page: Page,
) -> Result<(Vec<NeighborhoodListItem>, i64)> {
    let page = page.normalized();
    let pattern = search.map(contains_pattern);

    let mut items = sqlx::query_as::<_, NeighborhoodListItem>(
        r#"
        SELECT
            n.id, n.name, n.latitude, n.longitude, n.total_consumption, n.total_debt,
            n.created_at, n.updated_at,
            COUNT(h.id) AS household_count
        FROM neighborhoods n
        LEFT JOIN households h ON h.neighborhood_id = n.id
        WHERE ($1::text IS NULL OR n.name ILIKE $1)
        GROUP BY n.id
        ORDER BY n.name ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(&pattern)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    for item in &mut items {
        item.average_consumption = average_consumption(item.total_consumption, item.household_count);
    }

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM neighborhoods WHERE ($1::text IS NULL OR name ILIKE $1)",
    )
    .bind(&pattern)
    .fetch_one(pool)
    .await?;

    Ok((items, total))
}

/// Get one neighborhood with its households ordered by address
pub async fn get_neighborhood_detail(pool: &PgPool, id: i64) -> Result<Option<NeighborhoodDetail>> {
    let neighborhood = sqlx::query_as::<_, Neighborhood>(
        r#"
        SELECT id, name, latitude, longitude, total_consumption, total_debt, created_at, updated_at
        FROM neighborhoods
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(neighborhood) = neighborhood else {
        return Ok(None);
    };

    let households = sqlx::query_as::<_, HouseholdSummary>(
        r#"
        SELECT id, household_key, address, latitude, longitude, is_debtor, total_debt, last_reading_date
        FROM households
        WHERE neighborhood_id = $1
        ORDER BY address ASC, id
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let household_count = households.len() as i64;
    let debtor_count = households.iter().filter(|h| h.is_debtor).count() as i64;
    let average_consumption = average_consumption(neighborhood.total_consumption, household_count);

    Ok(Some(NeighborhoodDetail {
        neighborhood,
        households,
        household_count,
        debtor_count,
        average_consumption,
    }))
}
