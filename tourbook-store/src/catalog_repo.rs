use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use tourbook_core::catalog::{Category, NewCategory, NewTour, Tour, TourFilter};
use tourbook_core::repository::{CategoryRepository, TourRepository};
use tourbook_core::{CoreError, CoreResult};

use crate::db_error::map_db_err;

pub struct StoreTourRepository {
    pool: PgPool,
}

impl StoreTourRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const TOUR_SELECT: &str = r#"
    SELECT t.id, t.vendor_id, t.abstract, t.description, t.activity_type, t.activity_type_label,
           t.is_online, t.booked_in_24_hours, t.is_reserve_now_pay_later, t.created_at, t.updated_at,
           COALESCE(ARRAY_AGG(DISTINCT c.name) FILTER (WHERE c.name IS NOT NULL), '{}') AS categories
    FROM tours t
    LEFT JOIN tour_categories tc ON tc.tour_id = t.id
    LEFT JOIN categories c ON c.id = tc.category_id
"#;

#[derive(sqlx::FromRow)]
struct TourRow {
    id: i64,
    vendor_id: Option<i64>,
    #[sqlx(rename = "abstract")]
    summary: String,
    description: String,
    activity_type: String,
    activity_type_label: Option<String>,
    is_online: bool,
    booked_in_24_hours: i32,
    is_reserve_now_pay_later: bool,
    categories: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TourRow> for Tour {
    fn from(row: TourRow) -> Self {
        Tour {
            id: row.id,
            vendor_id: row.vendor_id,
            summary: row.summary,
            description: row.description,
            activity_type: row.activity_type,
            activity_type_label: row.activity_type_label,
            is_online: row.is_online,
            booked_in_24_hours: row.booked_in_24_hours,
            is_reserve_now_pay_later: row.is_reserve_now_pay_later,
            categories: row.categories,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

async fn fetch_tour<'e, E: PgExecutor<'e>>(executor: E, id: i64) -> Result<Option<TourRow>, sqlx::Error> {
    let sql = format!("{} WHERE t.id = $1 GROUP BY t.id", TOUR_SELECT);
    sqlx::query_as::<_, TourRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
}

async fn link_categories(
    conn: &mut sqlx::PgConnection,
    tour_id: i64,
    category_ids: &[i64],
) -> Result<(), sqlx::Error> {
    if category_ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        "INSERT INTO tour_categories (tour_id, category_id) SELECT $1, UNNEST($2::BIGINT[]) ON CONFLICT DO NOTHING",
    )
    .bind(tour_id)
    .bind(category_ids)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl TourRepository for StoreTourRepository {
    async fn list_tours(&self, filter: &TourFilter) -> CoreResult<Vec<Tour>> {
        let mut qb = QueryBuilder::<Postgres>::new(TOUR_SELECT);
        qb.push(" WHERE 1 = 1");
        if let Some(category) = &filter.category {
            qb.push(
                " AND EXISTS (SELECT 1 FROM tour_categories tc2 JOIN categories c2 ON c2.id = tc2.category_id \
                 WHERE tc2.tour_id = t.id AND c2.name ILIKE ",
            )
            .push_bind(format!("%{}%", category))
            .push(")");
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{}%", search);
            qb.push(" AND (t.abstract ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR t.description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(vendor_id) = filter.vendor_id {
            qb.push(" AND t.vendor_id = ").push_bind(vendor_id);
        }
        qb.push(" GROUP BY t.id ORDER BY t.created_at DESC, t.id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let rows = qb
            .build_query_as::<TourRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(rows.into_iter().map(Tour::from).collect())
    }

    async fn get_tour(&self, id: i64) -> CoreResult<Option<Tour>> {
        let row = fetch_tour(&self.pool, id).await.map_err(map_db_err)?;
        Ok(row.map(Tour::from))
    }

    async fn create_tour(&self, tour: &NewTour) -> CoreResult<Tour> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO tours (vendor_id, abstract, description, activity_type, activity_type_label,
                               is_online, booked_in_24_hours, is_reserve_now_pay_later)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(tour.vendor_id)
        .bind(&tour.summary)
        .bind(&tour.description)
        .bind(&tour.activity_type)
        .bind(&tour.activity_type_label)
        .bind(tour.is_online)
        .bind(tour.booked_in_24_hours)
        .bind(tour.is_reserve_now_pay_later)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_err)?;

        link_categories(&mut tx, id, &tour.category_ids).await.map_err(map_db_err)?;

        let row = fetch_tour(&mut *tx, id)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| CoreError::StoreError(format!("tour {} vanished after insert", id)))?;
        tx.commit().await.map_err(map_db_err)?;
        Ok(row.into())
    }

    async fn update_tour(&self, id: i64, tour: &NewTour) -> CoreResult<Tour> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        let updated = sqlx::query(
            r#"
            UPDATE tours
            SET vendor_id = $1, abstract = $2, description = $3, activity_type = $4,
                activity_type_label = $5, is_online = $6, booked_in_24_hours = $7,
                is_reserve_now_pay_later = $8, updated_at = NOW()
            WHERE id = $9
            "#,
        )
        .bind(tour.vendor_id)
        .bind(&tour.summary)
        .bind(&tour.description)
        .bind(&tour.activity_type)
        .bind(&tour.activity_type_label)
        .bind(tour.is_online)
        .bind(tour.booked_in_24_hours)
        .bind(tour.is_reserve_now_pay_later)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        if updated.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Tour {}", id)));
        }

        sqlx::query("DELETE FROM tour_categories WHERE tour_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        link_categories(&mut tx, id, &tour.category_ids).await.map_err(map_db_err)?;

        let row = fetch_tour(&mut *tx, id)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| CoreError::NotFound(format!("Tour {}", id)))?;
        tx.commit().await.map_err(map_db_err)?;
        Ok(row.into())
    }

    async fn delete_tour(&self, id: i64) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM tours WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Tour {}", id)));
        }
        Ok(())
    }
}

pub struct StoreCategoryRepository {
    pool: PgPool,
}

impl StoreCategoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    name: String,
    code: String,
    is_primary: bool,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category { id: row.id, name: row.name, code: row.code, is_primary: row.is_primary }
    }
}

#[async_trait]
impl CategoryRepository for StoreCategoryRepository {
    async fn list_categories(&self) -> CoreResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, code, is_primary FROM categories ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn get_category(&self, id: i64) -> CoreResult<Option<Category>> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, code, is_primary FROM categories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(row.map(Category::from))
    }

    async fn create_category(&self, category: &NewCategory) -> CoreResult<Category> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "INSERT INTO categories (name, code, is_primary) VALUES ($1, $2, $3) RETURNING id, name, code, is_primary",
        )
        .bind(&category.name)
        .bind(&category.code)
        .bind(category.is_primary)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(row.into())
    }

    async fn update_category(&self, id: i64, category: &NewCategory) -> CoreResult<Category> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "UPDATE categories SET name = $1, code = $2, is_primary = $3 WHERE id = $4 RETURNING id, name, code, is_primary",
        )
        .bind(&category.name)
        .bind(&category.code)
        .bind(category.is_primary)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        row.map(Category::from)
            .ok_or_else(|| CoreError::NotFound(format!("Category {}", id)))
    }

    async fn delete_category(&self, id: i64) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Category {}", id)));
        }
        Ok(())
    }
}
