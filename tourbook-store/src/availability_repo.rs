use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor, PgPool, Postgres, QueryBuilder};
use tourbook_core::availability::{AvailabilityFilter, AvailabilitySlot, NewSlot, SlotUpdate};
use tourbook_core::repository::AvailabilityRepository;
use tourbook_core::{CoreError, CoreResult};
use tracing::info;

use crate::db_error::map_db_err;

pub struct StoreAvailabilityRepository {
    pool: PgPool,
}

impl StoreAvailabilityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SLOT_COLUMNS: &str = "id, tour_id, date, start_time, end_time, max_spots, spots_booked, \
     price_adult, price_child, is_available, created_at, updated_at";

const SLOT_SELECT: &str = r#"
    SELECT a.id, a.tour_id, a.date, a.start_time, a.end_time, a.max_spots, a.spots_booked,
           a.price_adult, a.price_child, a.is_available, a.created_at, a.updated_at,
           t.abstract AS tour_name
    FROM availability a
    JOIN tours t ON t.id = a.tour_id
"#;

#[derive(sqlx::FromRow)]
pub(crate) struct SlotRow {
    id: i64,
    tour_id: i64,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: Option<NaiveTime>,
    max_spots: i32,
    spots_booked: i32,
    price_adult: Decimal,
    price_child: Option<Decimal>,
    is_available: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[sqlx(default)]
    tour_name: Option<String>,
}

impl From<SlotRow> for AvailabilitySlot {
    fn from(row: SlotRow) -> Self {
        AvailabilitySlot {
            id: row.id,
            tour_id: row.tour_id,
            date: row.date,
            start_time: row.start_time,
            end_time: row.end_time,
            max_spots: row.max_spots,
            spots_booked: row.spots_booked,
            price_adult: row.price_adult,
            price_child: row.price_child,
            is_available: row.is_available,
            created_at: row.created_at,
            updated_at: row.updated_at,
            tour_name: row.tour_name,
        }
    }
}

/// Loads a slot with a row lock held until the surrounding transaction ends.
pub(crate) async fn lock_slot(conn: &mut PgConnection, id: i64) -> CoreResult<AvailabilitySlot> {
    let sql = format!("SELECT {} FROM availability WHERE id = $1 FOR UPDATE", SLOT_COLUMNS);
    sqlx::query_as::<_, SlotRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .map(AvailabilitySlot::from)
        .ok_or_else(|| CoreError::NotFound(format!("Availability {}", id)))
}

pub(crate) async fn set_spots_booked(conn: &mut PgConnection, id: i64, spots_booked: i32) -> CoreResult<()> {
    sqlx::query("UPDATE availability SET spots_booked = $1, updated_at = NOW() WHERE id = $2")
        .bind(spots_booked)
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

async fn fetch_slot<'e, E: PgExecutor<'e>>(executor: E, id: i64) -> Result<Option<SlotRow>, sqlx::Error> {
    let sql = format!("{} WHERE a.id = $1", SLOT_SELECT);
    sqlx::query_as::<_, SlotRow>(&sql).bind(id).fetch_optional(executor).await
}

async fn insert_slot(conn: &mut PgConnection, slot: &NewSlot) -> CoreResult<i64> {
    let s = &slot.schedule;
    sqlx::query_scalar(
        r#"
        INSERT INTO availability (tour_id, date, start_time, end_time, max_spots,
                                  price_adult, price_child, is_available)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(slot.tour_id)
    .bind(slot.date)
    .bind(s.start_time)
    .bind(s.end_time)
    .bind(s.max_spots)
    .bind(s.price_adult)
    .bind(s.price_child)
    .bind(s.is_available)
    .fetch_one(conn)
    .await
    .map_err(map_db_err)
}

#[async_trait]
impl AvailabilityRepository for StoreAvailabilityRepository {
    async fn list_slots(&self, filter: &AvailabilityFilter) -> CoreResult<Vec<AvailabilitySlot>> {
        let mut qb = QueryBuilder::<Postgres>::new(SLOT_SELECT);
        qb.push(" WHERE 1 = 1");
        if let Some(tour_id) = filter.tour_id {
            qb.push(" AND a.tour_id = ").push_bind(tour_id);
        }
        if let Some(from) = filter.date_from {
            qb.push(" AND a.date >= ").push_bind(from);
        }
        if let Some(to) = filter.date_to {
            qb.push(" AND a.date <= ").push_bind(to);
        }
        if let Some(open) = filter.is_available {
            qb.push(" AND a.is_available = ").push_bind(open);
        }
        if let Some(vendor_id) = filter.vendor_id {
            qb.push(" AND t.vendor_id = ").push_bind(vendor_id);
        }
        qb.push(" ORDER BY a.date, a.start_time, a.id");

        let rows = qb
            .build_query_as::<SlotRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(rows.into_iter().map(AvailabilitySlot::from).collect())
    }

    async fn available_slots(&self, tour_id: i64, date: NaiveDate) -> CoreResult<Vec<AvailabilitySlot>> {
        let sql = format!(
            "{} WHERE a.tour_id = $1 AND a.date = $2 AND a.is_available AND a.spots_booked < a.max_spots \
             ORDER BY a.start_time",
            SLOT_SELECT
        );
        let rows = sqlx::query_as::<_, SlotRow>(&sql)
            .bind(tour_id)
            .bind(date)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(rows.into_iter().map(AvailabilitySlot::from).collect())
    }

    async fn get_slot(&self, id: i64) -> CoreResult<Option<AvailabilitySlot>> {
        let row = fetch_slot(&self.pool, id).await.map_err(map_db_err)?;
        Ok(row.map(AvailabilitySlot::from))
    }

    async fn create_slot(&self, slot: &NewSlot) -> CoreResult<AvailabilitySlot> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;
        let id = insert_slot(&mut tx, slot).await?;
        let row = fetch_slot(&mut *tx, id)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| CoreError::StoreError(format!("slot {} vanished after insert", id)))?;
        tx.commit().await.map_err(map_db_err)?;
        Ok(row.into())
    }

    async fn create_slots(&self, slots: &[NewSlot]) -> CoreResult<Vec<AvailabilitySlot>> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;
        let mut ids = Vec::with_capacity(slots.len());
        for slot in slots {
            ids.push(insert_slot(&mut tx, slot).await?);
        }

        let sql = format!("{} WHERE a.id = ANY($1) ORDER BY a.date, a.start_time, a.id", SLOT_SELECT);
        let rows = sqlx::query_as::<_, SlotRow>(&sql)
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_db_err)?;
        tx.commit().await.map_err(map_db_err)?;

        info!(count = rows.len(), "Created availability slots");
        Ok(rows.into_iter().map(AvailabilitySlot::from).collect())
    }

    async fn update_slot(&self, id: i64, update: &SlotUpdate) -> CoreResult<AvailabilitySlot> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;
        let current = lock_slot(&mut tx, id).await?;
        update.check_against(&current)?;

        let s = &update.schedule;
        sqlx::query(
            r#"
            UPDATE availability
            SET date = $1, start_time = $2, end_time = $3, max_spots = $4,
                price_adult = $5, price_child = $6, is_available = $7, updated_at = NOW()
            WHERE id = $8
            "#,
        )
        .bind(update.date)
        .bind(s.start_time)
        .bind(s.end_time)
        .bind(s.max_spots)
        .bind(s.price_adult)
        .bind(s.price_child)
        .bind(s.is_available)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        let row = fetch_slot(&mut *tx, id)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| CoreError::NotFound(format!("Availability {}", id)))?;
        tx.commit().await.map_err(map_db_err)?;
        Ok(row.into())
    }

    async fn delete_slot(&self, id: i64) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;
        let current = lock_slot(&mut tx, id).await?;
        if current.spots_booked > 0 {
            return Err(CoreError::Conflict(format!(
                "Availability {} still holds {} booked seats",
                id, current.spots_booked
            )));
        }

        sqlx::query("DELETE FROM availability WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        tx.commit().await.map_err(map_db_err)?;
        Ok(())
    }
}
