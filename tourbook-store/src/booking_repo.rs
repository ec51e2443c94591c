use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor, PgPool, Postgres, QueryBuilder};
use tourbook_core::booking::{
    Booking, BookingChanges, BookingFilter, NewBooking, NewTraveler, Traveler,
};
use tourbook_core::repository::BookingRepository;
use tourbook_core::seats;
use tourbook_core::{CoreError, CoreResult};
use tracing::{debug, info};

use crate::availability_repo::{lock_slot, set_spots_booked};
use crate::db_error::{map_db_err, parse_column};

pub struct StoreBookingRepository {
    pool: PgPool,
}

impl StoreBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const BOOKING_COLUMNS: &str = "id, booking_number, user_id, tour_id, availability_id, adults, children, \
     total_price, special_requests, status, payment_status, payment_intent_id, booking_date, updated_at";

const BOOKING_SELECT: &str = r#"
    SELECT b.id, b.booking_number, b.user_id, b.tour_id, b.availability_id, b.adults, b.children,
           b.total_price, b.special_requests, b.status, b.payment_status, b.payment_intent_id,
           b.booking_date, b.updated_at,
           t.abstract AS tour_name, u.email AS user_email,
           a.date AS tour_date, a.start_time AS tour_time
    FROM bookings b
    JOIN tours t ON t.id = b.tour_id
    JOIN availability a ON a.id = b.availability_id
    LEFT JOIN users u ON u.id = b.user_id
"#;

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: i64,
    booking_number: String,
    user_id: Option<i64>,
    tour_id: i64,
    availability_id: i64,
    adults: i32,
    children: i32,
    total_price: Decimal,
    special_requests: Option<String>,
    status: String,
    payment_status: String,
    payment_intent_id: Option<String>,
    booking_date: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[sqlx(default)]
    tour_name: Option<String>,
    #[sqlx(default)]
    user_email: Option<String>,
    #[sqlx(default)]
    tour_date: Option<NaiveDate>,
    #[sqlx(default)]
    tour_time: Option<NaiveTime>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            booking_number: row.booking_number,
            user_id: row.user_id,
            tour_id: row.tour_id,
            availability_id: row.availability_id,
            adults: row.adults,
            children: row.children,
            total_price: row.total_price,
            special_requests: row.special_requests,
            status: parse_column("bookings.status", &row.status)?,
            payment_status: parse_column("bookings.payment_status", &row.payment_status)?,
            payment_intent_id: row.payment_intent_id,
            booking_date: row.booking_date,
            updated_at: row.updated_at,
            tour_name: row.tour_name,
            user_email: row.user_email,
            tour_date: row.tour_date,
            tour_time: row.tour_time,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TravelerRow {
    id: i64,
    booking_id: i64,
    first_name: String,
    last_name: String,
    email: Option<String>,
    phone: Option<String>,
    is_lead: bool,
    traveler_type: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TravelerRow> for Traveler {
    type Error = CoreError;

    fn try_from(row: TravelerRow) -> Result<Self, Self::Error> {
        Ok(Traveler {
            id: row.id,
            booking_id: row.booking_id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            is_lead: row.is_lead,
            traveler_type: parse_column("travelers.traveler_type", &row.traveler_type)?,
            created_at: row.created_at,
        })
    }
}

pub(crate) async fn fetch_booking<'e, E: PgExecutor<'e>>(executor: E, id: i64) -> CoreResult<Option<Booking>> {
    let sql = format!("{} WHERE b.id = $1", BOOKING_SELECT);
    sqlx::query_as::<_, BookingRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(map_db_err)?
        .map(Booking::try_from)
        .transpose()
}

pub(crate) async fn lock_booking(conn: &mut PgConnection, id: i64) -> CoreResult<Booking> {
    let sql = format!("SELECT {} FROM bookings WHERE id = $1 FOR UPDATE", BOOKING_COLUMNS);
    sqlx::query_as::<_, BookingRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::NotFound(format!("Booking {}", id)))?
        .try_into()
}

async fn insert_traveler(
    conn: &mut PgConnection,
    booking_id: i64,
    traveler: &NewTraveler,
) -> CoreResult<Traveler> {
    sqlx::query_as::<_, TravelerRow>(
        r#"
        INSERT INTO travelers (booking_id, first_name, last_name, email, phone, is_lead, traveler_type)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, booking_id, first_name, last_name, email, phone, is_lead, traveler_type, created_at
        "#,
    )
    .bind(booking_id)
    .bind(&traveler.first_name)
    .bind(&traveler.last_name)
    .bind(&traveler.email)
    .bind(&traveler.phone)
    .bind(traveler.is_lead)
    .bind(traveler.traveler_type.as_str())
    .fetch_one(conn)
    .await
    .map_err(map_db_err)?
    .try_into()
}

/// Applies `changes` to a booking and its slot counter inside the caller's transaction.
pub(crate) async fn apply_booking_changes(
    conn: &mut PgConnection,
    id: i64,
    changes: &BookingChanges,
) -> CoreResult<Booking> {
    let existing = lock_booking(conn, id).await?;
    let slot = lock_slot(conn, existing.availability_id).await?;
    let plan = seats::plan_update(&existing, &slot, changes)?;

    sqlx::query(
        r#"
        UPDATE bookings
        SET adults = $1, children = $2, total_price = $3, special_requests = $4,
            status = $5, payment_status = $6, payment_intent_id = $7, updated_at = NOW()
        WHERE id = $8
        "#,
    )
    .bind(plan.adults)
    .bind(plan.children)
    .bind(plan.total_price)
    .bind(&plan.special_requests)
    .bind(plan.status.as_str())
    .bind(plan.payment_status.as_str())
    .bind(&plan.payment_intent_id)
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(map_db_err)?;

    if plan.seat_delta != 0 {
        set_spots_booked(conn, slot.id, plan.spots_booked).await?;
        debug!(
            booking_id = id,
            slot_id = slot.id,
            delta = plan.seat_delta,
            spots_booked = plan.spots_booked,
            "Moved seats"
        );
    }

    fetch_booking(&mut *conn, id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("Booking {}", id)))
}

#[async_trait]
impl BookingRepository for StoreBookingRepository {
    async fn list_bookings(&self, filter: &BookingFilter) -> CoreResult<Vec<Booking>> {
        let mut qb = QueryBuilder::<Postgres>::new(BOOKING_SELECT);
        qb.push(" WHERE 1 = 1");
        if let Some(user_id) = filter.user_id {
            qb.push(" AND b.user_id = ").push_bind(user_id);
        }
        if let Some(tour_id) = filter.tour_id {
            qb.push(" AND b.tour_id = ").push_bind(tour_id);
        }
        if let Some(status) = filter.status {
            qb.push(" AND b.status = ").push_bind(status.as_str());
        }
        if let Some(payment_status) = filter.payment_status {
            qb.push(" AND b.payment_status = ").push_bind(payment_status.as_str());
        }
        if let Some(from) = filter.date_from {
            qb.push(" AND a.date >= ").push_bind(from);
        }
        if let Some(to) = filter.date_to {
            qb.push(" AND a.date <= ").push_bind(to);
        }
        if let Some(vendor_id) = filter.vendor_id {
            qb.push(" AND t.vendor_id = ").push_bind(vendor_id);
        }
        qb.push(" ORDER BY b.booking_date DESC, b.id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let rows = qb
            .build_query_as::<BookingRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn get_booking(&self, id: i64) -> CoreResult<Option<Booking>> {
        fetch_booking(&self.pool, id).await
    }

    async fn get_booking_by_number(&self, booking_number: &str) -> CoreResult<Option<Booking>> {
        let sql = format!("{} WHERE b.booking_number = $1", BOOKING_SELECT);
        sqlx::query_as::<_, BookingRow>(&sql)
            .bind(booking_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?
            .map(Booking::try_from)
            .transpose()
    }

    async fn create_booking(&self, booking: &NewBooking) -> CoreResult<Booking> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        let slot = lock_slot(&mut tx, booking.availability_id).await?;
        let spots_booked = seats::plan_create(&slot, booking)?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO bookings (booking_number, user_id, tour_id, availability_id, adults, children,
                                  total_price, special_requests, status, payment_status, payment_intent_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9, $10)
            RETURNING id
            "#,
        )
        .bind(&booking.booking_number)
        .bind(booking.user_id)
        .bind(booking.tour_id)
        .bind(booking.availability_id)
        .bind(booking.adults)
        .bind(booking.children)
        .bind(booking.total_price)
        .bind(&booking.special_requests)
        .bind(booking.payment_status.as_str())
        .bind(&booking.payment_intent_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_err)?;

        for traveler in &booking.travelers {
            insert_traveler(&mut tx, id, traveler).await?;
        }

        set_spots_booked(&mut tx, slot.id, spots_booked).await?;

        let created = fetch_booking(&mut *tx, id)
            .await?
            .ok_or_else(|| CoreError::StoreError(format!("booking {} vanished after insert", id)))?;
        tx.commit().await.map_err(map_db_err)?;

        info!(
            booking_id = id,
            booking_number = %created.booking_number,
            slot_id = slot.id,
            spots_booked,
            "Booking created"
        );
        Ok(created)
    }

    async fn update_booking(&self, id: i64, changes: &BookingChanges) -> CoreResult<Booking> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;
        let updated = apply_booking_changes(&mut tx, id, changes).await?;
        tx.commit().await.map_err(map_db_err)?;
        Ok(updated)
    }

    async fn delete_booking(&self, id: i64) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        let existing = lock_booking(&mut tx, id).await?;
        let slot = lock_slot(&mut tx, existing.availability_id).await?;
        let spots_booked = seats::plan_delete(&existing, &slot)?;

        sqlx::query("DELETE FROM travelers WHERE booking_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        if spots_booked != slot.spots_booked {
            set_spots_booked(&mut tx, slot.id, spots_booked).await?;
        }
        tx.commit().await.map_err(map_db_err)?;

        info!(booking_id = id, slot_id = slot.id, spots_booked, "Booking deleted");
        Ok(())
    }

    async fn list_travelers(&self, booking_id: i64) -> CoreResult<Vec<Traveler>> {
        let rows = sqlx::query_as::<_, TravelerRow>(
            r#"
            SELECT id, booking_id, first_name, last_name, email, phone, is_lead, traveler_type, created_at
            FROM travelers
            WHERE booking_id = $1
            ORDER BY is_lead DESC, id ASC
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        rows.into_iter().map(Traveler::try_from).collect()
    }

    async fn add_traveler(&self, booking_id: i64, traveler: &NewTraveler) -> CoreResult<Traveler> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;
        lock_booking(&mut tx, booking_id).await?;

        if traveler.is_lead {
            let has_lead: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM travelers WHERE booking_id = $1 AND is_lead)",
            )
            .bind(booking_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_err)?;
            if has_lead {
                return Err(CoreError::Conflict(format!(
                    "Booking {} already has a lead traveler",
                    booking_id
                )));
            }
        }

        let created = insert_traveler(&mut tx, booking_id, traveler).await?;
        tx.commit().await.map_err(map_db_err)?;
        Ok(created)
    }
}
