use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor, PgPool, Postgres, QueryBuilder};
use tourbook_core::payment::{self, NewPayment, Payment, PaymentFilter, PaymentUpdate};
use tourbook_core::repository::PaymentRepository;
use tourbook_core::{CoreError, CoreResult};
use tracing::info;

use crate::booking_repo::{apply_booking_changes, lock_booking};
use crate::db_error::{map_db_err, parse_column};

pub struct StorePaymentRepository {
    pool: PgPool,
}

impl StorePaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PAYMENT_SELECT: &str = r#"
    SELECT p.id, p.booking_id, p.amount, p.currency, p.payment_method, p.payment_intent_id,
           p.status, p.refund_amount, p.payment_date, p.updated_at,
           b.booking_number, u.email AS user_email, t.abstract AS tour_name
    FROM payments p
    JOIN bookings b ON b.id = p.booking_id
    JOIN tours t ON t.id = b.tour_id
    LEFT JOIN users u ON u.id = b.user_id
"#;

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    booking_id: i64,
    amount: Decimal,
    currency: String,
    payment_method: String,
    payment_intent_id: Option<String>,
    status: String,
    refund_amount: Decimal,
    payment_date: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    booking_number: Option<String>,
    user_email: Option<String>,
    tour_name: Option<String>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = CoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            booking_id: row.booking_id,
            amount: row.amount,
            currency: row.currency,
            payment_method: row.payment_method,
            payment_intent_id: row.payment_intent_id,
            status: parse_column("payments.status", &row.status)?,
            refund_amount: row.refund_amount,
            payment_date: row.payment_date,
            updated_at: row.updated_at,
            booking_number: row.booking_number,
            user_email: row.user_email,
            tour_name: row.tour_name,
        })
    }
}

async fn fetch_payment<'e, E: PgExecutor<'e>>(executor: E, id: i64) -> CoreResult<Option<Payment>> {
    let sql = format!("{} WHERE p.id = $1", PAYMENT_SELECT);
    sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(map_db_err)?
        .map(Payment::try_from)
        .transpose()
}

/// Propagates a payment's state onto its booking within the caller's transaction.
async fn sync_booking(
    conn: &mut PgConnection,
    booking_id: i64,
    event: payment::PaymentEvent,
    state: payment::PaymentState,
    payment_intent_id: Option<&str>,
) -> CoreResult<()> {
    let booking = lock_booking(conn, booking_id).await?;
    if let Some(changes) = payment::booking_effect(event, state, &booking, payment_intent_id) {
        let updated = apply_booking_changes(conn, booking_id, &changes).await?;
        info!(
            booking_id,
            status = %updated.status,
            payment_status = %updated.payment_status,
            "Booking updated from payment"
        );
    }
    Ok(())
}

#[async_trait]
impl PaymentRepository for StorePaymentRepository {
    async fn list_payments(&self, filter: &PaymentFilter) -> CoreResult<Vec<Payment>> {
        let mut qb = QueryBuilder::<Postgres>::new(PAYMENT_SELECT);
        qb.push(" WHERE 1 = 1");
        if let Some(booking_id) = filter.booking_id {
            qb.push(" AND p.booking_id = ").push_bind(booking_id);
        }
        if let Some(status) = filter.status {
            qb.push(" AND p.status = ").push_bind(status.as_str());
        }
        if let Some(method) = &filter.payment_method {
            qb.push(" AND p.payment_method = ").push_bind(method.clone());
        }
        if let Some(from) = filter.date_from {
            qb.push(" AND p.payment_date::date >= ").push_bind(from);
        }
        if let Some(to) = filter.date_to {
            qb.push(" AND p.payment_date::date <= ").push_bind(to);
        }
        if let Some(user_id) = filter.user_id {
            qb.push(" AND b.user_id = ").push_bind(user_id);
        }
        if let Some(vendor_id) = filter.vendor_id {
            qb.push(" AND t.vendor_id = ").push_bind(vendor_id);
        }
        qb.push(" ORDER BY p.payment_date DESC, p.id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let rows = qb
            .build_query_as::<PaymentRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn get_payment(&self, id: i64) -> CoreResult<Option<Payment>> {
        fetch_payment(&self.pool, id).await
    }

    async fn record_payment(&self, new_payment: &NewPayment) -> CoreResult<Payment> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        // Lock first so a concurrent update of the same booking waits for us.
        lock_booking(&mut tx, new_payment.booking_id).await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO payments (booking_id, amount, currency, payment_method, payment_intent_id, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(new_payment.booking_id)
        .bind(new_payment.amount)
        .bind(new_payment.currency.as_deref().unwrap_or("USD"))
        .bind(&new_payment.payment_method)
        .bind(&new_payment.payment_intent_id)
        .bind(new_payment.status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_err)?;

        sync_booking(
            &mut tx,
            new_payment.booking_id,
            payment::PaymentEvent::Recorded,
            new_payment.status,
            new_payment.payment_intent_id.as_deref(),
        )
        .await?;

        let created = fetch_payment(&mut *tx, id)
            .await?
            .ok_or_else(|| CoreError::StoreError(format!("payment {} vanished after insert", id)))?;
        tx.commit().await.map_err(map_db_err)?;

        info!(payment_id = id, booking_id = created.booking_id, status = %created.status, "Payment recorded");
        Ok(created)
    }

    async fn update_payment(&self, id: i64, update: &PaymentUpdate) -> CoreResult<Payment> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        let current = fetch_payment(&mut *tx, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Payment {}", id)))?;
        update.validate(&current)?;
        lock_booking(&mut tx, current.booking_id).await?;

        sqlx::query(
            r#"
            UPDATE payments
            SET status = $1, refund_amount = COALESCE($2, refund_amount), updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(update.status.as_str())
        .bind(update.refund_amount)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        sync_booking(
            &mut tx,
            current.booking_id,
            payment::PaymentEvent::Updated,
            update.status,
            current.payment_intent_id.as_deref(),
        )
        .await?;

        let updated = fetch_payment(&mut *tx, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Payment {}", id)))?;
        tx.commit().await.map_err(map_db_err)?;

        info!(payment_id = id, status = %updated.status, "Payment updated");
        Ok(updated)
    }
}
