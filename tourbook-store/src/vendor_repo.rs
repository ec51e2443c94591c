use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use tourbook_core::account::{NewVendor, Vendor, VendorFilter, VendorProfile};
use tourbook_core::repository::VendorRepository;
use tourbook_core::{CoreError, CoreResult};

use crate::db_error::map_db_err;

pub struct StoreVendorRepository {
    pool: PgPool,
}

impl StoreVendorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const VENDOR_SELECT: &str = r#"
    SELECT v.id, v.user_id, v.company_name, v.description, v.logo_url, v.website,
           v.contact_email, v.contact_phone, v.commission_rate, v.is_verified,
           v.created_at, v.updated_at,
           u.email, u.first_name, u.last_name, u.phone
    FROM vendors v
    JOIN users u ON u.id = v.user_id
"#;

#[derive(sqlx::FromRow)]
struct VendorRow {
    id: i64,
    user_id: i64,
    company_name: String,
    description: Option<String>,
    logo_url: Option<String>,
    website: Option<String>,
    contact_email: Option<String>,
    contact_phone: Option<String>,
    commission_rate: Option<Decimal>,
    is_verified: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
}

impl From<VendorRow> for Vendor {
    fn from(row: VendorRow) -> Self {
        Vendor {
            id: row.id,
            user_id: row.user_id,
            company_name: row.company_name,
            description: row.description,
            logo_url: row.logo_url,
            website: row.website,
            contact_email: row.contact_email,
            contact_phone: row.contact_phone,
            commission_rate: row.commission_rate,
            is_verified: row.is_verified,
            created_at: row.created_at,
            updated_at: row.updated_at,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
        }
    }
}

async fn fetch_vendor_where<'e, E: PgExecutor<'e>>(
    executor: E,
    column: &str,
    value: i64,
) -> Result<Option<VendorRow>, sqlx::Error> {
    let sql = format!("{} WHERE v.{} = $1", VENDOR_SELECT, column);
    sqlx::query_as::<_, VendorRow>(&sql)
        .bind(value)
        .fetch_optional(executor)
        .await
}

#[async_trait]
impl VendorRepository for StoreVendorRepository {
    async fn list_vendors(&self, filter: &VendorFilter) -> CoreResult<Vec<Vendor>> {
        let mut qb = QueryBuilder::<Postgres>::new(VENDOR_SELECT);
        qb.push(" WHERE 1 = 1");
        if let Some(verified) = filter.is_verified {
            qb.push(" AND v.is_verified = ").push_bind(verified);
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{}%", search);
            qb.push(" AND (v.company_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR u.email ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY v.created_at DESC, v.id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let rows = qb
            .build_query_as::<VendorRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(rows.into_iter().map(Vendor::from).collect())
    }

    async fn get_vendor(&self, id: i64) -> CoreResult<Option<Vendor>> {
        let row = fetch_vendor_where(&self.pool, "id", id).await.map_err(map_db_err)?;
        Ok(row.map(Vendor::from))
    }

    async fn get_vendor_by_user_id(&self, user_id: i64) -> CoreResult<Option<Vendor>> {
        let row = fetch_vendor_where(&self.pool, "user_id", user_id)
            .await
            .map_err(map_db_err)?;
        Ok(row.map(Vendor::from))
    }

    async fn create_vendor(&self, vendor: &NewVendor) -> CoreResult<Vendor> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;
        let p = &vendor.profile;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO vendors (user_id, company_name, description, logo_url, website,
                                 contact_email, contact_phone, commission_rate, is_verified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(vendor.user_id)
        .bind(&p.company_name)
        .bind(&p.description)
        .bind(&p.logo_url)
        .bind(&p.website)
        .bind(&p.contact_email)
        .bind(&p.contact_phone)
        .bind(p.commission_rate)
        .bind(p.is_verified)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_err)?;

        // A vendor profile implies the vendor role.
        sqlx::query("UPDATE users SET role = 'vendor', updated_at = NOW() WHERE id = $1 AND role = 'customer'")
            .bind(vendor.user_id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;

        let row = fetch_vendor_where(&mut *tx, "id", id)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| CoreError::StoreError(format!("vendor {} vanished after insert", id)))?;
        tx.commit().await.map_err(map_db_err)?;
        Ok(row.into())
    }

    async fn update_vendor(&self, id: i64, profile: &VendorProfile) -> CoreResult<Vendor> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        let result = sqlx::query(
            r#"
            UPDATE vendors
            SET company_name = $1, description = $2, logo_url = $3, website = $4,
                contact_email = $5, contact_phone = $6, commission_rate = $7,
                is_verified = $8, updated_at = NOW()
            WHERE id = $9
            "#,
        )
        .bind(&profile.company_name)
        .bind(&profile.description)
        .bind(&profile.logo_url)
        .bind(&profile.website)
        .bind(&profile.contact_email)
        .bind(&profile.contact_phone)
        .bind(profile.commission_rate)
        .bind(profile.is_verified)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Vendor {}", id)));
        }

        let row = fetch_vendor_where(&mut *tx, "id", id)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| CoreError::NotFound(format!("Vendor {}", id)))?;
        tx.commit().await.map_err(map_db_err)?;
        Ok(row.into())
    }

    async fn delete_vendor(&self, id: i64) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM vendors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Vendor {}", id)));
        }
        Ok(())
    }
}
