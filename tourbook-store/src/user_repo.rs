use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tourbook_core::account::{NewUser, PasswordResetToken, User, UserFilter, UserUpdate};
use tourbook_core::repository::{PasswordResetRepository, UserRepository};
use tourbook_core::{CoreError, CoreResult};

use crate::db_error::{map_db_err, parse_column};

pub struct StoreUserRepository {
    pool: PgPool,
}

impl StoreUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, phone, role, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = CoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            role: parse_column("users.role", &row.role)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl StoreUserRepository {
    async fn fetch_one_by(&self, column: &str, value: impl ToString) -> CoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = $1", USER_COLUMNS, column);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
        row.map(User::try_from).transpose()
    }
}

#[async_trait]
impl UserRepository for StoreUserRepository {
    async fn list_users(&self, filter: &UserFilter) -> CoreResult<Vec<User>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM users WHERE 1 = 1", USER_COLUMNS));
        if let Some(role) = filter.role {
            qb.push(" AND role = ").push_bind(role.as_str());
        }
        if let Some(email) = &filter.email {
            qb.push(" AND email ILIKE ").push_bind(format!("%{}%", email));
        }
        qb.push(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let rows = qb
            .build_query_as::<UserRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn get_user(&self, id: i64) -> CoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
        row.map(User::try_from).transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        self.fetch_one_by("LOWER(email)", email.to_lowercase()).await
    }

    async fn create_user(&self, user: &NewUser) -> CoreResult<User> {
        let sql = format!(
            "INSERT INTO users (email, password_hash, first_name, last_name, phone, role) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.phone)
            .bind(user.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)?;
        row.try_into()
    }

    async fn update_user(&self, id: i64, update: &UserUpdate) -> CoreResult<User> {
        let sql = format!(
            "UPDATE users SET email = $1, first_name = $2, last_name = $3, phone = $4, \
             role = COALESCE($5, role), updated_at = NOW() WHERE id = $6 RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&update.email)
            .bind(&update.first_name)
            .bind(&update.last_name)
            .bind(&update.phone)
            .bind(update.role.map(|r| r.as_str()))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
        row.ok_or_else(|| CoreError::NotFound(format!("User {}", id)))?
            .try_into()
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> CoreResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("User {}", id)));
        }
        Ok(())
    }

    async fn delete_user(&self, id: i64) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("User {}", id)));
        }
        Ok(())
    }
}

pub struct StorePasswordResetRepository {
    pool: PgPool,
}

impl StorePasswordResetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ResetTokenRow {
    user_id: i64,
    token: String,
    expires_at: DateTime<Utc>,
}

#[async_trait]
impl PasswordResetRepository for StorePasswordResetRepository {
    async fn upsert_reset_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (user_id, token, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn find_reset_token(&self, token: &str) -> CoreResult<Option<PasswordResetToken>> {
        let row = sqlx::query_as::<_, ResetTokenRow>(
            "SELECT user_id, token, expires_at FROM password_reset_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(row.map(|r| PasswordResetToken { user_id: r.user_id, token: r.token, expires_at: r.expires_at }))
    }

    async fn delete_reset_token(&self, token: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM password_reset_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }
}
