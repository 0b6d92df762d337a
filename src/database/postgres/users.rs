use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::conflict_on;
use crate::database::{Redemption, UserRepository};
use crate::error::{Result, ServerError};
use crate::user::{Role, User};

const COLUMNS: &str = "id, email, name, role, password, confirmed, token, \
                       token_expires_at, created_at";

/// User record as stored in the database.
#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    name: String,
    role: String,
    password: String,
    confirmed: bool,
    token: Option<String>,
    token_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = ServerError;

    fn try_from(record: UserRecord) -> Result<Self> {
        let role = record.role.parse::<Role>().map_err(|err| {
            ServerError::Internal {
                details: err,
                source: None,
            }
        })?;

        Ok(User {
            id: record.id,
            email: record.email,
            name: record.name,
            role,
            password: record.password,
            confirmed: record.confirmed,
            token: record.token,
            token_expires_at: record.token_expires_at,
            created_at: record.created_at,
        })
    }
}

/// PostgreSQL account repository.
pub struct PgUsers {
    pool: PgPool,
}

impl PgUsers {
    /// Create a new [`PgUsers`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_where(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {COLUMNS} FROM users WHERE {column} = $1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        record.map(User::try_from).transpose()
    }
}

#[async_trait]
impl UserRepository for PgUsers {
    async fn insert(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, email, name, role, password, confirmed,
                token, token_expires_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role.to_string())
        .bind(&user.password)
        .bind(user.confirmed)
        .bind(&user.token)
        .bind(user.token_expires_at)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(conflict_on("email", &[]))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        record.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_where("email", email).await
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<User>> {
        self.find_where("token", token).await
    }

    async fn issue_token(
        &self,
        id: &Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET token = $2, token_expires_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServerError::not_found("user"));
        }

        Ok(())
    }

    async fn redeem_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
        redemption: &Redemption,
    ) -> Result<Option<User>> {
        let (confirm, password) = match redemption {
            Redemption::Confirm => (true, None),
            Redemption::Password(hash) => (false, Some(hash.as_str())),
        };

        let record = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            UPDATE users
            SET
                confirmed = confirmed OR $3,
                password = COALESCE($4, password),
                token = NULL,
                token_expires_at = NULL
            WHERE token = $1
              AND (token_expires_at IS NULL OR token_expires_at > $2)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(token)
        .bind(now)
        .bind(confirm)
        .bind(password)
        .fetch_optional(&self.pool)
        .await?;

        record.map(User::try_from).transpose()
    }
}
