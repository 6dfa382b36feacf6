//! PostgreSQL implementation for role and claim storage

use super::{column, from_db_id, query_error, row_to_claim, to_db_id};
use crate::auth::types::{Claim, Role};
use crate::storage::traits::{ClaimStore, Result, RoleStore};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};

/// PostgreSQL implementation of role and claim storage
pub struct PostgresRoleStore {
    pool: PgPool,
}

impl PostgresRoleStore {
    /// Create a new PostgreSQL role store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_claims(&self, row: Option<PgRow>) -> Result<Option<Role>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let id = from_db_id(column(&row, "id")?)?;

        let claims = sqlx::query(
            r#"
            SELECT c.id, c.name FROM claims c
            JOIN role_claims rc ON rc.claim_id = c.id
            WHERE rc.role_id = $1
            ORDER BY c.id
            "#,
        )
        .bind(to_db_id(id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?
        .iter()
        .map(row_to_claim)
        .collect::<Result<Vec<Claim>>>()?;

        Ok(Some(Role {
            id,
            name: column(&row, "name")?,
            is_default: column(&row, "is_default")?,
            claims,
        }))
    }
}

#[async_trait]
impl RoleStore for PostgresRoleStore {
    async fn get_default_role(&self) -> Result<Option<Role>> {
        let row = sqlx::query(
            "SELECT id, name, is_default FROM roles WHERE is_default = TRUE ORDER BY id LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        self.with_claims(row).await
    }

    async fn get_role(&self, id: u64) -> Result<Option<Role>> {
        let row = sqlx::query("SELECT id, name, is_default FROM roles WHERE id = $1")
            .bind(to_db_id(id)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        self.with_claims(row).await
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let row = sqlx::query("SELECT id, name, is_default FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        self.with_claims(row).await
    }
}

#[async_trait]
impl ClaimStore for PostgresRoleStore {
    async fn find_claims_by_ids(&self, ids: &[u64]) -> Result<Vec<Claim>> {
        let ids = ids
            .iter()
            .map(|id| to_db_id(*id))
            .collect::<Result<Vec<i64>>>()?;

        sqlx::query("SELECT id, name FROM claims WHERE id = ANY($1) ORDER BY id")
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?
            .iter()
            .map(row_to_claim)
            .collect()
    }
}
