use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, instrument};

use super::SysLogRepository;
use crate::error::AppResult;
use crate::models::{NewSysLog, SysLog};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sys_log (
    id          BIGSERIAL PRIMARY KEY,
    msg_id      TEXT NOT NULL,
    content     TEXT NOT NULL,
    create_time TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// PostgreSQL repository for the `sys_log` table.
#[derive(Clone)]
pub struct PgSysLogRepository {
    pool: PgPool,
}

impl PgSysLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool and make sure the table exists.
    #[instrument(skip_all)]
    pub async fn connect(url: &str, max_connections: u32) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;
        info!(max_connections, "database connection pool established");

        let repository = Self::new(pool);
        repository.migrate().await?;
        Ok(repository)
    }

    /// Create the `sys_log` table if it does not exist. Safe to run repeatedly.
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl SysLogRepository for PgSysLogRepository {
    async fn insert(&self, record: NewSysLog) -> AppResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sys_log (msg_id, content, create_time)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(&record.msg_id)
        .bind(&record.content)
        .bind(record.create_time)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<SysLog>> {
        let row = sqlx::query_as::<_, SysLog>(
            r#"
            SELECT id, msg_id, content, create_time
            FROM sys_log
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
