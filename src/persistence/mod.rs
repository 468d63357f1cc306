//! Storage for processed log records.
//!
//! `PgSysLogRepository` is used when `DATABASE_URL` is set, `InMemorySysLogRepository`
//! otherwise.

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{NewSysLog, SysLog};

pub use memory::InMemorySysLogRepository;
pub use postgres::PgSysLogRepository;

#[async_trait]
pub trait SysLogRepository: Send + Sync {
    /// Store a record, returning the id assigned to it.
    async fn insert(&self, record: NewSysLog) -> AppResult<i64>;

    async fn find_by_id(&self, id: i64) -> AppResult<Option<SysLog>>;
}
