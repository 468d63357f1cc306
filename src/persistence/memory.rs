use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::SysLogRepository;
use crate::error::AppResult;
use crate::models::{NewSysLog, SysLog};

/// Repository backed by a map; ids start at 1 like a `BIGSERIAL` column.
#[derive(Clone, Default)]
pub struct InMemorySysLogRepository {
    records: Arc<RwLock<HashMap<i64, SysLog>>>,
}

impl InMemorySysLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored records ordered by id.
    pub async fn all(&self) -> Vec<SysLog> {
        let mut records: Vec<SysLog> = self.records.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.id);
        records
    }
}

#[async_trait]
impl SysLogRepository for InMemorySysLogRepository {
    async fn insert(&self, record: NewSysLog) -> AppResult<i64> {
        let mut records = self.records.write().await;
        let id = records.len() as i64 + 1;
        records.insert(id, record.with_id(id));
        Ok(id)
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<SysLog>> {
        Ok(self.records.read().await.get(&id).cloned())
    }
}
