use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Broker, Record};
use crate::error::{AppError, AppResult};

#[derive(Default)]
struct TopicLog {
    records: Vec<Vec<u8>>,
    /// Offset of the next record to hand out
    next_offset: u64,
}

/// In-process broker with one append-only log per topic.
///
/// Offsets start at 0. Polls return records from the committed position,
/// so uncommitted records are delivered again.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    topics: Arc<Mutex<HashMap<String, TopicLog>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while unavailable every call fails with `Disconnected`.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Relaxed);
    }

    /// Every payload ever sent to `topic`, in order.
    pub async fn records(&self, topic: &str) -> Vec<Vec<u8>> {
        self.topics
            .lock()
            .await
            .get(topic)
            .map(|log| log.records.clone())
            .unwrap_or_default()
    }

    /// Offset the next poll on `topic` starts from.
    pub async fn committed(&self, topic: &str) -> u64 {
        self.topics
            .lock()
            .await
            .get(topic)
            .map_or(0, |log| log.next_offset)
    }

    /// Append a payload without any availability check, e.g. to simulate
    /// redelivery or a foreign producer writing arbitrary bytes.
    pub async fn inject(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        self.topics
            .lock()
            .await
            .entry(topic.to_string())
            .or_default()
            .records
            .push(payload.into());
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(AppError::Disconnected(
                "in-memory broker marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn send(&self, topic: &str, payload: String) -> AppResult<()> {
        self.check_available()?;
        self.inject(topic, payload).await;
        Ok(())
    }

    async fn poll(&self, topic: &str, max: u32) -> AppResult<Vec<Record>> {
        self.check_available()?;

        let topics = self.topics.lock().await;
        let Some(log) = topics.get(topic) else {
            return Ok(Vec::new());
        };

        let records = log
            .records
            .iter()
            .enumerate()
            .skip(log.next_offset as usize)
            .take(max as usize)
            .map(|(offset, payload)| Record {
                offset: offset as u64,
                payload: payload.clone(),
            })
            .collect();

        Ok(records)
    }

    async fn commit(&self, topic: &str, offset: u64) -> AppResult<()> {
        self.check_available()?;

        let mut topics = self.topics.lock().await;
        let log = topics.entry(topic.to_string()).or_default();
        if offset >= log.records.len() as u64 {
            return Err(AppError::CommitError(format!(
                "offset {offset} is beyond the end of topic '{topic}'"
            )));
        }
        // Commits never move backwards
        log.next_offset = log.next_offset.max(offset + 1);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.unavailable.load(Ordering::Relaxed)
    }
}
