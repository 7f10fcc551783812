use std::collections::HashMap;

use tokio::sync::RwLock;

use tablebook_core::domain::booking::{BookingRecord, SessionId};

use super::{BookingRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryBookingRepository {
    records: RwLock<HashMap<String, BookingRecord>>,
}

#[async_trait::async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn save(&self, record: BookingRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.insert(record.session_id.0.clone(), record);
        Ok(())
    }

    async fn find_by_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<BookingRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(&session_id.0).cloned())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<BookingRecord>, RepositoryError> {
        let records = self.records.read().await;
        let mut recent: Vec<BookingRecord> = records.values().cloned().collect();
        recent.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        recent.truncate(limit as usize);
        Ok(recent)
    }
}
