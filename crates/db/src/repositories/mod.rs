use async_trait::async_trait;
use thiserror::Error;

use tablebook_core::domain::booking::{BookingRecord, SessionId};

pub mod booking;
pub mod memory;

pub use booking::SqlBookingRepository;
pub use memory::InMemoryBookingRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Stores one record per finished conversation. Saving the same session
/// twice replaces the earlier record.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn save(&self, record: BookingRecord) -> Result<(), RepositoryError>;
    async fn find_by_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<BookingRecord>, RepositoryError>;
    async fn list_recent(&self, limit: u32) -> Result<Vec<BookingRecord>, RepositoryError>;
}
