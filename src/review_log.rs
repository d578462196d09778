//! Append-only review log writer. Retries once on a primary-key collision
//! (two writes landing in the same millisecond), per the storage contract.

use crate::gateway::CardStoreGateway;
use crate::model::ReviewLogRow;
use crate::{Error, LibraryError, SchedulerErrorKind};
use log::warn;

pub struct ReviewLogWriter<'a> {
    gateway: &'a dyn CardStoreGateway,
    retry_delay_ms: u64,
}

impl<'a> ReviewLogWriter<'a> {
    pub fn new(gateway: &'a dyn CardStoreGateway, retry_delay_ms: u64) -> Self {
        Self {
            gateway,
            retry_delay_ms,
        }
    }

    pub async fn write(&self, mut row: ReviewLogRow) -> Result<(), Error> {
        if self.gateway.insert_review_log(&row).await? {
            return Ok(());
        }
        warn!(
            "review log write collided at {}ms for card {}, retrying",
            row.time_ms, row.card_id
        );
        tokio::time::sleep(std::time::Duration::from_millis(self.retry_delay_ms)).await;
        row.time_ms += 1;
        if self.gateway.insert_review_log(&row).await? {
            return Ok(());
        }
        Err(Error::Library(LibraryError::Scheduler(
            SchedulerErrorKind::LogWriteConflict(row.card_id),
        )))
    }
}
