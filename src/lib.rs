pub mod admin;
pub mod answer;
pub mod clock;
pub mod config;
pub mod gateway;
pub mod interval;
pub mod leech;
pub mod model;
pub mod queue;
pub mod review_log;
pub mod scheduler;

use miette::Diagnostic;
use model::CardId;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Sqlx Error: {source}")]
    Sqlx { source: sqlx::Error },
    #[error("Io Error: {description}, {source}")]
    Io {
        description: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    #[diagnostic(transparent)]
    Library(#[from] LibraryError),
}

/// Note that `LibraryError` is `Clone` while `Error` is not.
#[derive(Clone, Debug, Diagnostic, Error)]
pub enum LibraryError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Scheduler(#[from] SchedulerErrorKind),
    #[error("{0}")]
    InvalidConfig(String),
}

#[derive(Clone, Debug, Diagnostic, Error)]
pub enum SchedulerErrorKind {
    #[error("Card {0} not found.")]
    NotFound(CardId),
    #[error("Card {0} is already buried.")]
    AlreadyBuried(CardId),
    #[error("Cannot bury suspended card {0}.")]
    Suspended(CardId),
    #[error("Card {0} reached the answer handler in an invalid queue state: {1}.")]
    InvalidQueueState(CardId, model::Queue),
    #[error("Invalid rating {0}; expected 1-4.")]
    InvalidRating(u8),
    #[error("No configuration found for group {0}.")]
    MissingGroupConfig(model::GroupId),
    #[error("Review log write conflict on card {0} persisted after retry.")]
    LogWriteConflict(CardId),
}
