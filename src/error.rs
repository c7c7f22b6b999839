use thiserror::Error;

use crate::models::trip::TripStatus;
use crate::services::remote::RemoteError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("stored record is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("no actor is logged in on this device")]
    NoActor,
    #[error("no actor or trips stored on this device")]
    NoTrips,
    #[error("trip {0} not found")]
    TripNotFound(String),
    #[error("trip {0} is already stored")]
    DuplicateTrip(String),
    #[error("trip cannot move from {from} to {to}")]
    InvalidTransition { from: TripStatus, to: TripStatus },
    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),
    #[error("distance must be a finite, non-negative number of kilometres")]
    InvalidDistance,
    #[error("credential error: {0}")]
    Credential(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
