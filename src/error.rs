use thiserror::Error;

/// Errors raised while creating rooms, reading them back, or writing cells.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Room {0} does not exist")]
    RoomNotFound(String),
    #[error("Unknown puzzle: {0}")]
    UnknownPuzzle(String),
    #[error("Invalid cell value {0:?}, expected a single letter or nothing")]
    InvalidValue(String),
    #[error("Cell ({row}, {col}) is outside the grid")]
    OutOfBounds { row: i32, col: i32 },
    #[error("Cell ({row}, {col}) holds a question")]
    NotALetterCell { row: i32, col: i32 },
    #[error("Corrupt puzzle document: {0}")]
    Document(#[from] serde_json::Error),
    #[cfg(feature = "ssr")]
    #[error("Storage error: {0}")]
    Storage(#[from] diesel::result::Error),
    #[cfg(feature = "ssr")]
    #[error("Connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),
    #[cfg(feature = "ssr")]
    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("Migration failed: {0}")]
    Migration(String),
}

impl SyncError {
    /// True when the request itself was wrong, as opposed to the server failing to serve it.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SyncError::RoomNotFound(_)
                | SyncError::UnknownPuzzle(_)
                | SyncError::InvalidValue(_)
                | SyncError::OutOfBounds { .. }
                | SyncError::NotALetterCell { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::RoomNotFound(_))
    }
}

/// Failure reported by a single change handler. Never propagated past the notifier.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Subscriber is gone")]
    Disconnected,
    #[error("Handler failed: {0}")]
    Failed(String),
    #[error("Handler panicked: {0}")]
    Panicked(String),
}
