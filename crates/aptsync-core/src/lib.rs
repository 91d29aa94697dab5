use error::SyncError;

pub mod error;
pub mod report;
pub mod store;

pub type SyncResult<T> = std::result::Result<T, SyncError>;
