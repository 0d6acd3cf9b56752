//! Background media download core: connectivity observation, storage
//! accounting and a retrying single-job download executor.

#![allow(clippy::result_large_err)]

pub mod config;
pub mod connectivity;
pub mod db;
pub mod downloads;
pub mod models;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod test_utils;

pub use config::DownloadConfig;
pub use connectivity::{ConnectivityObserver, NetworkState};
pub use downloads::{DownloadExecutor, DownloadWorker, DownloadWorkerHandle};
pub use models::{DownloadId, DownloadJob, DownloadOutcome, DownloadStatus, MediaItem, MediaItemId};
pub use storage::StorageAccountant;
