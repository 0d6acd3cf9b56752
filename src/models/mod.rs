mod download;
mod identifiers;

pub use download::{DownloadJob, DownloadOutcome, DownloadStatus, MediaItem};
pub use identifiers::{DownloadId, MediaItemId};
