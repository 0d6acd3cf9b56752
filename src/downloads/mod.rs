pub mod events;
pub mod executor;
pub mod http_fetch;
pub mod progress;
pub mod traits;
pub mod worker;

pub use events::{DownloadEvent, TracingStatusReporter};
pub use executor::{DownloadExecutor, ExecutorSettings};
pub use http_fetch::HttpContentFetch;
pub use progress::{ProgressCheckpoint, ProgressThrottle};
pub use traits::{
    ByteStream, ContentFetch, CredentialProvider, FetchResponse, JobStore, MediaRecordStore,
    StatusReporter,
};
pub use worker::{DownloadWorker, DownloadWorkerHandle, WorkerCommand};
