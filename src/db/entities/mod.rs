pub mod app_credentials;
pub mod download_jobs;
pub mod media_items;

// Re-export entities for convenience
pub use app_credentials::{
    ActiveModel as AppCredentialActiveModel, Entity as AppCredential, Model as AppCredentialModel,
};
pub use download_jobs::{
    ActiveModel as DownloadJobActiveModel, Entity as DownloadJobEntity,
    Model as DownloadJobModel,
};
pub use media_items::{
    ActiveModel as MediaItemActiveModel, Entity as MediaItemEntity, Model as MediaItemModel,
};
