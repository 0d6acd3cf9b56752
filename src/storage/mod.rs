pub mod accountant;

pub use accountant::{FilesystemStats, OsFilesystemStats, StorageAccountant, StorageSnapshot};
