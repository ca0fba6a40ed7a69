//! Persistence of analysis results into managed uploads.

pub mod store;
pub mod writer;

pub use store::{AddOutcome, FileOperation, LocalUploadStore, ProcessedFile, UploadManifest, UploadStore};
pub use writer::{render_archive, ArchiveReceipt, ArchiveWriter, ARCHIVE_FILE_NAME};
