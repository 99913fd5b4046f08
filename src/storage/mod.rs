//! Storage routing layer
//!
//! A real object-storage client (Cloudflare R2) and a filesystem mock sit
//! behind a smart router that picks between them per operation, with
//! feature-flag overrides, health-based self-healing, and a migration
//! helper for rolling the router out gradually.

pub mod backend;
pub mod error;
pub mod flags;
pub mod migration;
pub mod mock;
pub mod path;
pub mod r2;
pub mod router;

pub use backend::{
    DeleteResult, FileUpload, MemoryStorageBackend, StorageBackend, StorageMode, UploadOutcome,
    UploadResult,
};
pub use error::StorageError;
pub use flags::{FeatureFlagManager, R2FeatureFlags, StorageModePreference};
pub use migration::{
    compare_delete_results, compare_upload_results, LegacyStorageRouter, MigrationComparison,
    MigrationHealthReport, MigrationRecommendation, StorageMigrationHelper,
};
pub use mock::MockStorageClient;
pub use path::generate_upload_path;
pub use r2::R2Client;
pub use router::{RouterStatus, SmartStorageRouter};
