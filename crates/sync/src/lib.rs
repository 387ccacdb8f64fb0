//! Replication of per-machine usage stores through a shared remote container.
//!
//! A push exports the local machine's records into one or more bundles,
//! merges its entry into the shared [`Manifest`] and uploads both. A pull
//! reads the manifest and imports every listed machine's bundles into that
//! machine's own local store.

pub mod conflict;
pub mod error;
pub mod export;
pub mod import;
pub mod manifest;
pub mod orchestrator;
pub mod remote;
pub mod token;

pub use conflict::{ConflictResolver, Resolution, MAX_CONFLICT_RETRIES};
pub use error::{RemoteError, Result, SyncError};
pub use export::{ChunkedExporter, ExportPlan, BYTES_PER_RECORD_ESTIMATE, DEFAULT_MAX_FILE_SIZE};
pub use import::{DedupImporter, ImportStats};
pub use manifest::{
    MachineEntry, MachineUpdate, Manifest, ManifestStatistics, MANIFEST_FILENAME,
};
pub use orchestrator::{
    MachinePullStats, PullStats, PushOptions, PushStats, PushStatus, RemoteStatus,
    SyncOrchestrator, SyncSettings, SyncStatus, local_status,
};
pub use remote::{
    Container, ContainerFile, GistClient, MemoryContainer, RemoteContainer, RetryPolicy,
};
pub use token::{require_token, StaticToken, TokenSource};
