//! Durable storage shared between invocations
//!
//! Every compile, archive and link invocation writes one sidecar. Two
//! single-value slots live next to them: the current stage and the
//! replacement map accumulated by the preprocessing passes.
//!
//! There is no locking. Distinct steps never share a sidecar name, and the
//! build driver is expected to serialize the stage and preprocessing
//! invocations against the per-file ones. The aggregation pass must only
//! run after every per-file invocation has finished.

mod fs;
mod memory;

pub use fs::FsSidecarStore;
pub use memory::MemorySidecarStore;

use crate::step::StepRecord;
use crate::template::ReplacementMap;
use std::path::PathBuf;
use thiserror::Error;

/// File holding the current stage
pub const STAGE_FILE: &str = "genmf.stage";

/// File holding the accumulated preprocessing replacement map
pub const PREPROC_FILE: &str = "genmf.preproc";

#[derive(Debug, Error)]
pub enum StoreError {
    /// The sidecar does not exist
    #[error("Sidecar not found: {0}")]
    NotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode {what}: {source}")]
    Encode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Storage for step sidecars and the two snapshot slots
pub trait SidecarStore {
    /// Writes `record` under `name`, replacing any previous content
    fn put(&self, name: &str, record: &StepRecord) -> Result<(), StoreError>;

    /// Reads the record stored under `name`.
    ///
    /// Returns [`StoreError::NotFound`] when there is no such sidecar.
    /// Malformed content decodes leniently rather than failing.
    fn get(&self, name: &str) -> Result<StepRecord, StoreError>;

    /// Names of all stored sidecars, in no particular order
    fn list(&self) -> Result<Vec<String>, StoreError>;

    /// Removes a sidecar; removing a missing one succeeds
    fn delete(&self, name: &str) -> Result<(), StoreError>;

    fn read_stage(&self) -> Result<Option<String>, StoreError>;

    fn write_stage(&self, stage: &str) -> Result<(), StoreError>;

    fn read_preproc(&self) -> Result<Option<ReplacementMap>, StoreError>;

    fn write_preproc(&self, replacements: &ReplacementMap) -> Result<(), StoreError>;

    /// Removes both snapshot slots
    fn clear_snapshots(&self) -> Result<(), StoreError>;
}
