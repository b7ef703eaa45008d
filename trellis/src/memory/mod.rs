//! Checkpoint persistence for graph runs.
//!
//! One checkpoint per run id (overwrite semantics): the latest state snapshot
//! plus the last completed node. [`MemorySaver`] for dev and tests,
//! [`SqliteSaver`] for persistence across restarts.

mod checkpoint;
mod memory_saver;
mod sqlite_saver;

pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
pub use memory_saver::MemorySaver;
pub use sqlite_saver::SqliteSaver;
