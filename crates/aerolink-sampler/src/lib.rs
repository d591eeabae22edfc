//! AeroLink Sampler
//!
//! Collaborators for the device's sampling loop: per-batch accumulation
//! and averaging of readings, the size-based retention heuristic, and
//! the flush step that drives a `TelemetrySink`.

pub mod batch;
pub mod cursor;
pub mod flush;

pub use batch::{BatchAccumulator, Reading};
pub use cursor::RetentionCursor;
pub use flush::{TRIM_BATCH_SIZE, flush_batch};
