//! Cross-cutting runtime services shared by the review pipeline crates.
//!
//! - [`fallback`] — process-wide counter for degraded code paths; every
//!   binary-skip, decode fallback, missing tool or mock substitution is
//!   recorded here and summarized once per session.
//! - [`fs`] — tolerant file reading (binary detection, lossy UTF-8 fallback)
//!   that reports degradations through the tracker instead of failing.
//! - [`ids`] — opaque identifiers (unit ids, trace ids).

pub mod fallback;
pub mod fs;
pub mod ids;

pub use fallback::{FallbackSummary, fallback_tracker, record_fallback};
pub use fs::{read_file_lines, read_text_with_fallback};
pub use ids::{new_trace_id, new_unit_id};
