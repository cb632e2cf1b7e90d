//! Pure data types for jobsh: job hand-off specs, identifiers and status.
//!
//! This crate is a leaf dependency with no OS calls and no I/O. The parsing
//! side of a shell produces [`JobSpec`] values; the job-control kernel
//! consumes them and reports back with [`JobInfo`] and [`JobStatus`].

pub mod job;
pub mod spec;

// Flat re-exports for convenience
pub use job::*;
pub use spec::*;
