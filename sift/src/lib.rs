//! Splits an uploaded CSV into two gzipped partitions by the value of its
//! `gender` column, bundles both into a single zip archive streamed back to
//! the caller, and broadcasts per-stage progress (`upload`, `parsing`,
//! `gzipMale`, `gzipFemale`) to any number of SSE subscribers while the job
//! is in flight.

pub mod api;
pub mod archive;
pub mod config;
pub mod pipeline;
pub mod progress;
pub mod router;
pub mod server;
pub mod sinks;
pub mod upload;
