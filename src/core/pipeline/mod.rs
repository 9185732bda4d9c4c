//! # Pipeline Module
//!
//! Runs files through three stages, each on its own worker thread:
//! 1. **Hash** - compute the ed2k hash, call `on_hashed`
//! 2. **Lookup** - query the metadata session, decode the status
//!    bitmask, call `on_identified`
//! 3. **Action** - call `on_processed`
//!
//! ## Channels
//! Stages are joined by unbounded FIFO crossbeam channels carrying
//! `StageMessage`s. `shutdown` sends `EndOfStream` into the first
//! channel; each stage passes it on after finishing what is queued.
//!
//! ## Session access
//! Only the lookup stage talks to the session, under a mutex held for
//! one query-decode cycle at a time.

mod executor;
mod message;
mod stages;

pub use executor::{Pipeline, PipelineBuilder, PipelineConfig, PipelineState};
pub use message::{FileTask, StageMessage};
pub use stages::HashFailurePolicy;
