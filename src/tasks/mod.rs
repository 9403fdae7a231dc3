//! Background Tasks Module
//!
//! Detached work that outlives the call that started it.
//!
//! # Tasks
//! - TTL Cleanup: Removes expired entries from the in-memory store at configured intervals
//! - Fire-and-forget: Runs cache population and eviction jobs without blocking the caller

mod background;
mod cleanup;

pub use background::fire_and_forget;
pub use cleanup::spawn_cleanup_task;
