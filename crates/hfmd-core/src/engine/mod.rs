//! Transfer engine - resumable concurrent file downloads
//!
//! - Partial files staged next to their destination, renamed when complete
//! - One task per file, optional concurrency cap
//! - Single job-wide cancellation token
//! - Byte-level progress through a narrow sink trait

mod coordinator;
mod partial_store;
mod progress;
mod transfer_task;

pub use coordinator::*;
pub use partial_store::*;
pub use progress::*;
pub use transfer_task::*;
