//! Cross-process coordination on disk.

pub mod lockfile;

pub use lockfile::{LockError, OutputLock};
