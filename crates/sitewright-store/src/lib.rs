//! Filesystem layer for the Sitewright factory: atomic per-client artifacts,
//! advisory locks with staleness eviction, and the failure-learning store.

pub mod artifact;
pub mod lock;
pub mod memory;

pub use artifact::{atomic_write, pending_clients, ClientWorkspace};
pub use lock::{LockGuard, LockManager};
pub use memory::{CompiledRule, CompiledRules, LearningStore, MemoryStats};
