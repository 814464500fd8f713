//! Host collaborators
//!
//! The host application owns purchase requests, payment profiles and the
//! provider log. The in-memory implementations here back the demo binary
//! and the tests; a real host plugs its own storage in behind the same
//! traits.

pub mod memory;

pub use memory::{MemoryProviderLog, MemoryStore, RecordingCompleter};
