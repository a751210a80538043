//! # Mnemos Core
//!
//! Domain types, traits, and error definitions for the Mnemos context
//! memory engine. This crate has **no framework dependencies**: it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! External collaborators are traits here, implementations live in their
//! respective crates:
//! - [`Provider`]: the completion oracle (`mnemos-providers`)
//! - [`SummarizationOracle`]: consolidation for compression (`mnemos-memory`)
//! - [`SessionStore`]: durable session snapshots (`mnemos-memory`)
//!
//! The [`MemoryStore`] owns a session's memory tiers and enforces their
//! size invariants without ever awaiting anything.

pub mod error;
pub mod memory;
pub mod message;
pub mod oracle;
pub mod persistence;
pub mod provider;
pub mod session;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{AssemblyError, Error, MemoryError, OracleError, PersistenceError, ProviderError, Result};
pub use memory::{Language, MemoryItem, ShortTermBuffer, ShortTermEntry, Subject, TopicGroup, TopicTag};
pub use message::{Message, Role};
pub use oracle::{PROFILE_DELIMITER, SummarizationOracle};
pub use persistence::SessionStore;
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use session::{Clothing, HistoryEntry, Session, SessionSummary};
pub use store::{CompressionMetadata, MemoryStore, StoreLimits};
