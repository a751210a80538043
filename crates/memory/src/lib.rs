//! Memory engine for Mnemos.
//!
//! - [`sidecar`]: pulls the trailing JSON sidecar out of a model reply
//! - [`categorizer`] + [`rules`]: topic tagging and importance scoring
//! - [`retrieval`]: chooses which long-term items reach the prompt
//! - [`compression`]: consolidates long-term memory through the summarization oracle
//! - [`persistence`]: session stores (file, in-memory, LRU-cached)

pub mod categorizer;
pub mod compression;
pub mod persistence;
pub mod retrieval;
pub mod rules;
pub mod sidecar;

pub use categorizer::Categorizer;
pub use compression::{
    CompressionOrchestrator, CompressionOutcome, CompressionPolicy, ProviderSummarizer,
};
pub use persistence::{CachedSessionStore, FileSessionStore, InMemorySessionStore, open_store};
pub use retrieval::RetrievalSelector;
pub use rules::{Bucket, RuleSet};
pub use sidecar::{SidecarUpdate, extract, strip_sidecar};
