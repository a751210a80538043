//! Summarization oracle: the external consolidation collaborator.
//!
//! Compression hands the oracle a snapshot of long-term memory plus the
//! current profiles and gets back compact profile text. The oracle is asked to
//! leave `{literal}` substrings untouched, but callers must verify that
//! themselves.

use async_trait::async_trait;

use crate::error::OracleError;
use crate::memory::MemoryItem;

/// Separates the character segment from the user segment in a consolidation reply.
pub const PROFILE_DELIMITER: &str = "=== USER PROFILE ===";

#[async_trait]
pub trait SummarizationOracle: Send + Sync {
    /// Consolidate memories and profiles into
    /// `<character profile>\n=== USER PROFILE ===\n<user profile>`.
    async fn consolidate(
        &self,
        items: &[MemoryItem],
        character_profile: &str,
        user_profile: &str,
    ) -> Result<String, OracleError>;

    /// Shrink a single profile that grew past the size limit.
    async fn compress_profile(&self, profile: &str) -> Result<String, OracleError>;
}
