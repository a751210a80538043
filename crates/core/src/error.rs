//! Error types for the Mnemos domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Mnemos operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider (completion oracle) errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Context assembly errors ---
    #[error("Context assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    // --- Persistence errors ---
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    /// The upstream signalled it is overloaded. The only retryable failure.
    #[error("Provider overloaded: {0}")]
    Overloaded(String),

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether a retry wrapper may try this request again.
    pub fn is_overloaded(&self) -> bool {
        matches!(self, ProviderError::Overloaded(_))
    }
}

/// Failures of the summarization oracle used by compression.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("Oracle call failed: {0}")]
    Call(#[from] ProviderError),

    #[error("Malformed oracle reply: {0}")]
    MalformedReply(String),

    #[error("Oracle returned an empty reply")]
    EmptyReply,
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Unknown memory item: {0}")]
    UnknownItem(String),
}

/// The prompt could not be fitted into the token budget.
#[derive(Debug, Clone, Error)]
pub enum AssemblyError {
    /// The untrimmable layers plus the user message exceed the budget.
    #[error(
        "System prompt ({system_tokens} tokens) + user message ({user_tokens} tokens) exceed budget ({budget} tokens)"
    )]
    BudgetExceeded {
        system_tokens: usize,
        user_tokens: usize,
        budget: usize,
    },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error("Corrupted session snapshot {session_id}: {reason}")]
    Corrupted { session_id: String, reason: String },
}
