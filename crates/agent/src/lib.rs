//! The conversation engine for Mnemos.
//!
//! Each turn flows through the memory engine:
//!
//! 1. **Load** the session (created on first contact)
//! 2. **Retrieve** long-term items and **assemble** a token-budgeted prompt
//! 3. **Complete** via the configured provider
//! 4. **Extract** the reply's sidecar and file new facts, summaries and scene state
//! 5. **Compress** long-term memory when the trigger fires
//! 6. **Persist** the snapshot
//!
//! The engine never talks HTTP itself; providers and session stores are
//! injected as trait objects.

pub mod context;
pub mod engine;

pub use context::{
    AssembledContext, AssemblyError, AssemblyInput, AssemblyMetadata, ContextAssembler, DropInfo,
    LayerStats, TokenBudget,
};
pub use engine::{ConversationEngine, EngineSettings, TurnOutcome};
