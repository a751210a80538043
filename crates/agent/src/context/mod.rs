//! Token-budgeted prompt assembly from a session's memory tiers.
//!
//! | Layer | Source | Trim Strategy |
//! |-------|--------|---------------|
//! | System | Character profile, sidecar instructions, deep memory | Never trimmed |
//! | User profile | Session | Whole or nothing |
//! | Scene | Location, date, clothing | Whole or nothing |
//! | Long-Term Memory | Retrieval selector | Lowest-ranked dropped |
//! | History | Relationship milestones | Oldest dropped |
//! | Short-Term | Turn summaries | Oldest dropped |
//! | Recent Turns | Detailed buffer | Oldest dropped |

pub mod assembler;
pub mod token;

pub use assembler::{
    AssembledContext, AssemblyError, AssemblyInput, AssemblyMetadata, ContextAssembler, DropInfo,
    LayerStats, SIDECAR_INSTRUCTIONS, TokenBudget,
};
