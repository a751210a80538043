//! Compression: consolidating long-term memory into compact profiles.
//!
//! ```text
//!   Idle ──compress()──▶ Compressing ──(any exit)──▶ Idle
//!                            │
//!                            ├─ consolidate(snapshot, profiles)
//!                            ├─ split on the profile delimiter
//!                            ├─ restore dropped {immutable} tokens
//!                            ├─ shrink oversized profiles (best effort)
//!                            └─ swap long-term list, update metadata
//! ```
//!
//! The swap happens only after every required oracle call succeeded, so a
//! failure leaves the session exactly as it was.

pub mod immutable;
pub mod prompts;
pub mod summarizer;

use chrono::Utc;
use mnemos_core::error::OracleError;
use mnemos_core::memory::{Language, MemoryItem, Subject, TopicGroup, TopicTag};
use mnemos_core::oracle::{PROFILE_DELIMITER, SummarizationOracle};
use mnemos_core::session::Session;
use mnemos_core::store::MemoryStore;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

pub use summarizer::ProviderSummarizer;

pub const DEFAULT_FREQUENCY: u32 = 10;
pub const DEFAULT_THRESHOLD: usize = 8;
pub const DEFAULT_PROFILE_BYTE_LIMIT: usize = 3096;

/// Subtopic of the items that replace the long-term list after compression.
pub const PROFILE_SUBTOPIC: &str = "profile";

/// When to compress and how large a profile may get.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionPolicy {
    /// Minimum counted API calls since the last compression
    pub frequency: u32,
    /// Long-term size that must be exceeded
    pub threshold: usize,
    /// Profiles above this many bytes get a second shrinking pass
    pub profile_byte_limit: usize,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            frequency: DEFAULT_FREQUENCY,
            threshold: DEFAULT_THRESHOLD,
            profile_byte_limit: DEFAULT_PROFILE_BYTE_LIMIT,
        }
    }
}

/// Result of a compression attempt. Never an error: failures are reported here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompressionOutcome {
    Compressed {
        memories_before: usize,
        memories_after: usize,
        restored_tokens: usize,
        shrunk_profiles: usize,
    },
    Skipped {
        reason: String,
    },
    InProgress,
    Failed {
        error: String,
    },
}

impl CompressionOutcome {
    pub fn is_compressed(&self) -> bool {
        matches!(self, CompressionOutcome::Compressed { .. })
    }
}

/// Resets the compressing flag on every exit path.
struct CompressingGuard<'a>(&'a AtomicBool);

impl Drop for CompressingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Consolidated {
    character: String,
    user: String,
    restored_tokens: usize,
    shrunk_profiles: usize,
}

pub struct CompressionOrchestrator {
    oracle: Arc<dyn SummarizationOracle>,
    policy: CompressionPolicy,
    compressing: AtomicBool,
}

impl CompressionOrchestrator {
    pub fn new(oracle: Arc<dyn SummarizationOracle>, policy: CompressionPolicy) -> Self {
        Self {
            oracle,
            policy,
            compressing: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> CompressionPolicy {
        self.policy
    }

    pub fn is_compressing(&self) -> bool {
        self.compressing.load(Ordering::Acquire)
    }

    /// The post-turn trigger.
    pub fn should_compress(&self, store: &MemoryStore) -> bool {
        store.compression_enabled()
            && store.metadata().total_api_calls >= self.policy.frequency
            && store.long_term_len() > self.policy.threshold
    }

    /// Compress only when the trigger fires.
    pub async fn maybe_compress(&self, session: &mut Session) -> Option<CompressionOutcome> {
        if !self.should_compress(&session.memory) {
            return None;
        }
        debug!(
            api_calls = session.memory.metadata().total_api_calls,
            long_term = session.memory.long_term_len(),
            "Compression triggered"
        );
        Some(self.compress(session).await)
    }

    /// Compress unconditionally. A call while another is running returns `InProgress`.
    pub async fn compress(&self, session: &mut Session) -> CompressionOutcome {
        if self
            .compressing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Compression already running, rejecting");
            return CompressionOutcome::InProgress;
        }
        let _guard = CompressingGuard(&self.compressing);

        let snapshot = session.memory.long_term_snapshot();
        if snapshot.is_empty() {
            return CompressionOutcome::Skipped {
                reason: "long-term memory is empty".into(),
            };
        }

        let consolidated = match self
            .consolidate(&snapshot, &session.character_profile, &session.user_profile)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, items = snapshot.len(), "Compression failed, memory left unchanged");
                return CompressionOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        let items = profile_items(&consolidated.character, &consolidated.user, session.language);
        let memories_before = snapshot.len();
        let memories_after = items.len();
        session.memory.apply_compression(items, memories_before, Utc::now());
        session.character_profile = consolidated.character;
        session.user_profile = consolidated.user;
        session.touch();

        info!(
            memories_before,
            memories_after,
            restored_tokens = consolidated.restored_tokens,
            shrunk_profiles = consolidated.shrunk_profiles,
            "Long-term memory compressed"
        );

        CompressionOutcome::Compressed {
            memories_before,
            memories_after,
            restored_tokens: consolidated.restored_tokens,
            shrunk_profiles: consolidated.shrunk_profiles,
        }
    }

    async fn consolidate(
        &self,
        snapshot: &[MemoryItem],
        character_profile: &str,
        user_profile: &str,
    ) -> Result<Consolidated, OracleError> {
        let reply = self
            .oracle
            .consolidate(snapshot, character_profile, user_profile)
            .await?;
        let (character_segment, user_segment) = split_profiles(&reply)?;

        let mut character_required = immutable::tokens(character_profile);
        let mut user_required = immutable::tokens(user_profile);
        let mut shared = Vec::new();
        for item in snapshot {
            let target = match item.effective_topic().map(|tag| tag.group) {
                Some(TopicGroup::CharacterIdentity) => &mut character_required,
                Some(TopicGroup::UserIdentity) => &mut user_required,
                _ => &mut shared,
            };
            for token in immutable::tokens(&item.content) {
                if !target.contains(&token) {
                    target.push(token);
                }
            }
        }

        let (character, character_restored) =
            immutable::restore(&character_segment, &character_required);
        // Tokens not tied to either identity may live in either profile.
        for token in shared {
            if !character.contains(token) && !user_required.contains(&token) {
                user_required.push(token);
            }
        }
        let (user, user_restored) = immutable::restore(&user_segment, &user_required);

        let (character, character_shrunk) = self.shrink(character, Subject::Character).await;
        let (user, user_shrunk) = self.shrink(user, Subject::User).await;

        Ok(Consolidated {
            character,
            user,
            restored_tokens: character_restored + user_restored,
            shrunk_profiles: usize::from(character_shrunk) + usize::from(user_shrunk),
        })
    }

    /// Second stage for oversized profiles. Failure keeps the input.
    async fn shrink(&self, profile: String, subject: Subject) -> (String, bool) {
        if profile.len() <= self.policy.profile_byte_limit {
            return (profile, false);
        }
        match self.oracle.compress_profile(&profile).await {
            Ok(shorter) => {
                let required = immutable::tokens(&profile);
                let (shorter, restored) = immutable::restore(shorter.trim(), &required);
                debug!(
                    ?subject,
                    before = profile.len(),
                    after = shorter.len(),
                    restored,
                    "Profile shrunk"
                );
                (shorter, true)
            }
            Err(e) => {
                warn!(?subject, error = %e, bytes = profile.len(), "Profile shrinking failed, keeping consolidated profile");
                (profile, false)
            }
        }
    }
}

/// Split a consolidation reply into (character, user) segments.
pub fn split_profiles(reply: &str) -> Result<(String, String), OracleError> {
    let (character, user) = reply.split_once(PROFILE_DELIMITER).ok_or_else(|| {
        OracleError::MalformedReply(format!("missing {PROFILE_DELIMITER:?} delimiter"))
    })?;
    let character = character.trim();
    let character = character
        .strip_prefix(prompts::CHARACTER_HEADER)
        .unwrap_or(character)
        .trim();
    if character.is_empty() {
        return Err(OracleError::MalformedReply("empty character profile".into()));
    }
    Ok((character.to_string(), user.trim().to_string()))
}

/// At most two compressed items, one per non-empty profile.
fn profile_items(character: &str, user: &str, language: Language) -> Vec<MemoryItem> {
    [(Subject::Character, character), (Subject::User, user)]
        .into_iter()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(subject, text)| {
            let tag = TopicTag::new(TopicGroup::identity_of(subject), PROFILE_SUBTOPIC);
            MemoryItem::new(format!("{tag}\n{text}"), language)
                .with_topic(tag)
                .with_importance(1.0)
                .compressed()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mnemos_core::error::ProviderError;
    use mnemos_core::store::StoreLimits;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Oracle that replays queued replies and counts calls.
    #[derive(Default)]
    struct ScriptedOracle {
        consolidations: Mutex<VecDeque<Result<String, OracleError>>>,
        shrinks: Mutex<VecDeque<Result<String, OracleError>>>,
        consolidate_calls: Mutex<usize>,
        shrink_calls: Mutex<usize>,
    }

    impl ScriptedOracle {
        fn consolidating(replies: Vec<Result<String, OracleError>>) -> Arc<Self> {
            Arc::new(Self {
                consolidations: Mutex::new(replies.into()),
                ..Default::default()
            })
        }

        fn with_shrinks(self: Arc<Self>, replies: Vec<Result<String, OracleError>>) -> Arc<Self> {
            *self.shrinks.lock().unwrap() = replies.into();
            self
        }

        fn consolidate_calls(&self) -> usize {
            *self.consolidate_calls.lock().unwrap()
        }

        fn shrink_calls(&self) -> usize {
            *self.shrink_calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl SummarizationOracle for ScriptedOracle {
        async fn consolidate(&self, _: &[MemoryItem], _: &str, _: &str) -> Result<String, OracleError> {
            *self.consolidate_calls.lock().unwrap() += 1;
            self.consolidations
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(OracleError::EmptyReply))
        }

        async fn compress_profile(&self, _: &str) -> Result<String, OracleError> {
            *self.shrink_calls.lock().unwrap() += 1;
            self.shrinks
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(OracleError::EmptyReply))
        }
    }

    fn reply(character: &str, user: &str) -> Result<String, OracleError> {
        Ok(format!("{character}\n{PROFILE_DELIMITER}\n{user}"))
    }

    fn session_with_items(count: usize) -> Session {
        let mut session = Session::new("s1", StoreLimits::default())
            .with_profiles("IDENTITY: name {Mira}, nurse", "IDENTITY: name {Alex}");
        for i in 0..count {
            session
                .memory
                .append_long_term(MemoryItem::new(format!("[CONVERSATION_THREADS:ongoing] fact {i}"), Language::En));
        }
        session
    }

    fn policy(threshold: usize) -> CompressionPolicy {
        CompressionPolicy {
            frequency: 10,
            threshold,
            profile_byte_limit: DEFAULT_PROFILE_BYTE_LIMIT,
        }
    }

    #[test]
    fn trigger_needs_calls_and_size() {
        let orchestrator = CompressionOrchestrator::new(ScriptedOracle::consolidating(vec![]), policy(5));
        let mut store = MemoryStore::default();
        for i in 0..6 {
            store.append_long_term(MemoryItem::new(format!("fact {i}"), Language::En));
        }
        // 6 items counted, 6 calls
        assert!(!orchestrator.should_compress(&store));
        for _ in 0..4 {
            store.track_api_call();
        }
        assert!(orchestrator.should_compress(&store));

        let mut disabled = MemoryStore::new(StoreLimits {
            compression_enabled: false,
            ..StoreLimits::default()
        });
        for i in 0..20 {
            disabled.append_long_term(MemoryItem::new(format!("fact {i}"), Language::En));
            disabled.track_api_call();
        }
        assert!(!orchestrator.should_compress(&disabled));
    }

    #[tokio::test]
    async fn eight_items_ten_calls_compresses_exactly_once() {
        let oracle = ScriptedOracle::consolidating(vec![
            reply("IDENTITY: {Mira}, nurse", "IDENTITY: {Alex}"),
            reply("IDENTITY: {Mira}", "IDENTITY: {Alex}"),
        ]);
        let orchestrator = CompressionOrchestrator::new(oracle.clone(), policy(5));
        let mut session = session_with_items(8);

        let mut compressions = 0;
        for _ in 0..10 {
            session.memory.track_api_call();
            if let Some(outcome) = orchestrator.maybe_compress(&mut session).await {
                assert!(outcome.is_compressed(), "{outcome:?}");
                assert_eq!(session.memory.metadata().total_api_calls, 0);
                compressions += 1;
            }
        }

        assert_eq!(compressions, 1);
        assert_eq!(oracle.consolidate_calls(), 1);
        assert!(session.memory.long_term_len() <= 2);
        let meta = session.memory.metadata();
        assert_eq!(meta.compression_count, 1);
        assert_eq!(meta.memories_before_last_compression, 8);
        assert_eq!(meta.memories_after_last_compression, 2);
        assert!(meta.last_compression_time.is_some());
        assert!(session.memory.long_term().iter().all(|item| item.compressed));
        assert_eq!(session.user_profile, "IDENTITY: {Alex}");
    }

    #[tokio::test]
    async fn oracle_http_error_leaves_memory_untouched() {
        let oracle = ScriptedOracle::consolidating(vec![Err(OracleError::Call(ProviderError::ApiError {
            status_code: 500,
            message: "Internal Server Error".into(),
        }))]);
        let orchestrator = CompressionOrchestrator::new(oracle, policy(5));
        let mut session = session_with_items(8);
        let before = serde_json::to_string(&session.memory).unwrap();
        let profile_before = session.character_profile.clone();

        let outcome = orchestrator.compress(&mut session).await;

        match outcome {
            CompressionOutcome::Failed { error } => assert!(error.contains("500")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(serde_json::to_string(&session.memory).unwrap(), before);
        assert_eq!(session.memory.metadata().compression_count, 0);
        assert_eq!(session.character_profile, profile_before);
        assert!(!orchestrator.is_compressing());
    }

    #[tokio::test]
    async fn reply_without_delimiter_is_a_failure() {
        let oracle = ScriptedOracle::consolidating(vec![Ok("IDENTITY: {Mira}".into())]);
        let orchestrator = CompressionOrchestrator::new(oracle, policy(5));
        let mut session = session_with_items(3);

        let outcome = orchestrator.compress(&mut session).await;
        assert!(matches!(outcome, CompressionOutcome::Failed { .. }));
        assert_eq!(session.memory.long_term_len(), 3);
    }

    #[tokio::test]
    async fn empty_long_term_is_skipped() {
        let oracle = ScriptedOracle::consolidating(vec![]);
        let orchestrator = CompressionOrchestrator::new(oracle.clone(), policy(5));
        let mut session = session_with_items(0);

        let outcome = orchestrator.compress(&mut session).await;
        assert!(matches!(outcome, CompressionOutcome::Skipped { .. }));
        assert_eq!(oracle.consolidate_calls(), 0);
    }

    #[tokio::test]
    async fn immutable_tokens_survive_chained_compressions() {
        let oracle = ScriptedOracle::consolidating(vec![
            // drops {27} from the character profile and {Alex} from the user profile
            reply("IDENTITY: name {Mira}, nurse", "PREFERENCES: tea; jazz"),
            // drops {Mira}, keeps nothing braced
            reply("=== CHARACTER PROFILE ===\nIDENTITY: nurse | 27", "PREFERENCES: tea"),
        ]);
        let orchestrator = CompressionOrchestrator::new(oracle, policy(5));
        let mut session = Session::new("s1", StoreLimits::default())
            .with_profiles("IDENTITY: name {Mira}, age {27}", "IDENTITY: name {Alex}");
        session.memory.append_long_term(
            MemoryItem::new("[CHARACTER_IDENTITY:core] scar {left cheek}", Language::En),
        );
        session
            .memory
            .append_long_term(MemoryItem::new("[RELATIONSHIP:milestones] met at {Harbor Cafe}", Language::En));

        let first = orchestrator.compress(&mut session).await;
        assert!(matches!(first, CompressionOutcome::Compressed { restored_tokens: 4, .. }), "{first:?}");
        assert_eq!(session.character_profile, "IDENTITY: name {Mira}, nurse, {27}, {left cheek}");
        assert_eq!(session.user_profile, "PREFERENCES: tea; jazz; {Alex}; {Harbor Cafe}");

        session
            .memory
            .append_long_term(MemoryItem::new("[USER_IDENTITY:core] born {1990-04-02}", Language::En));
        let second = orchestrator.compress(&mut session).await;
        assert!(second.is_compressed(), "{second:?}");

        for token in ["{Mira}", "{27}", "{left cheek}"] {
            assert!(session.character_profile.contains(token), "{token} lost: {}", session.character_profile);
        }
        for token in ["{Alex}", "{Harbor Cafe}", "{1990-04-02}"] {
            assert!(session.user_profile.contains(token), "{token} lost: {}", session.user_profile);
        }
        assert!(session.character_profile.starts_with("IDENTITY: nurse | 27 | {Mira}"));
    }

    #[tokio::test]
    async fn oversized_profile_gets_a_second_pass() {
        let long = format!("IDENTITY: {{Mira}}, {}", "detail, ".repeat(20));
        let oracle = ScriptedOracle::consolidating(vec![reply(&long, "IDENTITY: {Alex}")])
            .with_shrinks(vec![Ok("IDENTITY: nurse".into())]);
        let orchestrator = CompressionOrchestrator::new(
            oracle.clone(),
            CompressionPolicy {
                profile_byte_limit: 64,
                ..policy(5)
            },
        );
        let mut session = session_with_items(2);

        let outcome = orchestrator.compress(&mut session).await;
        assert!(matches!(outcome, CompressionOutcome::Compressed { shrunk_profiles: 1, .. }), "{outcome:?}");
        assert_eq!(oracle.shrink_calls(), 1);
        assert_eq!(session.character_profile, "IDENTITY: nurse, {Mira}");
    }

    #[tokio::test]
    async fn failed_second_pass_keeps_first_stage_result() {
        let long = format!("IDENTITY: {{Mira}}, {}", "detail, ".repeat(20));
        let oracle = ScriptedOracle::consolidating(vec![reply(&long, "IDENTITY: {Alex}")])
            .with_shrinks(vec![Err(OracleError::EmptyReply)]);
        let orchestrator = CompressionOrchestrator::new(
            oracle,
            CompressionPolicy {
                profile_byte_limit: 64,
                ..policy(5)
            },
        );
        let mut session = session_with_items(2);

        let outcome = orchestrator.compress(&mut session).await;
        assert!(matches!(outcome, CompressionOutcome::Compressed { shrunk_profiles: 0, .. }));
        assert_eq!(session.character_profile, long.trim());
        assert_eq!(session.memory.metadata().compression_count, 1);
    }

    /// Oracle that parks inside `consolidate` until released.
    struct GateOracle {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl SummarizationOracle for GateOracle {
        async fn consolidate(&self, _: &[MemoryItem], _: &str, _: &str) -> Result<String, OracleError> {
            self.entered.notify_one();
            self.release.notified().await;
            reply("IDENTITY: {Mira}", "IDENTITY: {Alex}")
        }

        async fn compress_profile(&self, profile: &str) -> Result<String, OracleError> {
            Ok(profile.to_string())
        }
    }

    #[tokio::test]
    async fn second_call_while_compressing_is_rejected() {
        let oracle = Arc::new(GateOracle {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let orchestrator = CompressionOrchestrator::new(oracle.clone(), policy(5));
        let mut first_session = session_with_items(3);
        let mut second_session = session_with_items(3);

        let first = orchestrator.compress(&mut first_session);
        let second = async {
            oracle.entered.notified().await;
            assert!(orchestrator.is_compressing());
            let outcome = orchestrator.compress(&mut second_session).await;
            oracle.release.notify_one();
            outcome
        };
        let (first, second) = tokio::join!(first, second);

        assert!(first.is_compressed());
        assert_eq!(second, CompressionOutcome::InProgress);
        assert!(!orchestrator.is_compressing());
        assert_eq!(second_session.memory.long_term_len(), 3);
    }

    #[test]
    fn split_handles_header_and_rejects_empty_character() {
        let (c, u) = split_profiles("=== CHARACTER PROFILE ===\nIDENTITY: x\n=== USER PROFILE ===\n").unwrap();
        assert_eq!(c, "IDENTITY: x");
        assert_eq!(u, "");
        assert!(split_profiles("\n=== USER PROFILE ===\nIDENTITY: y").is_err());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(CompressionOutcome::Failed { error: "boom".into() }).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "boom");
    }
}
