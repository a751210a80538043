//! The per-turn conversation pipeline.
//!
//! One call to [`ConversationEngine::send_message`]:
//!
//! 1. Load the session (or create it on first contact)
//! 2. Retrieve long-term items and assemble the prompt
//! 3. Ask the completion provider
//! 4. Pull the sidecar out of the reply and file what it carries
//! 5. Count the call and compress if the trigger fires
//! 6. Persist the snapshot
//!
//! Turns for the same session are serialized; different sessions run in
//! parallel and share nothing mutable.

use chrono::{DateTime, Utc};
use mnemos_config::AppConfig;
use mnemos_core::error::{Error, PersistenceError, Result};
use mnemos_core::memory::{Language, ShortTermEntry, Subject};
use mnemos_core::oracle::SummarizationOracle;
use mnemos_core::persistence::{SessionStore, validate_session_id};
use mnemos_core::provider::{Provider, ProviderRequest};
use mnemos_core::session::{Session, SessionSummary};
use mnemos_core::store::StoreLimits;
use mnemos_memory::compression::{CompressionOrchestrator, CompressionOutcome, CompressionPolicy};
use mnemos_memory::{Categorizer, ProviderSummarizer, RetrievalSelector, SidecarUpdate, strip_sidecar};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::context::{AssemblyInput, ContextAssembler, TokenBudget};

/// Short-term summaries synthesized from the user message are cut to this many chars.
const FALLBACK_SUMMARY_CHARS: usize = 160;

/// Engine knobs, usually taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retrieved_items: usize,
    pub token_budget: usize,
    pub language: Language,
    pub limits: StoreLimits,
    pub policy: CompressionPolicy,
    /// Profiles given to sessions on first contact.
    pub character_profile: String,
    pub user_profile: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: config.default_max_tokens,
            max_retrieved_items: config.memory.max_retrieved_items,
            token_budget: config.memory.context_token_budget,
            language: config.memory.language,
            limits: config.store_limits(),
            policy: CompressionPolicy {
                frequency: config.compression.frequency,
                threshold: config.compression.threshold,
                profile_byte_limit: config.compression.profile_byte_limit,
            },
            character_profile: config.profiles.character_profile.clone(),
            user_profile: config.profiles.user_profile.clone(),
        }
    }
}

/// What one turn produced.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub session_id: String,
    /// The reply with the sidecar removed.
    pub reply: String,
    pub sidecar_found: bool,
    /// Long-term facts filed this turn.
    pub facts_stored: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<CompressionOutcome>,
    /// Whether the durable write succeeded. The cache is updated either way.
    pub persisted: bool,
}

/// Per-session serialization point and compression guard.
struct SessionSlot {
    turn: Mutex<()>,
    compressor: CompressionOrchestrator,
}

pub struct ConversationEngine {
    provider: Arc<dyn Provider>,
    oracle: Arc<dyn SummarizationOracle>,
    store: Arc<dyn SessionStore>,
    categorizer: Categorizer,
    selector: RetrievalSelector,
    assembler: ContextAssembler,
    settings: EngineSettings,
    slots: Mutex<HashMap<String, Arc<SessionSlot>>>,
}

impl ConversationEngine {
    pub fn new(
        provider: Arc<dyn Provider>,
        oracle: Arc<dyn SummarizationOracle>,
        store: Arc<dyn SessionStore>,
        settings: EngineSettings,
    ) -> Self {
        let categorizer = Categorizer::new();
        Self {
            provider,
            oracle,
            store,
            selector: RetrievalSelector::new(categorizer.clone()),
            categorizer,
            assembler: ContextAssembler::new(TokenBudget {
                total: settings.token_budget,
            }),
            settings,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Wire the engine from configuration. Compression talks to the same provider.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let oracle = ProviderSummarizer::new(provider.clone(), config.compression_model())
            .with_max_tokens(config.compression.max_tokens)
            .with_language(config.memory.language)
            .with_profile_byte_limit(config.compression.profile_byte_limit);
        Self::new(provider, Arc::new(oracle), store, EngineSettings::from_config(config))
    }

    /// Swap the categorizer, e.g. one carrying extra rule tables.
    pub fn with_categorizer(mut self, categorizer: Categorizer) -> Self {
        self.selector = RetrievalSelector::new(categorizer.clone());
        self.categorizer = categorizer;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run one conversational turn.
    ///
    /// Only a failed completion is an error. Extraction, compression and
    /// persistence problems are logged and reported in the outcome.
    pub async fn send_message(&self, session_id: &str, text: &str) -> Result<TurnOutcome> {
        validate_session_id(session_id)?;
        let slot = self.slot(session_id).await;
        let outcome = {
            let _turn = slot.turn.lock().await;
            self.run_turn(&slot.compressor, session_id, text)
                .instrument(info_span!("turn", session_id))
                .await
        };
        self.release(session_id, slot).await;
        outcome
    }

    async fn run_turn(
        &self,
        compressor: &CompressionOrchestrator,
        session_id: &str,
        text: &str,
    ) -> Result<TurnOutcome> {
        let mut session = self.load_or_create(session_id).await?;
        let now = Utc::now();

        let memories = self
            .selector
            .retrieve(&mut session.memory, self.settings.max_retrieved_items, now);
        let context = self
            .assembler
            .assemble(&AssemblyInput {
                session: &session,
                memories: &memories,
                user_message: text,
            })?;
        debug!(
            retrieved = memories.len(),
            tokens = context.metadata.total_tokens,
            dropped_layers = context.metadata.drops.len(),
            "Context assembled"
        );

        let request = ProviderRequest::new(self.settings.model.clone(), context.into_messages())
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens);
        let response = self.provider.complete(request).await.map_err(|e| {
            warn!(error = %e, "Completion failed, session left unchanged");
            e
        })?;

        let raw = response.message.content;
        let update = SidecarUpdate::parse(&raw);
        let reply = strip_sidecar(&raw);
        if update.is_empty() {
            debug!("Reply carried no usable sidecar");
        }
        let facts_stored = self.apply_update(&mut session, &update, text, &reply, now);

        session.memory.track_api_call();
        let compression = compressor.maybe_compress(&mut session).await;
        session.touch();
        let persisted = self.persist(&session).await;

        info!(
            facts_stored,
            long_term = session.memory.long_term_len(),
            api_calls = session.memory.metadata().total_api_calls,
            compressed = compression.as_ref().is_some_and(CompressionOutcome::is_compressed),
            persisted,
            "Turn complete"
        );

        Ok(TurnOutcome {
            session_id: session.id,
            reply,
            sidecar_found: !update.is_empty(),
            facts_stored,
            compression,
            persisted,
        })
    }

    /// File everything the sidecar carried. Returns the number of long-term facts stored.
    fn apply_update(
        &self,
        session: &mut Session,
        update: &SidecarUpdate,
        user_text: &str,
        reply: &str,
        now: DateTime<Utc>,
    ) -> usize {
        let language = session.language;
        let mut stored = 0;
        for (subject, facts) in [
            (Subject::Character, &update.long_term_char),
            (Subject::User, &update.long_term_user),
        ] {
            for fact in facts.iter().flat_map(|f| split_facts(f)) {
                let item = self.categorizer.categorize_for(fact, language, subject);
                debug!(?subject, importance = item.importance, content = %item.content, "Long-term fact filed");
                session.memory.append_long_term(item);
                stored += 1;
            }
        }

        let summary = update
            .short_term
            .clone()
            .unwrap_or_else(|| fallback_summary(user_text));
        session.memory.append_short_term(
            ShortTermEntry::new(summary).with_detailed(format!("User: {}\nYou: {}", user_text.trim(), reply)),
        );

        if let Some(change) = &update.history {
            if session.record_history(change, now) {
                debug!(change = %change, "Relationship milestone recorded");
            }
        }
        if let Some(location) = &update.location {
            session.location = Some(location.clone());
        }
        if let Some(date) = &update.date {
            session.date = Some(date.clone());
        }
        if let Some(clothing) = &update.clothing_char {
            session.clothing.char = Some(clothing.clone());
        }
        if let Some(clothing) = &update.clothing_user {
            session.clothing.user = Some(clothing.clone());
        }
        stored
    }

    // ── Session management ──

    /// A snapshot of the session, `None` if it never existed.
    pub async fn session(&self, session_id: &str) -> Result<Option<Session>> {
        validate_session_id(session_id)?;
        Ok(self.store.load(session_id).await?)
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        Ok(self.store.list().await?)
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        validate_session_id(session_id)?;
        let slot = self.slot(session_id).await;
        let deleted = {
            let _turn = slot.turn.lock().await;
            self.store.delete(session_id).await
        };
        self.release(session_id, slot).await;
        let deleted = deleted?;
        info!(session_id, deleted, "Session deleted");
        Ok(deleted)
    }

    /// Empty both short-term buffers. Long-term and deep memory are kept.
    pub async fn clear_short_term(&self, session_id: &str) -> Result<()> {
        self.mutate(session_id, |session| session.memory.clear_short_term())
            .await
    }

    /// Drop all long-term items. Returns how many were removed.
    pub async fn clear_long_term(&self, session_id: &str) -> Result<usize> {
        self.mutate(session_id, |session| session.memory.clear_long_term())
            .await
    }

    pub async fn set_deep_memory(&self, session_id: &str, text: &str) -> Result<()> {
        self.mutate(session_id, |session| session.memory.set_deep_memory(text))
            .await
    }

    pub async fn deep_memory(&self, session_id: &str) -> Result<String> {
        Ok(self
            .session(session_id)
            .await?
            .map(|s| s.memory.deep_memory().to_string())
            .unwrap_or_default())
    }

    /// Compress now, ignoring the trigger.
    pub async fn compress_now(&self, session_id: &str) -> Result<CompressionOutcome> {
        validate_session_id(session_id)?;
        let slot = self.slot(session_id).await;
        let outcome = {
            let _turn = slot.turn.lock().await;
            async {
                let mut session = self.load_or_create(session_id).await?;
                let outcome = slot.compressor.compress(&mut session).await;
                if outcome.is_compressed() {
                    self.persist(&session).await;
                }
                Ok::<_, Error>(outcome)
            }
            .instrument(info_span!("compress", session_id))
            .await
        };
        self.release(session_id, slot).await;
        outcome
    }

    async fn mutate<R>(&self, session_id: &str, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
        validate_session_id(session_id)?;
        let slot = self.slot(session_id).await;
        let result = async {
            let _turn = slot.turn.lock().await;
            let mut session = self.load_or_create(session_id).await?;
            let result = f(&mut session);
            session.touch();
            self.persist(&session).await;
            Ok::<_, Error>(result)
        }
        .await;
        self.release(session_id, slot).await;
        result
    }

    /// Sessions with a turn or memory command running or queued.
    pub async fn active_sessions(&self) -> usize {
        self.slots.lock().await.len()
    }

    async fn slot(&self, session_id: &str) -> Arc<SessionSlot> {
        let mut slots = self.slots.lock().await;
        slots
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(SessionSlot {
                    turn: Mutex::new(()),
                    compressor: CompressionOrchestrator::new(self.oracle.clone(), self.settings.policy),
                })
            })
            .clone()
    }

    /// Forget the session's slot once no caller holds or waits on it.
    async fn release(&self, session_id: &str, slot: Arc<SessionSlot>) {
        let mut slots = self.slots.lock().await;
        // Clones are only taken under this lock, so the count cannot grow here.
        let idle = Arc::strong_count(&slot) == 2
            && slots.get(session_id).is_some_and(|held| Arc::ptr_eq(held, &slot));
        if idle {
            slots.remove(session_id);
        }
    }

    async fn load_or_create(&self, session_id: &str) -> Result<Session> {
        match self.store.load(session_id).await {
            Ok(Some(mut session)) => {
                session.memory.apply_limits(self.settings.limits);
                Ok(session)
            }
            Ok(None) => {
                info!(session_id, "Creating session on first contact");
                Ok(self.new_session(session_id))
            }
            Err(PersistenceError::Corrupted { session_id: id, reason }) => {
                warn!(session_id = %id, reason = %reason, "Stored session is unreadable, starting fresh");
                Ok(self.new_session(session_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn new_session(&self, session_id: &str) -> Session {
        Session::new(session_id, self.settings.limits)
            .with_language(self.settings.language)
            .with_profiles(
                self.settings.character_profile.clone(),
                self.settings.user_profile.clone(),
            )
    }

    /// Save, logging instead of failing. The cache keeps the snapshot either way.
    async fn persist(&self, session: &Session) -> bool {
        match self.store.save(session).await {
            Ok(()) => true,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Session not persisted");
                false
            }
        }
    }
}

/// One sidecar field may carry several facts, one per line.
fn split_facts(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(|line| line.trim().trim_start_matches(['-', '*', '•']).trim())
        .filter(|line| !line.is_empty())
}

fn fallback_summary(user_text: &str) -> String {
    let text = user_text.trim();
    match text.char_indices().nth(FALLBACK_SUMMARY_CHARS) {
        Some((cut, _)) => format!("User said: {}…", &text[..cut]),
        None => format!("User said: {text}"),
    }
}
