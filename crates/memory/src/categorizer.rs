//! Fact categorization and importance scoring.
//!
//! New long-term facts are filed under a [`TopicTag`] and given a
//! deterministic importance score:
//!
//! 1. A fact that already starts with `[GROUP]` / `[GROUP:subtopic]` keeps its
//!    tag verbatim.
//! 2. Otherwise the first matching keyword bucket (appearance, identity,
//!    preferences, relationship) decides the tag and the content is rewritten
//!    with that tag as a prefix.
//! 3. Nothing matched: `[CONVERSATION_THREADS:ongoing]`.
//!
//! Scoring: appearance under an identity group is 0.9, a `core` subtopic is
//! 0.8, anything else starts at 0.5 and adds 0.2 for emphasis words, 0.2 for
//! relationship words, 0.1 for preference words and 0.3 for appearance words,
//! capped at 1.0.

use std::collections::HashMap;

use mnemos_core::memory::{
    BASE_IMPORTANCE, Language, MemoryItem, Subject, TopicGroup, TopicTag, clamp_importance,
};

use crate::rules::{self, Bucket, CompiledRules, RuleSet};

pub const APPEARANCE_IMPORTANCE: f32 = 0.9;
pub const CORE_IMPORTANCE: f32 = 0.8;
const EMPHASIS_BONUS: f32 = 0.2;
const RELATIONSHIP_BONUS: f32 = 0.2;
const PREFERENCE_BONUS: f32 = 0.1;
const APPEARANCE_BONUS: f32 = 0.3;

#[derive(Debug, Clone)]
pub struct Categorizer {
    rules: HashMap<Language, CompiledRules>,
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Categorizer {
    /// Categorizer with the built-in English and German tables.
    pub fn new() -> Self {
        let mut rules = HashMap::new();
        rules.insert(
            Language::En,
            CompiledRules::compile(&rules::ENGLISH).expect("built-in English rules are valid"),
        );
        rules.insert(
            Language::De,
            CompiledRules::compile(&rules::GERMAN).expect("built-in German rules are valid"),
        );
        Self { rules }
    }

    /// Replace the keyword table for one language.
    pub fn with_rules(mut self, language: Language, rules: &RuleSet) -> Result<Self, regex::Error> {
        self.rules.insert(language, CompiledRules::compile(rules)?);
        Ok(self)
    }

    fn rules_for(&self, language: Language) -> &CompiledRules {
        self.rules
            .get(&language)
            .or_else(|| self.rules.get(&Language::En))
            .expect("English rules are always registered")
    }

    /// Categorize a fact about the user.
    pub fn categorize(&self, raw_fact: &str, language: Language) -> MemoryItem {
        self.categorize_for(raw_fact, language, Subject::User)
    }

    /// Categorize a fact about `subject` into a new long-term item.
    pub fn categorize_for(&self, raw_fact: &str, language: Language, subject: Subject) -> MemoryItem {
        let fact = raw_fact.trim();

        if let Some((tag, body)) = TopicTag::parse_prefix(fact) {
            let importance = self.score(&tag, body, language);
            return MemoryItem::new(fact, language)
                .with_topic(tag)
                .with_importance(importance);
        }

        let tag = self.infer_tag(fact, language, subject);
        let importance = self.score(&tag, fact, language);
        MemoryItem::new(format!("{tag} {fact}"), language)
            .with_topic(tag)
            .with_importance(importance)
    }

    /// Tag an untagged fact from the keyword buckets.
    pub fn infer_tag(&self, fact: &str, language: Language, subject: Subject) -> TopicTag {
        let identity = TopicGroup::identity_of(subject);
        match self.infer_bucket(fact, language) {
            Some(Bucket::Appearance) => TopicTag::new(identity, "appearance"),
            Some(Bucket::Identity) => TopicTag::new(identity, "core"),
            Some(Bucket::Preferences) => TopicTag::new(identity, "preferences"),
            Some(Bucket::Relationship) => TopicTag::new(TopicGroup::Relationship, "milestones"),
            None => TopicTag::new(TopicGroup::ConversationThreads, "ongoing"),
        }
    }

    pub fn infer_bucket(&self, text: &str, language: Language) -> Option<Bucket> {
        self.rules_for(language).first_bucket(text)
    }

    /// Deterministic importance for a tagged fact.
    pub fn score(&self, tag: &TopicTag, text: &str, language: Language) -> f32 {
        if tag.group.is_identity() && tag.subtopic_is("appearance") {
            return APPEARANCE_IMPORTANCE;
        }
        if tag.subtopic_is("core") {
            return CORE_IMPORTANCE;
        }

        let rules = self.rules_for(language);
        let mut score = BASE_IMPORTANCE;
        if rules.is_emphasized(text) {
            score += EMPHASIS_BONUS;
        }
        if rules.mentions(Bucket::Relationship, text) {
            score += RELATIONSHIP_BONUS;
        }
        if rules.mentions(Bucket::Preferences, text) {
            score += PREFERENCE_BONUS;
        }
        if rules.mentions(Bucket::Appearance, text) {
            score += APPEARANCE_BONUS;
        }
        clamp_importance(score.min(1.0))
    }
}
