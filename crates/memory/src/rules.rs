//! Keyword rule tables for fact categorization.
//!
//! Each language provides the same five word classes. Entries are regex
//! fragments matched case-insensitively on word boundaries, so a table can be
//! swapped or extended without touching the categorizer's control flow.

use regex::Regex;

/// Keyword buckets, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Appearance,
    Identity,
    Preferences,
    Relationship,
}

impl Bucket {
    pub const ORDER: [Bucket; 4] = [
        Bucket::Appearance,
        Bucket::Identity,
        Bucket::Preferences,
        Bucket::Relationship,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Appearance => "appearance",
            Bucket::Identity => "identity",
            Bucket::Preferences => "preferences",
            Bucket::Relationship => "relationship",
        }
    }
}

/// Word lists for one language.
#[derive(Debug, Clone, Copy)]
pub struct RuleSet {
    pub appearance: &'static [&'static str],
    pub identity: &'static [&'static str],
    pub preferences: &'static [&'static str],
    pub relationship: &'static [&'static str],
    /// "important / significant / birthday / name" class, used only for scoring
    pub emphasis: &'static [&'static str],
}

pub const ENGLISH: RuleSet = RuleSet {
    appearance: &[
        "hair", "eyes?", "eye colou?r", "tall", "height", "wears?", "wearing", "tattoos?",
        "scars?", "skin", "freckles", "beard", "glasses", "slim", "muscular",
    ],
    identity: &[
        "name", "named", "called", "age", "years old", "born", "birthday", "job", "works as",
        "profession", "occupation", "lives in", "grew up", "nationality",
    ],
    preferences: &[
        "likes?", "loves?", "enjoys?", "prefers?", "favou?rite", "hates?", "dislikes?", "fan of",
    ],
    relationship: &[
        "relationship", "together", "dating", "trusts?", "kiss(?:ed|es)?", "partner", "friends?",
        "married", "anniversary", "first date", "confess(?:ed)?", "feelings for",
    ],
    emphasis: &[
        "important", "significant", "birthday", "name", "never forget", "promised?", "remember",
    ],
};

pub const GERMAN: RuleSet = RuleSet {
    appearance: &[
        "haare?n?", "augen", "augenfarbe", "groß", "größe", "trägt", "tattoos?", "narben?",
        "haut", "sommersprossen", "bart", "brille", "schlank", "muskulös",
    ],
    identity: &[
        "name", "heißt", "heisst", "genannt", "alter", "jahre alt", "geboren", "geburtstag",
        "beruf", "arbeitet als", "wohnt in", "aufgewachsen", "staatsangehörigkeit",
    ],
    preferences: &[
        "mag", "liebt", "genießt", "bevorzugt", "lieblings\\w*", "hasst", "fan von", "gerne?",
    ],
    relationship: &[
        "beziehung", "zusammen", "vertraut", "vertrauen", "geküsst", "kuss", "küssen",
        "partnerin", "partner", "freund(?:in|e)?", "verheiratet", "jahrestag", "erstes date",
        "gestanden",
    ],
    emphasis: &[
        "wichtig", "bedeutend", "geburtstag", "name", "niemals vergessen", "versprochen",
        "versprechen",
    ],
};

/// A [`RuleSet`] compiled into one matcher per word class.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    appearance: Regex,
    identity: Regex,
    preferences: Regex,
    relationship: Regex,
    emphasis: Regex,
}

impl CompiledRules {
    pub fn compile(rules: &RuleSet) -> Result<Self, regex::Error> {
        Ok(Self {
            appearance: word_class(rules.appearance)?,
            identity: word_class(rules.identity)?,
            preferences: word_class(rules.preferences)?,
            relationship: word_class(rules.relationship)?,
            emphasis: word_class(rules.emphasis)?,
        })
    }

    pub fn matcher(&self, bucket: Bucket) -> &Regex {
        match bucket {
            Bucket::Appearance => &self.appearance,
            Bucket::Identity => &self.identity,
            Bucket::Preferences => &self.preferences,
            Bucket::Relationship => &self.relationship,
        }
    }

    /// First bucket whose words occur in `text`.
    pub fn first_bucket(&self, text: &str) -> Option<Bucket> {
        Bucket::ORDER
            .into_iter()
            .find(|bucket| self.matcher(*bucket).is_match(text))
    }

    pub fn mentions(&self, bucket: Bucket, text: &str) -> bool {
        self.matcher(bucket).is_match(text)
    }

    pub fn is_emphasized(&self, text: &str) -> bool {
        self.emphasis.is_match(text)
    }
}

fn word_class(words: &[&str]) -> Result<Regex, regex::Error> {
    if words.is_empty() {
        // Matches nothing.
        return Regex::new(r"\b\B");
    }
    Regex::new(&format!(r"(?i)\b(?:{})\b", words.join("|")))
}
