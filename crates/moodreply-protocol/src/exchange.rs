//! Exchange document (`replies.json`).
//!
//! A flat JSON object shared by moodreply and the worker. A handful of keys
//! are reserved (see [`keys`]); every other string-valued key is a mood name
//! mapped to its candidate reply. Keys this crate does not understand must
//! survive every write, so edits operate on the raw object rather than on
//! [`ExchangeDocument`].

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Reserved top-level keys.
pub mod keys {
    /// Phone number or handle of the pending conversation. Worker-owned.
    pub const SENDER: &str = "sender";
    /// Text of the incoming message. Worker-owned.
    pub const MESSAGE: &str = "message";
    /// Control field: empty, `Refresh`, `Ignore`, or the chosen mood name.
    pub const DECISION: &str = "Reply";
    /// Literal text of the chosen reply.
    pub const CHOSEN_TEXT: &str = "reply";
    /// Worker-reported generation latency in seconds.
    pub const TIME: &str = "time";
    /// Legacy nested mood map, read-only.
    pub const LEGACY_REPLIES: &str = "replies";

    pub const RESERVED: [&str; 6] = [SENDER, MESSAGE, DECISION, CHOSEN_TEXT, TIME, LEGACY_REPLIES];

    pub fn is_reserved(key: &str) -> bool {
        RESERVED.contains(&key)
    }
}

/// Control value asking the worker to regenerate candidates.
pub const REFRESH: &str = "Refresh";
/// Control value asking the worker to drop the conversation.
pub const IGNORE: &str = "Ignore";

/// Interpretation of the `Reply` control field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDecision<'a> {
    /// No decision yet. The user is expected to act.
    Pending,
    Refresh,
    Ignore,
    /// A mood was chosen and its candidate should be sent.
    Chosen(&'a str),
}

impl<'a> ReplyDecision<'a> {
    pub fn parse(raw: &'a str) -> Self {
        match raw {
            "" => Self::Pending,
            REFRESH => Self::Refresh,
            IGNORE => Self::Ignore,
            mood => Self::Chosen(mood),
        }
    }
}

/// Decoded view of the exchange file's decision-relevant fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeDocument {
    pub sender: String,
    pub message: String,
    /// Raw `Reply` control value.
    pub decision: String,
    /// Raw `reply` text.
    pub chosen_text: String,
    pub time: String,
    /// Mood name to candidate reply.
    pub replies: BTreeMap<String, String>,
}

impl ExchangeDocument {
    /// Decode without ever failing. Non-object input yields an empty document.
    pub fn from_value(value: &Value) -> Self {
        match value.as_object() {
            Some(object) => Self::from_object(object),
            None => Self::default(),
        }
    }

    pub fn from_object(object: &Map<String, Value>) -> Self {
        let text = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let chosen_text = text(keys::CHOSEN_TEXT).unwrap_or_default();
        // Older workers only ever wrote the lowercase key.
        let decision = text(keys::DECISION).unwrap_or_else(|| chosen_text.clone());

        let time = match object.get(keys::TIME) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };

        let mut replies: BTreeMap<String, String> = object
            .iter()
            .filter(|(key, _)| !keys::is_reserved(key))
            .filter_map(|(key, value)| Some((key.clone(), value.as_str()?.to_string())))
            .collect();

        if let Some(legacy) = object.get(keys::LEGACY_REPLIES).and_then(Value::as_object) {
            for (mood, value) in legacy {
                if let Some(candidate) = value.as_str() {
                    replies
                        .entry(mood.clone())
                        .or_insert_with(|| candidate.to_string());
                }
            }
        }

        Self {
            sender: text(keys::SENDER).unwrap_or_default(),
            message: text(keys::MESSAGE).unwrap_or_default(),
            decision,
            chosen_text,
            time,
            replies,
        }
    }

    pub fn reply_decision(&self) -> ReplyDecision<'_> {
        ReplyDecision::parse(&self.decision)
    }

    /// True while the worker waits for the user to pick, refresh, or ignore.
    pub fn is_pending(&self) -> bool {
        self.decision.is_empty()
    }
}

/// A write the application makes to the exchange file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEdit {
    /// Send the candidate for `mood`, whose final text is `text`.
    SelectReply { mood: String, text: String },
    Refresh,
    Ignore,
    /// Overwrite the candidate for `mood` in place.
    EditCandidate { mood: String, text: String },
}

impl ExchangeEdit {
    /// Apply the edit to the raw object, leaving unrelated keys untouched.
    pub fn apply(&self, object: &mut Map<String, Value>) {
        match self {
            Self::SelectReply { mood, text } => {
                object.insert(mood.clone(), Value::String(text.clone()));
                object.insert(keys::DECISION.to_string(), Value::String(mood.clone()));
                object.insert(keys::CHOSEN_TEXT.to_string(), Value::String(text.clone()));
            }
            Self::Refresh => {
                object.insert(keys::DECISION.to_string(), Value::String(REFRESH.to_string()));
            }
            Self::Ignore => {
                object.insert(keys::DECISION.to_string(), Value::String(IGNORE.to_string()));
            }
            Self::EditCandidate { mood, text } => {
                object.insert(mood.clone(), Value::String(text.clone()));
                let selected = object.get(keys::DECISION).and_then(Value::as_str) == Some(mood.as_str());
                if selected {
                    object.insert(keys::CHOSEN_TEXT.to_string(), Value::String(text.clone()));
                }
            }
        }
    }
}
