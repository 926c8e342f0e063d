//! In-memory view of the latest exchange plus local selection and edit state.
//!
//! Rebuilt from every poll. Never the source of truth for decisions; only
//! the exchange file is.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Local};
use moodreply_protocol::{ExchangeDocument, ReplyDecision};

/// A candidate being edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBuffer {
    pub mood: String,
    pub draft: String,
}

#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub sender: String,
    pub message: String,
    /// Raw `Reply` control value.
    pub decision: String,
    pub time: String,
    pub replies: BTreeMap<String, String>,
    selected_mood: Option<String>,
    edit: Option<EditBuffer>,
    polled_at: Option<DateTime<Local>>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the exchange fields with a freshly polled document.
    pub fn apply_exchange(&mut self, doc: ExchangeDocument) {
        self.sender = doc.sender;
        self.message = doc.message;
        self.decision = doc.decision;
        self.time = doc.time;
        self.replies = doc.replies;
        self.polled_at = Some(Local::now());

        if self
            .selected_mood
            .as_ref()
            .is_some_and(|mood| !self.replies.contains_key(mood))
        {
            self.selected_mood = None;
        }
        if self
            .edit
            .as_ref()
            .is_some_and(|edit| !self.replies.contains_key(&edit.mood))
        {
            self.edit = None;
        }
    }

    /// Candidate moods ordered case-insensitively.
    pub fn sorted_moods(&self) -> Vec<&str> {
        let mut moods: Vec<&str> = self.replies.keys().map(String::as_str).collect();
        moods.sort_by_key(|mood| mood.to_lowercase());
        moods
    }

    pub fn candidate(&self, mood: &str) -> Option<&str> {
        self.replies.get(mood).map(String::as_str)
    }

    /// Text of the reply that was sent, or the raw control value.
    pub fn replied_text(&self) -> &str {
        self.candidate(&self.decision).unwrap_or(self.decision.as_str())
    }

    pub fn is_pending(&self) -> bool {
        self.decision.is_empty()
    }

    pub fn polled_at(&self) -> Option<DateTime<Local>> {
        self.polled_at
    }

    pub fn selected_mood(&self) -> Option<&str> {
        self.selected_mood.as_deref()
    }

    /// Toggle the selection. Returns `false` when `mood` has no candidate.
    pub fn select_mood(&mut self, mood: &str) -> bool {
        if !self.replies.contains_key(mood) {
            return false;
        }
        if self.selected_mood.as_deref() == Some(mood) {
            self.selected_mood = None;
        } else {
            self.selected_mood = Some(mood.to_string());
        }
        true
    }

    pub fn clear_selection(&mut self) {
        self.selected_mood = None;
    }

    /// Record a decision locally before the next poll confirms it.
    pub fn set_decision(&mut self, decision: &str) {
        self.decision = decision.to_string();
    }

    /// Record an edited candidate locally before the next poll confirms it.
    pub fn set_candidate(&mut self, mood: &str, text: &str) {
        self.replies.insert(mood.to_string(), text.to_string());
    }

    pub fn editing(&self) -> Option<&EditBuffer> {
        self.edit.as_ref()
    }

    /// Start editing `mood`, seeding the draft with its candidate.
    pub fn begin_edit(&mut self, mood: &str) -> bool {
        let Some(current) = self.replies.get(mood) else {
            return false;
        };
        self.edit = Some(EditBuffer {
            mood: mood.to_string(),
            draft: current.clone(),
        });
        true
    }

    pub fn update_draft(&mut self, text: &str) -> bool {
        match self.edit.as_mut() {
            Some(edit) => {
                edit.draft = text.to_string();
                true
            }
            None => false,
        }
    }

    pub fn cancel_edit(&mut self) {
        self.edit = None;
    }

    pub fn take_edit(&mut self) -> Option<EditBuffer> {
        self.edit.take()
    }

    /// Plain text summary for the console.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let sender = if self.sender.is_empty() { "-" } else { &self.sender };
        let _ = writeln!(out, "From:    {sender}");
        let _ = writeln!(out, "Message: {}", self.message);
        if !self.time.is_empty() {
            let _ = writeln!(out, "Generated in {}s", self.time);
        }

        if self.replies.is_empty() {
            let _ = writeln!(out, "No candidates yet.");
        } else {
            let _ = writeln!(out, "Candidates:");
            for mood in self.sorted_moods() {
                let marker = if self.selected_mood() == Some(mood) { "*" } else { " " };
                let text = self.candidate(mood).unwrap_or_default();
                let _ = writeln!(out, "  [{marker}] {mood}: {text}");
            }
        }

        if let Some(edit) = &self.edit {
            let _ = writeln!(out, "Editing {}: {}", edit.mood, edit.draft);
        }

        let status = match ReplyDecision::parse(&self.decision) {
            ReplyDecision::Pending => "Waiting for your choice".to_string(),
            ReplyDecision::Refresh => "Refresh requested".to_string(),
            ReplyDecision::Ignore => "Ignored".to_string(),
            ReplyDecision::Chosen(_) => format!("You replied: {}", self.replied_text()),
        };
        let _ = writeln!(out, "{status}");

        match self.polled_at {
            Some(at) => {
                let _ = writeln!(out, "Updated {}", at.format("%H:%M:%S"));
            }
            None => {
                let _ = writeln!(out, "Not updated yet");
            }
        }
        out
    }
}
