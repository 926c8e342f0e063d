//! Validated edits to the persona document.
//!
//! Every edit is checked in full before anything changes, so a rejected edit
//! leaves the document (and therefore the file) untouched.

use moodreply_protocol::{MAX_MOODS, PersonaDocument, PhoneListMode};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonaEdit {
    SetName(String),
    SetDescription(String),
    AddMood {
        name: String,
        description: String,
    },
    EditMood {
        old_name: String,
        new_name: String,
        description: String,
    },
    DeleteMood(String),
    SetPhoneListMode(PhoneListMode),
    AddPhoneNumber(String),
    /// Zero-based position in the phone number list.
    RemovePhoneNumber(usize),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PersonaError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("at most {} moods are allowed", MAX_MOODS)]
    TooManyMoods,

    #[error("mood already exists: {0}")]
    DuplicateMood(String),

    #[error("unknown mood: {0}")]
    UnknownMood(String),

    #[error("cannot delete the last mood")]
    LastMood,

    #[error("no phone number at position {0}")]
    NoSuchPhoneNumber(usize),
}

impl PersonaEdit {
    pub fn apply(self, doc: &mut PersonaDocument) -> Result<(), PersonaError> {
        match self {
            Self::SetName(name) => {
                doc.name = non_empty(&name, "name")?;
            }
            Self::SetDescription(text) => {
                doc.personal_description = non_empty(&text, "description")?;
            }
            Self::AddMood { name, description } => {
                let name = non_empty(&name, "mood name")?;
                let description = non_empty(&description, "mood description")?;
                if doc.moods.contains_key(&name) {
                    return Err(PersonaError::DuplicateMood(name));
                }
                if doc.moods.len() >= MAX_MOODS {
                    return Err(PersonaError::TooManyMoods);
                }
                doc.moods.insert(name, description);
            }
            Self::EditMood {
                old_name,
                new_name,
                description,
            } => {
                let new_name = non_empty(&new_name, "mood name")?;
                let description = non_empty(&description, "mood description")?;
                if !doc.moods.contains_key(&old_name) {
                    return Err(PersonaError::UnknownMood(old_name));
                }
                if new_name != old_name && doc.moods.contains_key(&new_name) {
                    return Err(PersonaError::DuplicateMood(new_name));
                }
                doc.moods.remove(&old_name);
                doc.moods.insert(new_name, description);
            }
            Self::DeleteMood(name) => {
                if !doc.moods.contains_key(&name) {
                    return Err(PersonaError::UnknownMood(name));
                }
                if doc.moods.len() == 1 {
                    return Err(PersonaError::LastMood);
                }
                doc.moods.remove(&name);
            }
            Self::SetPhoneListMode(mode) => {
                doc.phone_list_mode = mode;
            }
            Self::AddPhoneNumber(number) => {
                let number = non_empty(&number, "phone number")?;
                doc.phone_numbers.push(number);
            }
            Self::RemovePhoneNumber(index) => {
                if index >= doc.phone_numbers.len() {
                    return Err(PersonaError::NoSuchPhoneNumber(index));
                }
                doc.phone_numbers.remove(index);
            }
        }
        Ok(())
    }
}

fn non_empty(raw: &str, field: &'static str) -> Result<String, PersonaError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PersonaError::Empty(field));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(name: &str, description: &str) -> PersonaEdit {
        PersonaEdit::AddMood {
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_set_name_trims() {
        let mut doc = PersonaDocument::default();
        PersonaEdit::SetName("  Riley \n".into()).apply(&mut doc).unwrap();
        assert_eq!(doc.name, "Riley");

        let err = PersonaEdit::SetDescription("   ".into()).apply(&mut doc);
        assert_eq!(err, Err(PersonaError::Empty("description")));
    }

    #[test]
    fn test_add_mood_limits() {
        let mut doc = PersonaDocument::default();
        assert_eq!(doc.moods.len(), 3);

        add(" Playful ", " Teasing ").apply(&mut doc).unwrap();
        assert_eq!(doc.moods["Playful"], "Teasing");
        add("Calm", "Even").apply(&mut doc).unwrap();

        let before = doc.clone();
        assert_eq!(add("Sixth", "x").apply(&mut doc), Err(PersonaError::TooManyMoods));
        assert_eq!(
            add("Calm", "again").apply(&mut doc),
            Err(PersonaError::DuplicateMood("Calm".into()))
        );
        assert_eq!(add("", "x").apply(&mut doc), Err(PersonaError::Empty("mood name")));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_edit_mood_renames_and_detects_collisions() {
        let mut doc = PersonaDocument::default();
        PersonaEdit::EditMood {
            old_name: "Angry".into(),
            new_name: "Grumpy".into(),
            description: "Short answers".into(),
        }
        .apply(&mut doc)
        .unwrap();
        assert!(!doc.moods.contains_key("Angry"));
        assert_eq!(doc.moods["Grumpy"], "Short answers");

        let collision = PersonaEdit::EditMood {
            old_name: "Grumpy".into(),
            new_name: "Loving".into(),
            description: "x".into(),
        }
        .apply(&mut doc);
        assert_eq!(collision, Err(PersonaError::DuplicateMood("Loving".into())));

        let same_name = PersonaEdit::EditMood {
            old_name: "Loving".into(),
            new_name: "Loving".into(),
            description: "Warm".into(),
        };
        same_name.apply(&mut doc).unwrap();
        assert_eq!(doc.moods["Loving"], "Warm");

        let unknown = PersonaEdit::EditMood {
            old_name: "Nope".into(),
            new_name: "Other".into(),
            description: "x".into(),
        }
        .apply(&mut doc);
        assert_eq!(unknown, Err(PersonaError::UnknownMood("Nope".into())));
    }

    #[test]
    fn test_delete_keeps_last_mood() {
        let mut doc = PersonaDocument::default();
        PersonaEdit::DeleteMood("Angry".into()).apply(&mut doc).unwrap();
        PersonaEdit::DeleteMood("Loving".into()).apply(&mut doc).unwrap();
        assert_eq!(
            PersonaEdit::DeleteMood("Professional".into()).apply(&mut doc),
            Err(PersonaError::LastMood)
        );
        assert_eq!(
            PersonaEdit::DeleteMood("Angry".into()).apply(&mut doc),
            Err(PersonaError::UnknownMood("Angry".into()))
        );
        assert_eq!(doc.moods.len(), 1);
    }

    #[test]
    fn test_phone_numbers() {
        let mut doc = PersonaDocument::default();
        PersonaEdit::SetPhoneListMode(PhoneListMode::Exclude)
            .apply(&mut doc)
            .unwrap();
        PersonaEdit::AddPhoneNumber(" +15550001 ".into())
            .apply(&mut doc)
            .unwrap();
        PersonaEdit::AddPhoneNumber("+15550002".into())
            .apply(&mut doc)
            .unwrap();
        assert_eq!(doc.phone_numbers, vec!["+15550001", "+15550002"]);
        assert_eq!(doc.phone_list_mode, PhoneListMode::Exclude);

        PersonaEdit::RemovePhoneNumber(0).apply(&mut doc).unwrap();
        assert_eq!(doc.phone_numbers, vec!["+15550002"]);
        assert_eq!(
            PersonaEdit::RemovePhoneNumber(1).apply(&mut doc),
            Err(PersonaError::NoSuchPhoneNumber(1))
        );
    }
}
