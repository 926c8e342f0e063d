//! Persona document (`config.json`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Upper bound on the number of moods a persona may carry.
pub const MAX_MOODS: usize = 5;

const DEFAULT_NAME: &str = "Caden";
const DEFAULT_DESCRIPTION: &str = "I am a 22 year old grad student. I'm pretty casual about \
grammar. I love football, hanging out with friends, coding, and working out!";

/// Whether `phoneNumbers` lists the only senders to answer, or the senders to skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PhoneListMode {
    #[default]
    Include,
    Exclude,
}

impl PhoneListMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Include => "Include",
            Self::Exclude => "Exclude",
        }
    }

    /// Parse the exact on-disk spelling. Anything else is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Include" => Some(Self::Include),
            "Exclude" => Some(Self::Exclude),
            _ => None,
        }
    }
}

/// The user's persona, consumed by the worker when generating replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaDocument {
    pub name: String,
    pub personal_description: String,
    /// Mood name to mood description. Between 1 and [`MAX_MOODS`] entries.
    pub moods: BTreeMap<String, String>,
    pub phone_list_mode: PhoneListMode,
    pub phone_numbers: Vec<String>,
}

impl Default for PersonaDocument {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            personal_description: DEFAULT_DESCRIPTION.to_string(),
            moods: default_moods(),
            phone_list_mode: PhoneListMode::default(),
            phone_numbers: Vec::new(),
        }
    }
}

fn default_moods() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "Loving".to_string(),
            "Very kind and happy. Not argumentative, very agreeable and happy to hang out."
                .to_string(),
        ),
        (
            "Angry".to_string(),
            "Very upset and cranky. Close to snapping if someone inconveniences me.".to_string(),
        ),
        (
            "Professional".to_string(),
            "Clear, concise, and formal.".to_string(),
        ),
    ])
}

impl PersonaDocument {
    /// Decode field by field. Absent or mistyped fields keep their defaults.
    pub fn from_value(value: &Value) -> Self {
        let mut doc = Self::default();
        let Some(object) = value.as_object() else {
            return doc;
        };

        if let Some(name) = object.get("name").and_then(Value::as_str) {
            doc.name = name.to_string();
        }
        if let Some(description) = object.get("personalDescription").and_then(Value::as_str) {
            doc.personal_description = description.to_string();
        }
        if let Some(moods) = object.get("moods").and_then(Value::as_object).and_then(decode_moods) {
            doc.moods = moods;
        }
        if let Some(mode) = object
            .get("phoneListMode")
            .and_then(Value::as_str)
            .and_then(PhoneListMode::parse)
        {
            doc.phone_list_mode = mode;
        }
        if let Some(numbers) = object.get("phoneNumbers").and_then(decode_string_array) {
            doc.phone_numbers = numbers;
        }

        doc
    }

    /// Decode raw file contents. Unparseable bytes yield the defaults.
    pub fn from_slice(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => Self::from_value(&value),
            Err(_) => Self::default(),
        }
    }

    /// Encode pretty-printed with sorted keys.
    pub fn to_json_pretty(&self) -> serde_json::Result<Vec<u8>> {
        match serde_json::to_value(self)? {
            Value::Object(object) => crate::to_sorted_json(&object),
            other => serde_json::to_vec_pretty(&other),
        }
    }
}

/// Accept the mapping only when every value is a string and the count is in range.
fn decode_moods(object: &Map<String, Value>) -> Option<BTreeMap<String, String>> {
    if object.is_empty() || object.len() > MAX_MOODS {
        return None;
    }
    object
        .iter()
        .map(|(name, description)| Some((name.clone(), description.as_str()?.to_string())))
        .collect()
}

fn decode_string_array(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}
