//! On-disk documents exchanged between moodreply and the reply worker.
//!
//! Two JSON files live in the installation root:
//!
//! - `config.json`: the [`PersonaDocument`], written only by moodreply and
//!   read by the worker before every generation.
//! - `replies.json`: the [`ExchangeDocument`], a flat mailbox written by both
//!   sides. The worker publishes candidates; moodreply answers through the
//!   `Reply` control key.
//!
//! Decoding is tolerant: malformed or missing fields fall back to defaults and
//! never fail the whole document. Encoding is deterministic (sorted keys,
//! pretty-printed) so diffs and external tooling stay stable.

pub mod exchange;
pub mod persona;

pub use exchange::{ExchangeDocument, ExchangeEdit, ReplyDecision, keys};
pub use persona::{MAX_MOODS, PersonaDocument, PhoneListMode};

use serde_json::{Map, Value};

/// Serialize a JSON object pretty-printed with sorted keys.
///
/// `serde_json::Map` is ordered by key as long as the `preserve_order`
/// feature stays disabled.
pub fn to_sorted_json(object: &Map<String, Value>) -> serde_json::Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(object)?;
    bytes.push(b'\n');
    Ok(bytes)
}
