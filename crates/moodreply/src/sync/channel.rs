//! Read and write access to the shared exchange file.
//!
//! The worker and this process both write `replies.json` without any lock.
//! Every local write goes through [`ExchangeChannel::mutate`], which
//! serializes local writers, suspends the poller for the read-modify-write,
//! and resumes it only after a grace delay so the poller never reports our
//! own write back as foreign state. A worker write landing in the same
//! instant is resolved by whole-document last-writer-wins.

use std::time::Duration;

use moodreply_protocol::{ExchangeDocument, ExchangeEdit};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::Poller;
use crate::store::{FileExchangeStore, StorageResult};

pub struct ExchangeChannel {
    store: FileExchangeStore,
    poller: Poller,
    write_grace: Duration,
    write_lock: Mutex<()>,
}

impl ExchangeChannel {
    pub fn new(store: FileExchangeStore, poller: Poller, write_grace: Duration) -> Self {
        Self {
            store,
            poller,
            write_grace,
            write_lock: Mutex::new(()),
        }
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub async fn read(&self) -> StorageResult<Option<ExchangeDocument>> {
        self.store.read().await
    }

    /// Apply `edit` to the raw exchange object and write it back atomically.
    ///
    /// Returns the decoded document as written. Polling resumes after the
    /// grace delay whether or not the write succeeded.
    pub async fn mutate<F>(&self, edit: F) -> StorageResult<ExchangeDocument>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let _guard = self.write_lock.lock().await;

        self.poller.suspend();
        let result = self.store.update(edit).await;
        self.schedule_resume();

        match result {
            Ok(object) => Ok(ExchangeDocument::from_object(&object)),
            Err(e) => {
                warn!(error = %e, "Failed to write exchange file");
                Err(e)
            }
        }
    }

    pub async fn apply(&self, edit: &ExchangeEdit) -> StorageResult<ExchangeDocument> {
        debug!(?edit, "Applying exchange edit");
        self.mutate(|object| edit.apply(object)).await
    }

    pub async fn select_reply(&self, mood: &str, text: &str) -> StorageResult<ExchangeDocument> {
        self.apply(&ExchangeEdit::SelectReply {
            mood: mood.to_string(),
            text: text.to_string(),
        })
        .await
    }

    pub async fn request_refresh(&self) -> StorageResult<ExchangeDocument> {
        self.apply(&ExchangeEdit::Refresh).await
    }

    pub async fn request_ignore(&self) -> StorageResult<ExchangeDocument> {
        self.apply(&ExchangeEdit::Ignore).await
    }

    pub async fn edit_candidate(&self, mood: &str, text: &str) -> StorageResult<ExchangeDocument> {
        self.apply(&ExchangeEdit::EditCandidate {
            mood: mood.to_string(),
            text: text.to_string(),
        })
        .await
    }

    fn schedule_resume(&self) {
        let poller = self.poller.clone();
        let grace = self.write_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            poller.resume();
        });
    }
}
