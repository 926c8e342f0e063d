//! Periodic exchange file poller.
//!
//! One task reads `replies.json` every interval and forwards the decoded
//! document to the application's event queue. It never writes. Read failures
//! (file briefly missing during a replace, torn JSON from the worker) skip
//! the cycle; the next tick is the retry.
//!
//! Suspension is counted so overlapping writes cannot resume polling early:
//! the task restarts only once every `suspend` has been matched by `resume`
//! and nobody called `stop` in between.
//!
//! Every `suspend` also advances the poller epoch. Published documents carry
//! the epoch they were read in, so a document read before a local write can be
//! recognized and dropped by the consumer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use moodreply_protocol::ExchangeDocument;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::app::AppEvent;
use crate::store::FileExchangeStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Running,
    Stopped,
}

/// Handle to the poller. Cheap to clone; all clones control the same task.
#[derive(Clone)]
pub struct Poller {
    inner: Arc<PollerInner>,
}

struct PollerInner {
    store: FileExchangeStore,
    interval: Duration,
    events: mpsc::UnboundedSender<AppEvent>,
    control: Mutex<PollerControl>,
}

#[derive(Default)]
struct PollerControl {
    /// Set by `start`, cleared by `stop`.
    wanted: bool,
    /// Outstanding `suspend` calls.
    suspended: u32,
    /// Cancellation token of the live task, if any.
    task: Option<CancellationToken>,
    /// Advanced by every `suspend`.
    epoch: u64,
}

impl Poller {
    pub fn new(
        store: FileExchangeStore,
        interval: Duration,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                store,
                interval,
                events,
                control: Mutex::new(PollerControl::default()),
            }),
        }
    }

    /// Start polling. Restarts the task cleanly if it is already running.
    pub fn start(&self) {
        let mut control = self.control();
        control.wanted = true;
        self.restart(&mut control);
        info!(interval_ms = self.inner.interval.as_millis() as u64, "Exchange poller started");
    }

    /// Stop polling. No new cycle begins after this returns.
    pub fn stop(&self) {
        let mut control = self.control();
        control.wanted = false;
        if let Some(token) = control.task.take() {
            token.cancel();
            info!("Exchange poller stopped");
        }
    }

    /// Pause polling around a local write.
    pub fn suspend(&self) {
        let mut control = self.control();
        control.suspended += 1;
        control.epoch += 1;
        if let Some(token) = control.task.take() {
            token.cancel();
        }
        debug!(depth = control.suspended, "Exchange poller suspended");
    }

    /// Undo one `suspend`. Polling restarts when none remain.
    pub fn resume(&self) {
        let mut control = self.control();
        control.suspended = control.suspended.saturating_sub(1);
        if control.suspended == 0 && control.wanted && control.task.is_none() {
            self.restart(&mut control);
            debug!("Exchange poller resumed");
        }
    }

    pub fn state(&self) -> PollerState {
        if self.control().task.is_some() {
            PollerState::Running
        } else {
            PollerState::Stopped
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.control().suspended > 0
    }

    /// Epoch of documents that are still current.
    pub fn epoch(&self) -> u64 {
        self.control().epoch
    }

    fn control(&self) -> MutexGuard<'_, PollerControl> {
        self.inner.control()
    }

    fn restart(&self, control: &mut PollerControl) {
        if let Some(token) = control.task.take() {
            token.cancel();
        }
        if control.suspended > 0 {
            return;
        }
        let token = CancellationToken::new();
        tokio::spawn(run_poll_loop(self.inner.clone(), token.clone()));
        control.task = Some(token);
    }
}

impl PollerInner {
    fn control(&self) -> MutexGuard<'_, PollerControl> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a document unless a write began while it was being read.
    ///
    /// Holding the control lock orders the send against `suspend`.
    fn publish(&self, token: &CancellationToken, doc: ExchangeDocument) -> Publish {
        let control = self.control();
        if token.is_cancelled() {
            return Publish::Cancelled;
        }
        let event = AppEvent::ExchangePolled {
            epoch: control.epoch,
            doc,
        };
        match self.events.send(event) {
            Ok(()) => Publish::Sent,
            Err(_) => Publish::Closed,
        }
    }
}

enum Publish {
    Sent,
    Cancelled,
    Closed,
}

async fn run_poll_loop(inner: Arc<PollerInner>, token: CancellationToken) {
    let mut interval = tokio::time::interval(inner.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        match inner.store.read().await {
            Ok(Some(doc)) => match inner.publish(&token, doc) {
                Publish::Sent => {}
                Publish::Cancelled => break,
                Publish::Closed => {
                    debug!("Event queue closed, stopping poll loop");
                    break;
                }
            },
            Ok(None) => debug!("Exchange file absent, skipping cycle"),
            Err(e) => debug!(error = %e, "Exchange read failed, skipping cycle"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::time::timeout;

    const TICK: Duration = Duration::from_millis(20);

    fn setup(tmp: &TempDir) -> (Poller, mpsc::UnboundedReceiver<AppEvent>, std::path::PathBuf) {
        let path = tmp.path().join("replies.json");
        let (tx, rx) = mpsc::unbounded_channel();
        let poller = Poller::new(FileExchangeStore::new(&path), TICK, tx);
        (poller, rx, path)
    }

    async fn next_polled(rx: &mut mpsc::UnboundedReceiver<AppEvent>) -> Option<(u64, ExchangeDocument)> {
        match timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(AppEvent::ExchangePolled { epoch, doc })) => Some((epoch, doc)),
            _ => None,
        }
    }

    async fn next_doc(rx: &mut mpsc::UnboundedReceiver<AppEvent>) -> Option<ExchangeDocument> {
        next_polled(rx).await.map(|(_, doc)| doc)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<AppEvent>) {
        while rx.try_recv().is_ok() {}
    }

    #[tokio::test]
    async fn publishes_documents_while_running() {
        let tmp = TempDir::new().unwrap();
        let (poller, mut rx, path) = setup(&tmp);
        std::fs::write(&path, json!({"sender": "Alex", "Loving": "Hi!"}).to_string()).unwrap();

        poller.start();
        let doc = next_doc(&mut rx).await.unwrap();

        assert_eq!(poller.state(), PollerState::Running);
        assert_eq!(doc.sender, "Alex");
        assert_eq!(doc.replies["Loving"], "Hi!");
        poller.stop();
    }

    #[tokio::test]
    async fn skips_missing_and_malformed_files() {
        let tmp = TempDir::new().unwrap();
        let (poller, mut rx, path) = setup(&tmp);

        poller.start();
        tokio::time::sleep(TICK * 4).await;
        assert!(rx.try_recv().is_err());

        std::fs::write(&path, b"{\"sender\": ").unwrap();
        tokio::time::sleep(TICK * 4).await;
        assert!(rx.try_recv().is_err());

        std::fs::write(&path, json!({"sender": "Sam"}).to_string()).unwrap();
        assert_eq!(next_doc(&mut rx).await.unwrap().sender, "Sam");
        poller.stop();
    }

    #[tokio::test]
    async fn stop_halts_publishing_and_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let (poller, mut rx, path) = setup(&tmp);
        std::fs::write(&path, "{}").unwrap();

        poller.start();
        next_doc(&mut rx).await.unwrap();
        poller.stop();
        poller.stop();
        // A cycle that was mid-flight may still land.
        tokio::time::sleep(TICK * 2).await;
        drain(&mut rx);

        tokio::time::sleep(TICK * 5).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(poller.state(), PollerState::Stopped);
    }

    #[tokio::test]
    async fn start_twice_keeps_a_single_task() {
        let tmp = TempDir::new().unwrap();
        let (poller, mut rx, path) = setup(&tmp);
        std::fs::write(&path, "{}").unwrap();

        poller.start();
        poller.start();
        tokio::time::sleep(TICK * 10).await;
        poller.stop();

        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        // One task ticks roughly 10 times here; two would double it.
        assert!(count <= 13, "too many cycles: {count}");
    }

    #[tokio::test]
    async fn suspension_is_counted() {
        let tmp = TempDir::new().unwrap();
        let (poller, mut rx, path) = setup(&tmp);
        std::fs::write(&path, "{}").unwrap();
        poller.start();

        poller.suspend();
        poller.suspend();
        assert_eq!(poller.state(), PollerState::Stopped);
        tokio::time::sleep(TICK * 2).await;
        drain(&mut rx);

        poller.resume();
        assert!(poller.is_suspended());
        tokio::time::sleep(TICK * 4).await;
        assert!(rx.try_recv().is_err());

        poller.resume();
        assert!(!poller.is_suspended());
        assert_eq!(poller.state(), PollerState::Running);
        assert!(next_doc(&mut rx).await.is_some());
        poller.stop();
    }

    #[tokio::test]
    async fn documents_read_before_a_suspend_carry_a_stale_epoch() {
        let tmp = TempDir::new().unwrap();
        let (poller, mut rx, path) = setup(&tmp);
        std::fs::write(&path, json!({"sender": "Alex"}).to_string()).unwrap();

        poller.start();
        let (before, _) = next_polled(&mut rx).await.unwrap();
        assert_eq!(before, poller.epoch());

        poller.suspend();
        assert!(before < poller.epoch());
        // Anything still queued from before the suspend is stale.
        while let Ok(AppEvent::ExchangePolled { epoch, .. }) = rx.try_recv() {
            assert!(epoch < poller.epoch());
        }

        poller.resume();
        let (after, _) = next_polled(&mut rx).await.unwrap();
        assert_eq!(after, poller.epoch());
        poller.stop();
    }

    #[tokio::test]
    async fn resume_after_stop_does_not_restart() {
        let tmp = TempDir::new().unwrap();
        let (poller, _rx, _path) = setup(&tmp);
        poller.start();
        poller.suspend();
        poller.stop();
        poller.resume();
        assert_eq!(poller.state(), PollerState::Stopped);
    }
}
