//! End-to-end flow against a temporary installation root with the worker
//! disabled. The test plays the worker's part by writing `replies.json`.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use moodreply::app::{App, AppEvent};
use moodreply::config::{Config, InstallPaths};
use moodreply::frontend::ConsoleCommand;
use moodreply::notify::{Notification, Notifier};
use moodreply::persona::PersonaEdit;
use moodreply::sync::PollerState;
use moodreply_protocol::{ExchangeDocument, PersonaDocument};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::time::Instant;

#[derive(Clone, Default)]
struct RecordingNotifier {
    posted: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    fn count(&self) -> usize {
        self.posted.lock().unwrap().len()
    }

    fn last_body(&self) -> Option<String> {
        self.posted.lock().unwrap().last().map(|n| n.body.clone())
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> io::Result<()> {
        self.posted.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

struct Fixture {
    _tmp: TempDir,
    paths: InstallPaths,
    notifier: RecordingNotifier,
    app: App,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let paths = InstallPaths::new(tmp.path().join("iMessageAI"), tmp.path());

    let mut config = Config::default();
    config.poll.interval_ms = 20;
    config.poll.write_grace_ms = 100;
    config.worker.enabled = false;

    let notifier = RecordingNotifier::default();
    let app = App::new(&paths, &config, Box::new(notifier.clone()));
    Fixture {
        _tmp: tmp,
        paths,
        notifier,
        app,
    }
}

fn write_exchange(path: &Path, value: Value) {
    std::fs::write(path, serde_json::to_vec(&value).unwrap()).unwrap();
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

/// Handle events until `pred` holds.
async fn pump_until(app: &mut App, mut pred: impl FnMut(&App) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !pred(app) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        assert!(!remaining.is_zero(), "condition not reached in time");
        let _ = tokio::time::timeout(remaining, app.process_next()).await;
    }
}

/// Handle whatever events arrive during `duration`.
async fn pump_for(app: &mut App, duration: Duration) {
    let _ = tokio::time::timeout(duration, async {
        while app.process_next().await.is_continue() {}
    })
    .await;
}

#[tokio::test]
async fn startup_creates_default_persona() {
    let mut f = fixture();
    f.app.startup().await;

    let bytes = std::fs::read(&f.paths.persona).unwrap();
    let on_disk = PersonaDocument::from_slice(&bytes);
    assert_eq!(on_disk, PersonaDocument::default());
    assert_eq!(f.app.persona().name, "Caden");
    assert_eq!(f.app.poller().state(), PollerState::Running);
    assert!(!f.app.worker_status().keep_running);

    f.app.shutdown().await;
    assert_eq!(f.app.poller().state(), PollerState::Stopped);
}

#[tokio::test]
async fn select_and_confirm_round_trip() {
    let mut f = fixture();
    f.app.startup().await;
    write_exchange(
        &f.paths.exchange,
        json!({"sender": "Alex", "message": "hey", "Loving": "Hi!", "Reply": ""}),
    );

    pump_until(&mut f.app, |app| app.view().candidate("Loving") == Some("Hi!")).await;
    assert!(f.app.view().is_pending());
    assert_eq!(f.notifier.count(), 1);
    assert_eq!(
        f.notifier.last_body().as_deref(),
        Some("No selected reply for Alex: hey")
    );

    // Repeated polls of the same pending event stay quiet.
    pump_for(&mut f.app, Duration::from_millis(150)).await;
    assert_eq!(f.notifier.count(), 1);

    f.app.select_mood("Loving").unwrap();
    f.app.confirm_selection().await.unwrap();
    assert_eq!(
        read_json(&f.paths.exchange),
        json!({
            "sender": "Alex",
            "message": "hey",
            "Loving": "Hi!",
            "Reply": "Loving",
            "reply": "Hi!",
        })
    );
    assert_eq!(f.app.view().decision, "Loving");
    assert_eq!(f.app.view().replied_text(), "Hi!");
    assert_eq!(f.app.view().selected_mood(), None);

    // The worker consumes the decision and posts the same message again.
    pump_for(&mut f.app, Duration::from_millis(250)).await;
    write_exchange(
        &f.paths.exchange,
        json!({"sender": "Alex", "message": "hey", "Loving": "Hey!", "Reply": ""}),
    );
    pump_until(&mut f.app, |app| app.view().candidate("Loving") == Some("Hey!")).await;
    assert_eq!(f.notifier.count(), 2);

    f.app.shutdown().await;
}

#[tokio::test]
async fn refresh_ignore_and_edit_preserve_unknown_keys() {
    let mut f = fixture();
    f.app.startup().await;
    write_exchange(
        &f.paths.exchange,
        json!({"sender": "Sam", "message": "lunch?", "Loving": "Sure!", "X": "y", "Reply": ""}),
    );
    pump_until(&mut f.app, |app| app.view().sender == "Sam").await;

    f.app.begin_edit("Loving").unwrap();
    f.app.update_draft("Sure, noon?").unwrap();
    f.app.save_edit().await.unwrap();
    assert_eq!(f.app.view().candidate("Loving"), Some("Sure, noon?"));

    f.app.request_refresh().await.unwrap();
    assert_eq!(f.app.view().decision, "Refresh");
    let written = read_json(&f.paths.exchange);
    assert_eq!(written["Reply"], "Refresh");
    assert_eq!(written["Loving"], "Sure, noon?");
    assert_eq!(written["X"], "y");
    assert!(written.get("reply").is_none());

    f.app.request_ignore().await.unwrap();
    assert_eq!(read_json(&f.paths.exchange)["Reply"], "Ignore");

    f.app.shutdown().await;
}

#[tokio::test]
async fn enabling_notifications_fires_for_pending_exchange() {
    let mut f = fixture();
    f.app.set_notifications_enabled(false);
    f.app.startup().await;
    write_exchange(
        &f.paths.exchange,
        json!({"sender": "", "message": "", "Reply": ""}),
    );
    pump_for(&mut f.app, Duration::from_millis(150)).await;
    assert_eq!(f.notifier.count(), 0);

    f.app.set_notifications_enabled(true);
    assert!(f.app.notifications_enabled());
    pump_until(&mut f.app, |_| f.notifier.count() == 1).await;
    assert_eq!(
        f.notifier.last_body().as_deref(),
        Some("A conversation has no selected reply yet.")
    );

    f.app.shutdown().await;
}

#[tokio::test]
async fn decision_while_notifications_off_rearms_the_gate() {
    let mut f = fixture();
    f.app.startup().await;
    let pending = json!({"sender": "Alex", "message": "hey", "Loving": "Hi!", "Reply": ""});
    write_exchange(&f.paths.exchange, pending.clone());
    pump_until(&mut f.app, |_| f.notifier.count() == 1).await;

    f.app.set_notifications_enabled(false);
    write_exchange(
        &f.paths.exchange,
        json!({"sender": "Alex", "message": "hey", "Loving": "Hi!", "Reply": "Loving"}),
    );
    pump_until(&mut f.app, |app| app.view().decision == "Loving").await;

    // Same conversation comes back while notifications are still off.
    write_exchange(&f.paths.exchange, pending);
    pump_until(&mut f.app, |app| app.view().is_pending()).await;
    assert_eq!(f.notifier.count(), 1);

    f.app.set_notifications_enabled(true);
    pump_until(&mut f.app, |_| f.notifier.count() == 2).await;
    assert_eq!(
        f.notifier.last_body().as_deref(),
        Some("No selected reply for Alex: hey")
    );

    f.app.shutdown().await;
}

#[tokio::test]
async fn documents_read_before_a_write_do_not_undo_it() {
    let mut f = fixture();
    f.app.startup().await;
    let pending = json!({"sender": "Alex", "message": "hey", "Loving": "Hi!", "Reply": ""});
    write_exchange(&f.paths.exchange, pending.clone());
    pump_until(&mut f.app, |app| app.view().candidate("Loving") == Some("Hi!")).await;

    let read_epoch = f.app.poller().epoch();
    f.app.select_mood("Loving").unwrap();
    f.app.confirm_selection().await.unwrap();
    assert_eq!(f.app.view().decision, "Loving");

    // A poll cycle that read the file just before the write lands late.
    f.app
        .event_sender()
        .send(AppEvent::ExchangePolled {
            epoch: read_epoch,
            doc: ExchangeDocument::from_value(&pending),
        })
        .unwrap();
    pump_for(&mut f.app, Duration::from_millis(50)).await;
    assert_eq!(f.app.view().decision, "Loving");
    assert_eq!(f.app.view().replied_text(), "Hi!");

    f.app.shutdown().await;
}

#[tokio::test]
async fn persona_edits_are_saved_immediately() {
    let mut f = fixture();
    f.app.startup().await;

    f.app
        .edit_persona(PersonaEdit::AddMood {
            name: "Playful".into(),
            description: "Teasing".into(),
        })
        .await
        .unwrap();
    let saved = std::fs::read(&f.paths.persona).unwrap();
    assert_eq!(
        PersonaDocument::from_slice(&saved).moods["Playful"],
        "Teasing"
    );

    assert!(
        f.app
            .edit_persona(PersonaEdit::DeleteMood("Nope".into()))
            .await
            .is_err()
    );
    assert_eq!(std::fs::read(&f.paths.persona).unwrap(), saved);

    f.app.shutdown().await;
}

#[tokio::test]
async fn console_commands_drive_the_app() {
    let mut f = fixture();
    f.app.startup().await;
    write_exchange(
        &f.paths.exchange,
        json!({"sender": "Alex", "message": "hey", "Loving": "Hi!", "Reply": ""}),
    );
    pump_until(&mut f.app, |app| !app.view().replies.is_empty()).await;

    let out = f.app.handle_command(ConsoleCommand::Confirm).await;
    assert_eq!(out, "Error: no mood selected");

    let out = f
        .app
        .handle_command(ConsoleCommand::Select("Loving".into()))
        .await;
    assert_eq!(out, "Selected Loving");
    assert_eq!(f.app.handle_command(ConsoleCommand::Confirm).await, "Sent");
    assert_eq!(read_json(&f.paths.exchange)["reply"], "Hi!");

    let out = f.app.handle_command(ConsoleCommand::Name("Riley".into())).await;
    assert_eq!(out, "Persona saved");
    assert_eq!(f.app.persona().name, "Riley");

    let status = f.app.handle_command(ConsoleCommand::Status).await;
    assert!(status.contains("You replied: Hi!"));
    assert!(status.contains("Worker:  stopped"));

    f.app.shutdown().await;
}
