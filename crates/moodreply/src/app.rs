//! Application controller.
//!
//! [`App`] is the only consumer of the event queue and the only code that
//! mutates [`ViewState`]. The poller and the console reader produce events;
//! the worker supervisor runs on its own and is only told to enable or
//! disable.

use std::fmt::Write as _;
use std::future::Future;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Duration;

use moodreply_protocol::exchange::{IGNORE, REFRESH};
use moodreply_protocol::{ExchangeDocument, PersonaDocument};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{Config, InstallPaths};
use crate::frontend::{ConsoleCommand, HELP};
use crate::notify::{NotificationGate, Notifier};
use crate::persona::{PersonaEdit, PersonaError};
use crate::process::{LaunchSpec, SupervisorHandle, WorkerState, WorkerStatus};
use crate::store::{FileExchangeStore, FilePersonaStore, StorageError, ensure_dir};
use crate::sync::{ExchangeChannel, Poller};
use crate::view::ViewState;

/// How long shutdown waits for the worker to exit after SIGTERM.
const WORKER_STOP_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug)]
pub enum AppEvent {
    /// A document read by the poller during `epoch`.
    ExchangePolled { epoch: u64, doc: ExchangeDocument },
    Command(ConsoleCommand),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Persona(#[from] PersonaError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("no mood selected")]
    NoSelection,

    #[error("no candidate for mood: {0}")]
    UnknownMood(String),

    #[error("nothing is being edited")]
    NotEditing,
}

pub struct App {
    persona_store: FilePersonaStore,
    persona: PersonaDocument,
    channel: ExchangeChannel,
    supervisor: SupervisorHandle,
    worker_enabled: bool,
    notifier: Box<dyn Notifier>,
    gate: NotificationGate,
    notifications_enabled: bool,
    view: ViewState,
    root: PathBuf,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl App {
    /// Wire up stores, poller, channel, and supervisor. Nothing starts yet.
    pub fn new(paths: &InstallPaths, config: &Config, notifier: Box<dyn Notifier>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let exchange_store = FileExchangeStore::new(&paths.exchange);
        let poller = Poller::new(
            exchange_store.clone(),
            config.poll.interval(),
            events_tx.clone(),
        );
        let channel = ExchangeChannel::new(exchange_store, poller, config.poll.write_grace());
        let supervisor = SupervisorHandle::spawn(
            LaunchSpec::from_config(&config.worker, paths),
            config.worker.restart_cooldown(),
        );

        Self {
            persona_store: FilePersonaStore::new(&paths.persona),
            persona: PersonaDocument::default(),
            channel,
            supervisor,
            worker_enabled: config.worker.enabled,
            notifier,
            gate: NotificationGate::new(),
            notifications_enabled: config.notifications.enabled,
            view: ViewState::new(),
            root: paths.root.clone(),
            events_tx,
            events_rx,
        }
    }

    /// Sender for additional event producers such as the console reader.
    pub fn event_sender(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.events_tx.clone()
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn persona(&self) -> &PersonaDocument {
        &self.persona
    }

    pub fn poller(&self) -> &Poller {
        self.channel.poller()
    }

    pub fn worker_status(&self) -> WorkerStatus {
        self.supervisor.status()
    }

    pub fn notifications_enabled(&self) -> bool {
        self.notifications_enabled
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Prepare the installation root, load the persona, start polling, and
    /// launch the worker.
    pub async fn startup(&mut self) {
        if let Err(e) = ensure_dir(&self.root).await {
            warn!(error = %e, "Failed to create installation root");
        }
        self.persona = self.persona_store.load_or_init().await;
        self.channel.poller().start();
        if self.worker_enabled {
            self.supervisor.enable();
        } else {
            info!("Worker disabled by configuration");
        }
        info!(root = %self.root.display(), persona = %self.persona.name, "Started");
    }

    /// Disable the worker and stop polling.
    pub async fn shutdown(&mut self) {
        info!("Shutting down");
        self.supervisor.shutdown(WORKER_STOP_GRACE).await;
        self.channel.poller().stop();
    }

    /// Run until `shutdown` resolves or the user quits.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        self.startup().await;

        tokio::pin!(shutdown);
        loop {
            let event = tokio::select! {
                _ = &mut shutdown => break,
                event = self.events_rx.recv() => event,
            };
            let Some(event) = event else { break };
            if self.handle_event(event).await.is_break() {
                break;
            }
        }

        self.shutdown().await;
    }

    /// Wait for the next event and handle it.
    pub async fn process_next(&mut self) -> ControlFlow<()> {
        match self.events_rx.recv().await {
            Some(event) => self.handle_event(event).await,
            None => ControlFlow::Break(()),
        }
    }

    async fn handle_event(&mut self, event: AppEvent) -> ControlFlow<()> {
        match event {
            AppEvent::ExchangePolled { epoch, doc } => {
                if epoch == self.poller().epoch() {
                    self.on_exchange(doc);
                } else {
                    debug!(epoch, "Dropping exchange read before a local write");
                }
                ControlFlow::Continue(())
            }
            AppEvent::Command(ConsoleCommand::Quit) => ControlFlow::Break(()),
            AppEvent::Command(command) => {
                let output = self.handle_command(command).await;
                println!("{output}");
                ControlFlow::Continue(())
            }
        }
    }

    fn on_exchange(&mut self, doc: ExchangeDocument) {
        if doc.is_pending() {
            if self.notifications_enabled
                && let Some(notification) = self.gate.evaluate(&doc.sender, &doc.message, true)
            {
                if let Err(e) = self.notifier.notify(&notification) {
                    warn!(error = %e, "Failed to post notification");
                }
            }
        } else {
            self.gate.clear();
        }
        self.view.apply_exchange(doc);
    }

    // ========================================================================
    // Persona
    // ========================================================================

    /// Apply a persona edit and save it before returning.
    ///
    /// Rejected edits and failed saves leave the persona unchanged.
    pub async fn edit_persona(&mut self, edit: PersonaEdit) -> Result<(), AppError> {
        let mut updated = self.persona.clone();
        edit.apply(&mut updated)?;
        if let Err(e) = self.persona_store.save(&updated).await {
            warn!(error = %e, "Failed to save persona");
            return Err(e.into());
        }
        self.persona = updated;
        Ok(())
    }

    // ========================================================================
    // Reply actions
    // ========================================================================

    /// Toggle the selected mood.
    pub fn select_mood(&mut self, mood: &str) -> Result<(), AppError> {
        if self.view.select_mood(mood) {
            Ok(())
        } else {
            Err(AppError::UnknownMood(mood.to_string()))
        }
    }

    /// Send the selected candidate.
    pub async fn confirm_selection(&mut self) -> Result<(), AppError> {
        let mood = self
            .view
            .selected_mood()
            .ok_or(AppError::NoSelection)?
            .to_string();
        let text = self.view.candidate(&mood).unwrap_or(mood.as_str()).to_string();

        self.channel.select_reply(&mood, &text).await?;
        self.view.set_decision(&mood);
        self.view.clear_selection();
        info!(mood = %mood, "Reply confirmed");
        Ok(())
    }

    pub async fn request_refresh(&mut self) -> Result<(), AppError> {
        self.channel.request_refresh().await?;
        self.view.set_decision(REFRESH);
        info!("Refresh requested");
        Ok(())
    }

    pub async fn request_ignore(&mut self) -> Result<(), AppError> {
        self.channel.request_ignore().await?;
        self.view.set_decision(IGNORE);
        info!("Message ignored");
        Ok(())
    }

    pub fn begin_edit(&mut self, mood: &str) -> Result<(), AppError> {
        if self.view.begin_edit(mood) {
            Ok(())
        } else {
            Err(AppError::UnknownMood(mood.to_string()))
        }
    }

    pub fn update_draft(&mut self, text: &str) -> Result<(), AppError> {
        if self.view.update_draft(text) {
            Ok(())
        } else {
            Err(AppError::NotEditing)
        }
    }

    pub fn cancel_edit(&mut self) {
        self.view.cancel_edit();
    }

    /// Write the draft back as the mood's candidate.
    ///
    /// On failure the edit buffer is restored so the draft is not lost.
    pub async fn save_edit(&mut self) -> Result<(), AppError> {
        let edit = self.view.take_edit().ok_or(AppError::NotEditing)?;
        match self.channel.edit_candidate(&edit.mood, &edit.draft).await {
            Ok(_) => {
                self.view.set_candidate(&edit.mood, &edit.draft);
                debug!(mood = %edit.mood, "Candidate edited");
                Ok(())
            }
            Err(e) => {
                if self.view.begin_edit(&edit.mood) {
                    self.view.update_draft(&edit.draft);
                }
                Err(e.into())
            }
        }
    }

    // ========================================================================
    // Toggles
    // ========================================================================

    pub fn set_notifications_enabled(&mut self, enabled: bool) {
        self.notifications_enabled = enabled;
        info!(enabled, "Notifications toggled");
    }

    pub fn set_worker_enabled(&mut self, enabled: bool) {
        self.worker_enabled = enabled;
        if enabled {
            self.supervisor.enable();
        } else {
            self.supervisor.disable();
        }
    }

    // ========================================================================
    // Console
    // ========================================================================

    /// Execute a console command and return the text to show.
    pub async fn handle_command(&mut self, command: ConsoleCommand) -> String {
        let result = match command {
            ConsoleCommand::Status => return self.render_status(),
            ConsoleCommand::Persona => return render_persona(&self.persona),
            ConsoleCommand::Help => return HELP.to_string(),
            ConsoleCommand::Quit => return String::new(),
            ConsoleCommand::Select(mood) => self.select_mood(&mood).map(|()| {
                match self.view.selected_mood() {
                    Some(selected) => format!("Selected {selected}"),
                    None => "Selection cleared".to_string(),
                }
            }),
            ConsoleCommand::Confirm => self.confirm_selection().await.map(|()| "Sent".to_string()),
            ConsoleCommand::Refresh => self
                .request_refresh()
                .await
                .map(|()| "Refresh requested".to_string()),
            ConsoleCommand::Ignore => self.request_ignore().await.map(|()| "Ignored".to_string()),
            ConsoleCommand::Edit { mood, text } => self.edit_candidate(&mood, &text).await,
            ConsoleCommand::Name(name) => self.persona_command(PersonaEdit::SetName(name)).await,
            ConsoleCommand::Description(text) => {
                self.persona_command(PersonaEdit::SetDescription(text))
                    .await
            }
            ConsoleCommand::MoodAdd { name, description } => {
                self.persona_command(PersonaEdit::AddMood { name, description })
                    .await
            }
            ConsoleCommand::MoodEdit {
                old_name,
                new_name,
                description,
            } => {
                self.persona_command(PersonaEdit::EditMood {
                    old_name,
                    new_name,
                    description,
                })
                .await
            }
            ConsoleCommand::MoodDelete(name) => {
                self.persona_command(PersonaEdit::DeleteMood(name)).await
            }
            ConsoleCommand::Phones(mode) => {
                self.persona_command(PersonaEdit::SetPhoneListMode(mode))
                    .await
            }
            ConsoleCommand::PhoneAdd(number) => {
                self.persona_command(PersonaEdit::AddPhoneNumber(number))
                    .await
            }
            ConsoleCommand::PhoneRemove(index) => {
                self.persona_command(PersonaEdit::RemovePhoneNumber(index))
                    .await
            }
            ConsoleCommand::Notifications(enabled) => {
                self.set_notifications_enabled(enabled);
                Ok(format!("Notifications {}", on_off(enabled)))
            }
            ConsoleCommand::Worker(enabled) => {
                self.set_worker_enabled(enabled);
                Ok(format!("Worker {}", on_off(enabled)))
            }
        };

        result.unwrap_or_else(|e| format!("Error: {e}"))
    }

    async fn edit_candidate(&mut self, mood: &str, text: &str) -> Result<String, AppError> {
        self.begin_edit(mood)?;
        self.update_draft(text)?;
        self.save_edit().await?;
        Ok(format!("Updated {mood}"))
    }

    async fn persona_command(&mut self, edit: PersonaEdit) -> Result<String, AppError> {
        self.edit_persona(edit).await?;
        Ok("Persona saved".to_string())
    }

    fn render_status(&self) -> String {
        let mut out = self.view.render();
        let _ = writeln!(out, "Worker:  {}", describe_worker(&self.supervisor.status()));
        let _ = write!(out, "Notifications: {}", on_off(self.notifications_enabled));
        out
    }
}

fn describe_worker(status: &WorkerStatus) -> String {
    let state = match &status.state {
        WorkerState::Stopped => "stopped".to_string(),
        WorkerState::Starting => "starting".to_string(),
        WorkerState::Running { pid: Some(pid) } => format!("running (pid {pid})"),
        WorkerState::Running { pid: None } => "running".to_string(),
        WorkerState::Exited { code } => match code {
            Some(code) => format!("exited with {code}, restarting"),
            None => "killed by signal, restarting".to_string(),
        },
    };
    match &status.last_error {
        Some(error) => format!("{state} (last error: {error})"),
        None => state,
    }
}

fn render_persona(persona: &PersonaDocument) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Name: {}", persona.name);
    let _ = writeln!(out, "About: {}", persona.personal_description);
    let _ = writeln!(out, "Moods:");
    let mut moods: Vec<_> = persona.moods.iter().collect();
    moods.sort_by_key(|(name, _)| name.to_lowercase());
    for (name, description) in moods {
        let _ = writeln!(out, "  {name}: {description}");
    }
    let _ = writeln!(out, "Phone list: {}", persona.phone_list_mode.as_str());
    for (i, number) in persona.phone_numbers.iter().enumerate() {
        let _ = writeln!(out, "  {}. {number}", i + 1);
    }
    out.trim_end().to_string()
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}
