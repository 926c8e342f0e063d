//! "Reply needed" notifications.
//!
//! The gate fires at most once per `(sender, message)` event while the
//! exchange has no decision, and forgets the event as soon as a decision
//! appears so a later identical message notifies again.

use std::io;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::config::NotifierBackend;

pub const NOTIFICATION_TITLE: &str = "Reply Needed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn reply_needed(sender: &str, message: &str) -> Self {
        let body = match (sender.is_empty(), message.is_empty()) {
            (true, true) => "A conversation has no selected reply yet.".to_string(),
            (true, false) => format!("No selected reply for: {message}"),
            _ => format!("No selected reply for {sender}: {message}"),
        };
        Self {
            title: NOTIFICATION_TITLE.to_string(),
            body,
        }
    }
}

/// Deduplicates notifications by `(sender, message)`.
#[derive(Debug, Default)]
pub struct NotificationGate {
    last_notified: Option<(String, String)>,
}

impl NotificationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether the observed exchange state warrants a notification.
    pub fn evaluate(
        &mut self,
        sender: &str,
        message: &str,
        reply_is_empty: bool,
    ) -> Option<Notification> {
        if !reply_is_empty {
            self.clear();
            return None;
        }

        if self.last_notified() == Some((sender, message)) {
            return None;
        }
        self.last_notified = Some((sender.to_string(), message.to_string()));
        Some(Notification::reply_needed(sender, message))
    }

    pub fn clear(&mut self) {
        self.last_notified = None;
    }

    pub fn last_notified(&self) -> Option<(&str, &str)> {
        self.last_notified
            .as_ref()
            .map(|(sender, message)| (sender.as_str(), message.as_str()))
    }
}

/// Posts notifications. Implementations must not block the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> io::Result<()>;
}

/// Writes notifications to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> io::Result<()> {
        info!(title = %notification.title, "{}", notification.body);
        Ok(())
    }
}

/// Hands notifications to the desktop via `osascript` or `notify-send`.
pub struct CommandNotifier;

impl CommandNotifier {
    fn command(notification: &Notification) -> Command {
        if cfg!(target_os = "macos") {
            let script = format!(
                "display notification {} with title {}",
                applescript_string(&notification.body),
                applescript_string(&notification.title)
            );
            let mut cmd = Command::new("osascript");
            cmd.arg("-e").arg(script);
            cmd
        } else {
            let mut cmd = Command::new("notify-send");
            cmd.arg(&notification.title).arg(&notification.body);
            cmd
        }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, notification: &Notification) -> io::Result<()> {
        let mut child = Self::command(notification)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        // Reap in the background.
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    debug!(code = ?status.code(), "Notification command failed")
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Notification command wait failed"),
            }
        });
        Ok(())
    }
}

pub fn notifier_for(backend: NotifierBackend) -> Box<dyn Notifier> {
    match backend {
        NotifierBackend::Log => Box::new(LogNotifier),
        NotifierBackend::Command => Box::new(CommandNotifier),
    }
}

fn applescript_string(raw: &str) -> String {
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}
