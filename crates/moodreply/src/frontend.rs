//! Line-oriented console front end.
//!
//! Each stdin line is parsed into a [`ConsoleCommand`] and handed to the
//! application event queue. The front end never touches files or the worker.

use moodreply_protocol::PhoneListMode;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::app::AppEvent;

pub const HELP: &str = "\
Commands:
  status                          show the current exchange
  persona                         show the persona
  select <mood>                   select (or unselect) a candidate
  confirm                         send the selected candidate
  refresh                         ask the worker for new candidates
  ignore                          skip this message
  edit <mood> <text>              replace a candidate
  name <text>                     set the persona name
  description <text>              set the personal description
  mood add <name> = <description>
  mood edit <name> = <new name> = <description>
  mood delete <name>
  phones include|exclude          how the phone list is used
  phone add <number>
  phone remove <position>
  notifications on|off
  worker on|off                   keep the reply worker running
  help
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Status,
    Persona,
    Select(String),
    Confirm,
    Refresh,
    Ignore,
    Edit { mood: String, text: String },
    Name(String),
    Description(String),
    MoodAdd { name: String, description: String },
    MoodEdit {
        old_name: String,
        new_name: String,
        description: String,
    },
    MoodDelete(String),
    Phones(PhoneListMode),
    PhoneAdd(String),
    /// Zero-based; the console shows positions starting at 1.
    PhoneRemove(usize),
    Notifications(bool),
    Worker(bool),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: {0} (try `help`)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        let (verb, rest) = split_word(line);

        let command = match verb {
            "status" | "s" => Self::Status,
            "persona" => Self::Persona,
            "select" => Self::Select(required(rest, "select <mood>")?),
            "confirm" => Self::Confirm,
            "refresh" => Self::Refresh,
            "ignore" => Self::Ignore,
            "edit" => {
                let (mood, text) = split_word(rest);
                if mood.is_empty() {
                    return Err(CommandError::Usage("edit <mood> <text>"));
                }
                Self::Edit {
                    mood: mood.to_string(),
                    text: text.to_string(),
                }
            }
            "name" => Self::Name(required(rest, "name <text>")?),
            "description" => Self::Description(required(rest, "description <text>")?),
            "mood" => parse_mood(rest)?,
            "phones" => match rest.to_ascii_lowercase().as_str() {
                "include" => Self::Phones(PhoneListMode::Include),
                "exclude" => Self::Phones(PhoneListMode::Exclude),
                _ => return Err(CommandError::Usage("phones include|exclude")),
            },
            "phone" => parse_phone(rest)?,
            "notifications" => Self::Notifications(on_off(rest, "notifications on|off")?),
            "worker" => Self::Worker(on_off(rest, "worker on|off")?),
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

fn parse_mood(rest: &str) -> Result<ConsoleCommand, CommandError> {
    const ADD: &str = "mood add <name> = <description>";
    const EDIT: &str = "mood edit <name> = <new name> = <description>";

    let (action, args) = split_word(rest);
    match action {
        "add" => {
            let mut parts = args.splitn(2, '=').map(str::trim);
            match (parts.next(), parts.next()) {
                (Some(name), Some(description)) if !name.is_empty() => {
                    Ok(ConsoleCommand::MoodAdd {
                        name: name.to_string(),
                        description: description.to_string(),
                    })
                }
                _ => Err(CommandError::Usage(ADD)),
            }
        }
        "edit" => {
            let mut parts = args.splitn(3, '=').map(str::trim);
            match (parts.next(), parts.next(), parts.next()) {
                (Some(old), Some(new), Some(description)) if !old.is_empty() => {
                    Ok(ConsoleCommand::MoodEdit {
                        old_name: old.to_string(),
                        new_name: new.to_string(),
                        description: description.to_string(),
                    })
                }
                _ => Err(CommandError::Usage(EDIT)),
            }
        }
        "delete" => Ok(ConsoleCommand::MoodDelete(required(
            args,
            "mood delete <name>",
        )?)),
        _ => Err(CommandError::Usage(ADD)),
    }
}

fn parse_phone(rest: &str) -> Result<ConsoleCommand, CommandError> {
    const REMOVE: &str = "phone remove <position>";

    let (action, args) = split_word(rest);
    match action {
        "add" => Ok(ConsoleCommand::PhoneAdd(required(args, "phone add <number>")?)),
        "remove" => match args.parse::<usize>() {
            Ok(position) if position >= 1 => Ok(ConsoleCommand::PhoneRemove(position - 1)),
            _ => Err(CommandError::Usage(REMOVE)),
        },
        _ => Err(CommandError::Usage("phone add <number> | phone remove <position>")),
    }
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim();
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

fn required(rest: &str, usage: &'static str) -> Result<String, CommandError> {
    if rest.is_empty() {
        Err(CommandError::Usage(usage))
    } else {
        Ok(rest.to_string())
    }
}

fn on_off(rest: &str, usage: &'static str) -> Result<bool, CommandError> {
    match rest.to_ascii_lowercase().as_str() {
        "on" => Ok(true),
        "off" => Ok(false),
        _ => Err(CommandError::Usage(usage)),
    }
}

/// Read commands from stdin until EOF and forward them as events.
pub fn spawn_stdin_reader(events: mpsc::UnboundedSender<AppEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("stdin closed, console input stopped");
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "stdin read failed, console input stopped");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match ConsoleCommand::parse(&line) {
                Ok(command) => {
                    if events.send(AppEvent::Command(command)).is_err() {
                        break;
                    }
                }
                Err(e) => println!("{e}"),
            }
        }
    })
}
