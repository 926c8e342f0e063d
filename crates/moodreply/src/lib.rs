//! moodreply - persona editor and supervisor for a file-synchronized reply worker.
//!
//! The application and the worker share no memory; they coordinate through
//! `config.json` (persona, written here) and `replies.json` (exchange,
//! written by both sides) in the installation root.

pub mod app;
pub mod config;
pub mod frontend;
pub mod notify;
pub mod persona;
pub mod process;
pub mod store;
pub mod sync;
pub mod view;
