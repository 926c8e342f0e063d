//! Polling exchange protocol between this process and the worker.

pub mod channel;
pub mod poller;

pub use channel::ExchangeChannel;
pub use poller::{Poller, PollerState};
