#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]

//! Resolver worker and its host.
//!
//! The worker runs the resolve + transform pipeline on its own thread and
//! talks to the host only through framed messages on a single channel:
//! - [`spawn_worker`] starts the worker loop
//! - [`WorkerHost`] correlates requests with replies and fails every pending
//!   request when the worker dies or is torn down
//! - [`ScriptBridge`] is the host plugin: it checks the resolution cache,
//!   asks the worker for missing packages, persists what comes back and
//!   transforms the requesting file
//!
//! See `scriptbridge-proto` for the message types.

mod bridge;
mod convert;
mod error;
mod handler;
mod host;
mod worker;

pub use bridge::{AddedPackage, ScriptBridge};
pub use error::WorkerError;
pub use handler::handle_request;
pub use host::WorkerHost;
pub use worker::{spawn_worker, WorkerChannel};

#[cfg(test)]
mod test_support;
