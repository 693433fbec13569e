//! Mutating operations that wait for the remote object to settle
//!
//! Each operation issues one write, then (when a timeout is given) polls the
//! object once per second until it reaches the target state. Upgrades and
//! creates can undo themselves when the deadline passes.

pub mod operations;
pub mod prefetch;
pub mod wait;

use thiserror::Error;

use crate::client::TransportError;
use crate::resource::RuleError;

pub use operations::WaitOptions;
pub use prefetch::{ImagePrefetch, PrefetchTarget};
pub use wait::{Condition, Convergence, Lifecycle};

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("{kind} '{name}' does not exist")]
    Vanished { kind: String, name: String },

    #[error("{kind} '{name}' does not advertise a '{link}' link")]
    MissingLink {
        kind: String,
        name: String,
        link: &'static str,
    },

    #[error("Timeout should be a positive number of seconds")]
    InvalidTimeout,

    #[error("Server rejected {operation} of '{name}'")]
    Rejected { operation: &'static str, name: String },

    #[error("TIMEOUT ({timeout}s): unable to complete {operation} of '{name}'")]
    TimedOut {
        operation: &'static str,
        name: String,
        timeout: u64,
    },

    #[error("{operation} of '{name}' did not finish within {timeout}s and was rolled back")]
    RolledBack {
        operation: &'static str,
        name: String,
        timeout: u64,
    },
}
