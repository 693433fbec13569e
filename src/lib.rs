//! Command-line client for the Rancher v1 / v2-beta API
//!
//! The library side holds everything the `rancherctl` binary drives:
//! the HTTP transport, typed wrappers over remote resources, the lifecycle
//! engine that waits for objects to settle, and the CLI surface itself.

pub mod cli;
pub mod client;
pub mod context;
pub mod lifecycle;
pub mod merge;
pub mod resource;

pub use client::{RancherApi, Transport, TransportError};
pub use lifecycle::{Lifecycle, LifecycleError, WaitOptions};
pub use resource::{Filter, Resource, Service};
