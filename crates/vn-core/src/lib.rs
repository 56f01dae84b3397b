//! Node lifecycle & switching engine.
//!
//! Owns the candidate-node registry, concurrent latency probing,
//! deterministic selection, atomic configuration replacement with verified
//! rollback, and the direct/chained topology state machine. The tunneling
//! engine itself and the OS service manager are external collaborators:
//! the former consumes the config file this crate writes, the latter is
//! driven through the [`service::ServiceControl`] trait.

pub mod backup;
pub mod config;
pub mod error;
pub mod mode;
pub mod probe;
pub mod registry;
pub mod select;
pub mod service;
pub mod status;
pub mod switch;
pub mod types;
pub mod util;

pub use error::{Error, Result};
