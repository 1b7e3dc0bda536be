// src/engine/mod.rs

//! Orchestration engine for runwarden.
//!
//! Three independent loops share one [`System`](crate::system::System):
//! - the filesystem event consumer (classifier), see [`runtime`]
//! - the run / file finalization poller, see [`poller`]
//! - the duty scheduler, see [`scheduler`]

pub mod poller;
pub mod runtime;
pub mod scheduler;

pub use poller::{RunPoller, FINISHED_TAG};
pub use runtime::{install_shutdown_handler, run_service};
pub use scheduler::{DutyScheduler, DutyTally};
