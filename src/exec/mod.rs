// src/exec/mod.rs

//! Execution backends.
//!
//! - [`submitter`] defines the [`Submitter`] contract the duty scheduler
//!   drives, plus command normalisation.
//! - [`local`], [`remote`] and [`cloud`] are the built-in backends.

pub mod cloud;
pub mod local;
pub mod remote;
pub mod submitter;

pub use cloud::{CloudApiConfig, CloudApiSubmitter};
pub use local::{LocalSubmitter, LocalSubmitterConfig};
pub use remote::{RemoteQueueConfig, RemoteQueueSubmitter};
pub use submitter::{normalize_command, Hints, JobStatus, SubmitFuture, Submitter};
