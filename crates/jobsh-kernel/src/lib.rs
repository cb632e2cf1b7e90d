//! jobsh-kernel: the job-control core of jobsh.
//!
//! This crate provides:
//!
//! - **Registry**: job and process records, the running and stopped lists
//! - **Pipeline executor**: spawns a job's processes into one process group,
//!   wired with pipes and redirections
//! - **Status reaper**: turns wait results into record updates
//! - **Terminal controller**: session setup and terminal ownership handoff
//! - **Notification**: reports completed and stopped jobs exactly once
//! - **Os**: the platform boundary, with a nix-backed implementation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        JobControl                           │
//! │  submit(spec) → JobId        launch(JobId) → JobOutcome     │
//! │  resume(JobId, fg)           poll() / notify_pass()         │
//! │                                                             │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌─────────────┐  │
//! │  │ Registry │◀─│  Reaper  │◀─│ Terminal │◀─│  Pipeline   │  │
//! │  └──────────┘  └──────────┘  └──────────┘  └─────────────┘  │
//! │        ▲             │ wait_any                  │ spawn    │
//! │        │             ▼                           ▼          │
//! │  ┌──────────┐  ┌───────────────────────────────────────┐    │
//! │  │  Notice  │  │         Os (UnixOs / mock)            │    │
//! │  └──────────┘  └───────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! SIGCHLD only raises a flag. The driver calls [`JobControl::poll`] at
//! points it chooses, and every registry mutation runs on the main flow
//! inside [`JobControl::with_child_status_suppressed`].

pub mod config;
pub mod control;
pub mod error;
pub mod notify;
pub mod os;
pub mod pipeline;
pub mod reaper;
pub mod registry;
pub mod terminal;

pub use config::{Interactivity, ShellConfig};
pub use control::{JobControl, JobOutcome};
pub use error::{JobError, LaunchError, SessionError};
pub use notify::Notice;
pub use os::{Os, SpawnRequest, UnixOs};
pub use reaper::Reaped;
pub use registry::{Job, ListKind, Process, Registry};
