//! Asset discovery and dispatch.
//!
//! Streams every HTML document of a source tree to the output tree and,
//! while doing so, schedules one transform per distinct referenced asset.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │ orchestrator   discover *.html, await everything   │
//! └──────────────┬─────────────────────────────────────┘
//!                │ per document (blocking worker)
//! ┌──────────────▼─────────────────────────────────────┐
//! │ dispatch       lol_html stream -> matcher          │
//! │                -> resolve -> dedup -> spawn        │
//! └──────────────┬─────────────────────────────────────┘
//!                │ per distinct asset (semaphore)
//! ┌──────────────▼─────────────────────────────────────┐
//! │ Transform      asset::{js, css, copy, command}     │
//! └────────────────────────────────────────────────────┘
//! ```

mod dedup;
mod dispatch;
mod error;
mod matcher;
mod orchestrator;
mod plugin;
mod registry;
mod resolve;


pub use error::{BuildFailure, Failure, PipelineError};
pub use matcher::Tag;
pub use orchestrator::{BuildSummary, Configuration, run};
pub use plugin::{Constraint, Plugin, Processor, TagEditor, Target, Transform};
pub use registry::RegistryError;
pub use resolve::ProcessingContext;
