//! # Laudo Core
//!
//! Report authoring for the Laudo digital report system.
//!
//! This crate holds everything a report goes through between the first keystroke and the
//! exported PNG:
//! - the report state and the commands that change it ([`state`])
//! - the exam template catalog ([`catalog`])
//! - report numbering, persisted separately from the draft ([`numbering`])
//! - draft saving and staged restoration ([`draft`])
//! - page layout with HTML and SVG output ([`preview`]) and page navigation ([`pagination`])
//! - raster export ([`export`])
//! - the orchestrator tying these together ([`app`]) and its async host ([`session`])
//!
//! **No I/O surfaces**: command-line parsing and the stdin protocol belong in `laudo-cli` and
//! the `laudo-run` binary. Configuration is resolved once into [`config::CoreConfig`] and
//! passed in.

pub mod app;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod draft;
pub mod error;
pub mod export;
pub mod notification;
pub mod numbering;
pub mod pagination;
pub mod preview;
pub mod session;
pub mod state;
pub mod store;

pub use app::{LaudoApp, Snapshot};
pub use config::CoreConfig;
pub use error::{LaudoError, LaudoResult};
pub use laudo_types as types;
pub use state::{ReportCommand, ReportState};
