//! Fetch Slack workspace exports through the web UI.
//!
//! There is no public API for triggering or listing workspace exports, so
//! everything here replays a logged-in browser session:
//!
//! - [`listing`] scrapes the export listing page into [`ExportRecord`]s
//! - [`trigger`] drives the export wizard in a headless browser
//! - [`download`] streams ready archives into the local export directory

pub mod config;
pub mod download;
pub mod error;
pub mod listing;
pub mod session;
pub mod trigger;

pub use config::Config;
pub use download::{DownloadOrchestrator, DownloadSummary};
pub use error::{Error, ErrorKind, Result};
pub use listing::{ExportRecord, ListingClient};
pub use session::{SessionContext, SessionCookie};
pub use trigger::{DateRange, ExportTrigger, TriggerState};
