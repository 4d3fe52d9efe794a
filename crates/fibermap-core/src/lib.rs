//! Fibermap core library: turns an optical-fiber installation spreadsheet into
//! a cabinet / module / splice-unit / fiber model and tracks per-port
//! configuration progress on top of it.
//!
//! - [`extract`] reads a worksheet and rebuilds the model from scratch.
//! - [`progress`] merges saved port settings back onto a model, computes
//!   statistics, and drives the interactive configuration session.
//! - [`store`] persists project documents in SQLite.
//!
//! The crate logs through `tracing` and never installs a subscriber.

pub mod errors;
pub mod extract;
pub mod limits;
pub mod models;
pub mod progress;
pub mod store;

pub use errors::{FiberError, FiberResult};
pub use extract::pipeline::{process_sheet, ExtractOptions, Extraction};
pub use models::{FiberStats, FiberStatus, ProjectModel};
pub use progress::overlay::{extract_overlay, merge_overlay, MergedModel, SavedConfig};
pub use progress::session::ConfigSession;
pub use progress::stats::compute_stats;
pub use store::database::{MemoryProjectStore, ProjectStore, SqliteProjectStore};
