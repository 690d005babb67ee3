//! View controllers.
//!
//! Each controller owns its view state behind a lock and exposes snapshots.
//! Loads started while an earlier one is still in flight supersede it; the
//! earlier response is dropped when it arrives.

pub mod auth_gate;
pub mod explorer;
pub mod generation;
pub mod runner;

pub use auth_gate::{AuthGate, AuthState};
pub use explorer::{DEFAULT_PAGE_LIMIT, ExplorerState, TableExplorer};
pub use generation::{Generation, RequestTracker};
pub use runner::{DraftPatch, FilterDraft, QueryRunner, RunnerState};
