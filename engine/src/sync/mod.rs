//! Incremental synchronization for disconnected clients.
//!
//! A client keeps one opaque [`SyncId`] per view. Each round it sends the id
//! back, receives the rows that changed since, and stores the id of the
//! last row it applied.

pub mod batch;
pub mod hint;
pub mod stamp;

pub use batch::{BatchMode, SyncBatch, SyncEntry, SyncMode, SyncPage};
pub use hint::SyncHint;
pub use stamp::SyncColumnKind;

use crate::{error::Result, Selector, SyncId};

/// Resolves synchronized views.
pub trait ViewCatalog {
    /// A selector over the view's rows, already composed.
    fn view_selector(&self, view: &str) -> Result<Selector>;

    /// The view's current version, for full-snapshot synchronization.
    fn view_version(&self, view: &str) -> Result<SyncId>;
}
