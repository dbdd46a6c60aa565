//! Catalog engine: metadata ingestion into a redb-backed music library,
//! album and playlist views, derived playlist covers, user accounts, and
//! persisted playback state.

mod covers;
mod playback;
pub mod player;
mod playlists;
mod reader;
mod scan_guard;
mod store;
mod users;
mod writer;

pub use covers::{CoverPlan, CoverStore};
pub use playback::{PlayerState, StateUpdate, MAX_VOLUME};
pub use scan_guard::ScanCoordinator;
pub use store::{Catalog, CatalogError, ResolvedList};
pub use writer::{ScanEvent, ScanStats};
