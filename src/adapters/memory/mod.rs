//! In-process adapters for development and tests.
//!
//! - `InMemoryMessageStore` - `MessageStore` and `HistoryFetcher`
//! - `InMemoryReadMarkerStore` - `ReadMarkerStore`
//! - `StaticAccessChecker` - rule-based `AccessChecker`

mod access_checker;
mod message_store;
mod read_markers;

pub use access_checker::StaticAccessChecker;
pub use message_store::InMemoryMessageStore;
pub use read_markers::InMemoryReadMarkerStore;
