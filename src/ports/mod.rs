//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the messaging engine and the outside world. Adapters implement these ports.
//!
//! ## Identity and Access
//!
//! - `SessionValidator` - Validates the token presented at connect time
//! - `AccessChecker` - Capability checks for rooms and mutations
//!
//! ## Persistence Collaborators
//!
//! - `MessageStore` - Applies accepted mutations to stored messages
//! - `ReadMarkerStore` - Per-user read positions
//! - `HistoryFetcher` - REST history pages for client timelines
//!
//! ## Delivery
//!
//! - `RoomBroadcaster` - Fan-out of server events to room members

mod access_checker;
mod history_fetcher;
mod message_store;
mod read_marker_store;
mod room_broadcaster;
mod session_validator;

pub use access_checker::{AccessChecker, AccessResult, Capability};
pub use history_fetcher::{HistoryError, HistoryFetcher};
pub use message_store::MessageStore;
pub use read_marker_store::{ReadMarker, ReadMarkerStore};
pub use room_broadcaster::{BroadcastError, DeliveryReport, RoomBroadcaster};
pub use session_validator::SessionValidator;
