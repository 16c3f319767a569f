//! History adapters.
//!
//! - `rest_client` - `HistoryFetcher` over the REST messages API (reqwest)

mod rest_client;

pub use rest_client::{RestHistoryClient, RestHistoryConfig};
