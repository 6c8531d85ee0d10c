//! Paged, event-refreshed content views over a forensic case database
//!
//! Tree branches are backed by [`children::ChildFactory`] instances that
//! build their keys from a SQL WHERE clause ([`query`]), page them
//! ([`paging`]), and reload when a `RefreshKeys` event reaches them over the
//! [`refresh`] bus, typically sent by an [`events::ViewInvalidator`] reacting
//! to case and ingest notifications.

pub mod children;
pub mod common;
pub mod error;
pub mod events;
pub mod extract;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod paging;
pub mod pool;
pub mod preferences;
pub mod query;
pub mod refresh;
pub mod results;
pub mod summary;

pub use error::{CoreError, CoreResult};
pub use gateway::{CaseQueryGateway, SqliteCaseGateway};
pub use paging::{PagingEngine, PagingState};
pub use preferences::ViewPreferences;
pub use refresh::{RefreshBus, RefreshEvent};
