//! Client for a departmental notice board: authenticated REST access, a
//! filtered and paginated notice feed, and live refresh from push events.

pub mod api;
pub mod config;
pub mod error;
pub mod live;
pub mod logger;
pub mod models;
pub mod notify;
pub mod session;
pub mod storage;
pub mod store;
pub mod view;

#[cfg(test)]
mod fake;

pub use error::{ClientError, Result};
