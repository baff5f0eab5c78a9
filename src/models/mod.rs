//! Data models for BillManager entities.
//!
//! This module contains the data structures shared by the client surfaces:
//!
//! - `User`, `CurrentUserReply`: the authenticated identity and the two
//!   historical wire shapes it is normalized from
//! - `DatabaseSummary`, `ServerMode`, `ServerConfig`: bill groups and
//!   server deployment info
//! - `Bill`, `ShareInfo`: bills including shared-bill metadata
//! - `Payment`: payment history entries used for lists and charts

pub mod bill;
pub mod database;
pub mod payment;
pub mod user;

pub use bill::{Bill, ShareInfo};
pub use database::{DatabaseSummary, ServerConfig, ServerMode};
pub use payment::Payment;
pub use user::{CurrentUserReply, User};
