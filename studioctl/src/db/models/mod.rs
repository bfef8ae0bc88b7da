//! Database record models matching table schemas.
//!
//! These structs are the storage-side representation of accounts, organizations,
//! creation records and usage counters. Both store backends ([`crate::db::postgres`] and
//! [`crate::db::memory`]) speak in these types; API models in [`crate::api::models`]
//! convert from them.
//!
//! - [`accounts`]: end user accounts and their tier
//! - [`organizations`]: school / district tenants and their per-learner limits
//! - [`creations`]: creation records and their lifecycle
//! - [`usage`]: quota reservations and usage counters

pub mod accounts;
pub mod creations;
pub mod organizations;
pub mod usage;
