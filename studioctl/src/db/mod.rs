//! Persistence for accounts, organizations, quota counters and creation records.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ Ledger / Orchestrator│
//! └──────────┬───────────┘
//!            │  Arc<dyn Store>
//!            ↓
//! ┌──────────────────────┐      ┌──────────────┐
//! │    PostgresStore     │ ──→  │ Repositories │ (db::handlers, over PgConnection)
//! └──────────────────────┘      └──────┬───────┘
//! ┌──────────────────────┐             ↓
//! │     MemoryStore      │      ┌──────────────┐
//! └──────────────────────┘      │  PostgreSQL  │
//!                               └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`store`]: the storage traits the rest of the crate depends on
//! - [`handlers`]: Postgres repositories, one per table group
//! - [`models`]: record structures shared by both backends
//! - [`postgres`] / [`memory`]: the two backends
//! - [`errors`]: storage error type
//!
//! # Migrations
//!
//! Migrations live in `migrations/` and are embedded with [`crate::migrator`]. They run on
//! startup when the Postgres backend is selected.

pub mod errors;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

use crate::config::DatabaseConfig;
use memory::MemoryStore;
use postgres::PostgresStore;
use std::sync::Arc;
pub use store::{AccountStore, CreationStore, OrganizationStore, Store, UsageStore};
use tracing::info;

/// Connect to the configured backend, running migrations for Postgres
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn Store>> {
    match config {
        DatabaseConfig::External { url, pool } => {
            info!("Using external database");
            let pg = sqlx::postgres::PgPoolOptions::new()
                .max_connections(pool.max_connections)
                .min_connections(pool.min_connections)
                .acquire_timeout(pool.acquire_timeout)
                .connect(url)
                .await?;
            crate::migrator().run(&pg).await?;
            Ok(Arc::new(PostgresStore::new(pg)))
        }
        DatabaseConfig::Memory => {
            info!("Using in-memory store; data will be lost on shutdown");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
