//! Postgres repositories.
//!
//! Every repository wraps a `&mut PgConnection` and follows the same usage pattern:
//!
//! ```ignore
//! use studioctl::db::handlers::{Accounts, Repository};
//!
//! async fn example(pool: &sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = pool.acquire().await?;
//!     let mut repo = Accounts::new(&mut conn);
//!     let account = repo.get_by_email("kid@example.com").await?;
//!     Ok(())
//! }
//! ```
//!
//! - [`Accounts`] and [`Organizations`] implement [`Repository`]
//! - [`Creations`] inserts records and applies status transitions by provider task id
//! - [`Usage`] owns the quota counters and the atomic reservation

pub mod accounts;
pub mod creations;
pub mod organizations;
pub mod repository;
pub mod usage;

pub use accounts::Accounts;
pub use creations::Creations;
pub use organizations::Organizations;
pub use repository::Repository;
pub use usage::Usage;
