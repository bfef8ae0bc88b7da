//! Database models for quota counters and usage events.

use crate::db::models::creations::CreationKind;
use crate::types::{AccountId, OrganizationId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Which rolling window a counter belongs to, stored as TEXT in the database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Day,
    Month,
}

/// The rule a reservation is checked against. Chosen by the quota ledger from the account tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationRule {
    /// A single lifetime counter. `None` means unlimited: always granted, still counted.
    Lifetime { limit: Option<i64> },
    /// Daily and monthly windows; both must have capacity.
    Windows {
        organization_id: OrganizationId,
        daily_limit: i64,
        monthly_limit: i64,
    },
}

/// Database request to atomically check and debit one unit of quota
#[derive(Debug, Clone)]
pub struct ReservationDBRequest {
    pub account_id: AccountId,
    pub kind: CreationKind,
    /// Local calendar day the reservation falls in
    pub local_day: NaiveDate,
    /// First day of the local calendar month the reservation falls in
    pub local_month: NaiveDate,
    pub rule: ReservationRule,
}

/// Counter values for one account, as of a reservation or a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsageSnapshot {
    pub lifetime_used: i64,
    pub day_used: i64,
    pub month_used: i64,
}

/// Result of a reservation attempt. `usage` reflects the counters after the debit when granted,
/// and the unchanged counters when not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub granted: bool,
    pub usage: UsageSnapshot,
}

/// Creation counts across an organization's accounts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationUsageDBResponse {
    pub organization_id: OrganizationId,
    pub day: NaiveDate,
    pub month: NaiveDate,
    pub today: i64,
    pub this_month: i64,
}
