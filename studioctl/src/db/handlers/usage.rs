//! Database repository for quota counters.
//!
//! Lifetime counters live on `accounts.lifetime_used`. Organization windows live in
//! `usage_windows`, one row per (account, window kind, window start); a window resets simply
//! because the next day or month gets a fresh row.

use crate::db::{
    errors::{DbError, Result},
    models::usage::{OrganizationUsageDBResponse, Reservation, ReservationDBRequest, ReservationRule, UsageSnapshot, WindowKind},
};
use crate::types::{AccountId, OrganizationId, abbrev_uuid};
use chrono::NaiveDate;
use sqlx::{Connection, PgConnection};
use tracing::{debug, instrument};

pub struct Usage<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Usage<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Check and debit one unit of quota atomically
    #[instrument(skip(self, request), fields(account_id = %abbrev_uuid(&request.account_id), kind = request.kind.as_str()), err)]
    pub async fn reserve(&mut self, request: &ReservationDBRequest) -> Result<Reservation> {
        match request.rule {
            ReservationRule::Lifetime { limit } => self.reserve_lifetime(request, limit).await,
            ReservationRule::Windows {
                organization_id,
                daily_limit,
                monthly_limit,
            } => self.reserve_windows(request, organization_id, daily_limit, monthly_limit).await,
        }
    }

    async fn reserve_lifetime(&mut self, request: &ReservationDBRequest, limit: Option<i64>) -> Result<Reservation> {
        let mut tx = self.db.begin().await?;

        // Conditional increment: the row is only touched while capacity remains
        let debited: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE accounts SET lifetime_used = lifetime_used + 1, updated_at = NOW()
            WHERE id = $1 AND ($2::BIGINT IS NULL OR lifetime_used < $2)
            RETURNING lifetime_used
            "#,
        )
        .bind(request.account_id)
        .bind(limit)
        .fetch_optional(&mut *tx)
        .await?;

        let reservation = match debited {
            Some(lifetime_used) => {
                insert_event(&mut tx, request, None).await?;
                Reservation {
                    granted: true,
                    usage: UsageSnapshot {
                        lifetime_used,
                        ..Default::default()
                    },
                }
            }
            None => {
                let lifetime_used: i64 = sqlx::query_scalar("SELECT lifetime_used FROM accounts WHERE id = $1")
                    .bind(request.account_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or(DbError::NotFound)?;
                Reservation {
                    granted: false,
                    usage: UsageSnapshot {
                        lifetime_used,
                        ..Default::default()
                    },
                }
            }
        };

        tx.commit().await?;
        Ok(reservation)
    }

    async fn reserve_windows(
        &mut self,
        request: &ReservationDBRequest,
        organization_id: OrganizationId,
        daily_limit: i64,
        monthly_limit: i64,
    ) -> Result<Reservation> {
        let mut tx = self.db.begin().await?;

        // Lock the account row so concurrent reservations for the same account serialize here
        let lifetime_used: i64 = sqlx::query_scalar("SELECT lifetime_used FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(request.account_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::NotFound)?;

        let day_used = window_used(&mut tx, request.account_id, WindowKind::Day, request.local_day).await?;
        let month_used = window_used(&mut tx, request.account_id, WindowKind::Month, request.local_month).await?;

        if day_used >= daily_limit || month_used >= monthly_limit {
            debug!(day_used, month_used, daily_limit, monthly_limit, "Window exhausted");
            tx.commit().await?;
            return Ok(Reservation {
                granted: false,
                usage: UsageSnapshot {
                    lifetime_used,
                    day_used,
                    month_used,
                },
            });
        }

        let day_used = increment_window(&mut tx, request.account_id, WindowKind::Day, request.local_day).await?;
        let month_used = increment_window(&mut tx, request.account_id, WindowKind::Month, request.local_month).await?;
        let lifetime_used: i64 =
            sqlx::query_scalar("UPDATE accounts SET lifetime_used = lifetime_used + 1, updated_at = NOW() WHERE id = $1 RETURNING lifetime_used")
                .bind(request.account_id)
                .fetch_one(&mut *tx)
                .await?;
        insert_event(&mut tx, request, Some(organization_id)).await?;

        tx.commit().await?;
        Ok(Reservation {
            granted: true,
            usage: UsageSnapshot {
                lifetime_used,
                day_used,
                month_used,
            },
        })
    }

    #[instrument(skip(self), fields(account_id = %abbrev_uuid(&account_id)), err)]
    pub async fn usage(&mut self, account_id: AccountId, local_day: NaiveDate, local_month: NaiveDate) -> Result<UsageSnapshot> {
        let lifetime_used: i64 = sqlx::query_scalar("SELECT lifetime_used FROM accounts WHERE id = $1")
            .bind(account_id)
            .fetch_optional(&mut *self.db)
            .await?
            .ok_or(DbError::NotFound)?;
        let day_used = window_used(&mut *self.db, account_id, WindowKind::Day, local_day).await?;
        let month_used = window_used(&mut *self.db, account_id, WindowKind::Month, local_month).await?;

        Ok(UsageSnapshot {
            lifetime_used,
            day_used,
            month_used,
        })
    }

    #[instrument(skip(self), fields(organization_id = %abbrev_uuid(&organization_id)), err)]
    pub async fn organization_usage(
        &mut self,
        organization_id: OrganizationId,
        local_day: NaiveDate,
        local_month: NaiveDate,
    ) -> Result<OrganizationUsageDBResponse> {
        let (today, this_month): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE local_day = $2),
                COUNT(*) FILTER (WHERE local_month = $3)
            FROM usage_events
            WHERE organization_id = $1
            "#,
        )
        .bind(organization_id)
        .bind(local_day)
        .bind(local_month)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(OrganizationUsageDBResponse {
            organization_id,
            day: local_day,
            month: local_month,
            today,
            this_month,
        })
    }
}

async fn window_used(conn: &mut PgConnection, account_id: AccountId, kind: WindowKind, start: NaiveDate) -> Result<i64> {
    let used: Option<i64> = sqlx::query_scalar("SELECT used FROM usage_windows WHERE account_id = $1 AND window_kind = $2 AND window_start = $3")
        .bind(account_id)
        .bind(kind)
        .bind(start)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(used.unwrap_or(0))
}

async fn increment_window(conn: &mut PgConnection, account_id: AccountId, kind: WindowKind, start: NaiveDate) -> Result<i64> {
    let used = sqlx::query_scalar(
        r#"
        INSERT INTO usage_windows (account_id, window_kind, window_start, used)
        VALUES ($1, $2, $3, 1)
        ON CONFLICT (account_id, window_kind, window_start) DO UPDATE SET used = usage_windows.used + 1
        RETURNING used
        "#,
    )
    .bind(account_id)
    .bind(kind)
    .bind(start)
    .fetch_one(&mut *conn)
    .await?;
    Ok(used)
}

async fn insert_event(conn: &mut PgConnection, request: &ReservationDBRequest, organization_id: Option<OrganizationId>) -> Result<()> {
    sqlx::query("INSERT INTO usage_events (account_id, organization_id, kind, local_day, local_month) VALUES ($1, $2, $3, $4, $5)")
        .bind(request.account_id)
        .bind(organization_id)
        .bind(request.kind)
        .bind(request.local_day)
        .bind(request.local_month)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::{Accounts, Organizations, Repository};
    use crate::db::models::accounts::{AccountCreateDBRequest, AccountTier, SubscriptionStatus};
    use crate::db::models::creations::CreationKind;
    use crate::db::models::organizations::{OrganizationCreateDBRequest, PackageTier};
    use sqlx::PgPool;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn request(account_id: AccountId, local_day: NaiveDate, rule: ReservationRule) -> ReservationDBRequest {
        ReservationDBRequest {
            account_id,
            kind: CreationKind::Image,
            local_day,
            local_month: day(1),
            rule,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    #[ignore = "requires a running Postgres (DATABASE_URL)"]
    async fn test_lifetime_limit_denies_after_exhaustion(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let account = Accounts::new(&mut conn)
            .create(&AccountCreateDBRequest::free_consumer("free@example.com"))
            .await
            .unwrap();
        let mut repo = Usage::new(&mut conn);
        let rule = ReservationRule::Lifetime { limit: Some(3) };

        for expected in 1..=3 {
            let r = repo.reserve(&request(account.id, day(2), rule)).await.unwrap();
            assert!(r.granted);
            assert_eq!(r.usage.lifetime_used, expected);
        }
        let denied = repo.reserve(&request(account.id, day(2), rule)).await.unwrap();
        assert!(!denied.granted);
        assert_eq!(denied.usage.lifetime_used, 3);
    }

    #[sqlx::test]
    #[test_log::test]
    #[ignore = "requires a running Postgres (DATABASE_URL)"]
    async fn test_concurrent_reservations_never_exceed_limit(pool: PgPool) {
        let account = {
            let mut conn = pool.acquire().await.unwrap();
            Accounts::new(&mut conn)
                .create(&AccountCreateDBRequest::free_consumer("race@example.com"))
                .await
                .unwrap()
        };

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                let mut conn = pool.acquire().await.unwrap();
                Usage::new(&mut conn)
                    .reserve(&request(account.id, day(2), ReservationRule::Lifetime { limit: Some(1) }))
                    .await
                    .unwrap()
                    .granted
            }));
        }
        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    #[ignore = "requires a running Postgres (DATABASE_URL)"]
    async fn test_windows_reset_on_new_day_and_feed_org_usage(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let org = Organizations::new(&mut conn)
            .create(&OrganizationCreateDBRequest {
                name: "Birch School".to_string(),
                subdomain: "birch".to_string(),
                package_tier: PackageTier::Starter,
                daily_limit: 2,
                monthly_limit: 3,
            })
            .await
            .unwrap();
        let account = Accounts::new(&mut conn)
            .create(&AccountCreateDBRequest {
                email: "learner@birch.example.com".to_string(),
                display_name: None,
                tier: AccountTier::OrgLearner,
                organization_id: Some(org.id),
                subscription_status: SubscriptionStatus::NoSubscription,
            })
            .await
            .unwrap();
        let rule = ReservationRule::Windows {
            organization_id: org.id,
            daily_limit: 2,
            monthly_limit: 3,
        };
        let mut repo = Usage::new(&mut conn);

        assert!(repo.reserve(&request(account.id, day(2), rule)).await.unwrap().granted);
        assert!(repo.reserve(&request(account.id, day(2), rule)).await.unwrap().granted);
        let denied = repo.reserve(&request(account.id, day(2), rule)).await.unwrap();
        assert!(!denied.granted);
        assert_eq!((denied.usage.day_used, denied.usage.month_used), (2, 2));

        // New day, same month: daily window is fresh, monthly has one unit left
        let next_day = repo.reserve(&request(account.id, day(3), rule)).await.unwrap();
        assert!(next_day.granted);
        assert_eq!((next_day.usage.day_used, next_day.usage.month_used), (1, 3));
        assert!(!repo.reserve(&request(account.id, day(3), rule)).await.unwrap().granted);

        let snapshot = repo.usage(account.id, day(3), day(1)).await.unwrap();
        assert_eq!(snapshot.lifetime_used, 3);

        let org_usage = repo.organization_usage(org.id, day(3), day(1)).await.unwrap();
        assert_eq!(org_usage.today, 1);
        assert_eq!(org_usage.this_month, 3);
    }
}
