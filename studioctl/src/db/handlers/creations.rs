//! Database repository for creation records.

use crate::db::{
    errors::Result,
    models::creations::{
        CreationCreateDBRequest, CreationDBResponse, CreationFilter, CreationKind, CreationOrder, CreationPayload, CreationStatus,
        StatusUpdateDBRequest, StatusUpdateOutcome,
    },
};
use crate::types::{AccountId, CreationId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, QueryBuilder, types::Json};
use tracing::{instrument, trace};

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Creation {
    pub id: CreationId,
    pub account_id: AccountId,
    pub kind: CreationKind,
    pub status: CreationStatus,
    pub payload: Json<CreationPayload>,
    pub asset_urls: Vec<String>,
    pub task_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Creation> for CreationDBResponse {
    fn from(creation: Creation) -> Self {
        Self {
            id: creation.id,
            account_id: creation.account_id,
            kind: creation.kind,
            status: creation.status,
            payload: creation.payload.0,
            asset_urls: creation.asset_urls,
            task_id: creation.task_id,
            error_message: creation.error_message,
            created_at: creation.created_at,
            updated_at: creation.updated_at,
            completed_at: creation.completed_at,
        }
    }
}

pub struct Creations<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Creations<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(account_id = %abbrev_uuid(&request.account_id), kind = request.payload.kind().as_str()), err)]
    pub async fn create(&mut self, request: &CreationCreateDBRequest) -> Result<CreationDBResponse> {
        let creation = sqlx::query_as::<_, Creation>(
            r#"
            INSERT INTO creations (account_id, kind, status, payload, asset_urls, task_id, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(request.account_id)
        .bind(request.payload.kind())
        .bind(request.status)
        .bind(Json(&request.payload))
        .bind(&request.asset_urls)
        .bind(&request.task_id)
        .bind(request.completed_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(creation.into())
    }

    #[instrument(skip(self), fields(creation_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: CreationId) -> Result<Option<CreationDBResponse>> {
        let creation = sqlx::query_as::<_, Creation>("SELECT * FROM creations WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(creation.map(Into::into))
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_task_id(&mut self, task_id: &str) -> Result<Option<CreationDBResponse>> {
        let creation = sqlx::query_as::<_, Creation>("SELECT * FROM creations WHERE task_id = $1")
            .bind(task_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(creation.map(Into::into))
    }

    #[instrument(skip(self, filter), fields(account_id = %abbrev_uuid(&filter.account_id), limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &CreationFilter) -> Result<Vec<CreationDBResponse>> {
        let mut query = QueryBuilder::new("SELECT * FROM creations WHERE account_id = ");
        query.push_bind(filter.account_id);

        if let Some(kind) = filter.kind {
            query.push(" AND kind = ");
            query.push_bind(kind);
        }

        match filter.order {
            CreationOrder::Recent => query.push(" ORDER BY created_at DESC"),
            CreationOrder::Library => query.push(" ORDER BY (status = 'completed') DESC, created_at DESC"),
        };

        query.push(" LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let creations = query.build_query_as::<Creation>().fetch_all(&mut *self.db).await?;

        Ok(creations.into_iter().map(Into::into).collect())
    }

    /// Move the record carrying `task_id` to `request.status` if, and only if, its current status
    /// is one of the allowed predecessors. The guard lives in the `WHERE` clause so concurrent
    /// callbacks cannot both win.
    #[instrument(skip(self, request), fields(status = request.status.as_str()), err)]
    pub async fn update_status(&mut self, task_id: &str, request: &StatusUpdateDBRequest) -> Result<StatusUpdateOutcome> {
        let predecessors: Vec<&str> = CreationStatus::predecessors(request.status).iter().map(|s| s.as_str()).collect();
        let completed_at = request.status.is_terminal().then(Utc::now);

        let updated = sqlx::query_as::<_, Creation>(
            r#"
            UPDATE creations SET
                status = $2,
                asset_urls = CASE WHEN cardinality($3::TEXT[]) > 0 THEN $3 ELSE asset_urls END,
                error_message = COALESCE($4, error_message),
                completed_at = COALESCE($5, completed_at),
                updated_at = NOW()
            WHERE task_id = $1 AND status = ANY($6)
            RETURNING *
            "#,
        )
        .bind(task_id)
        .bind(request.status)
        .bind(&request.asset_urls)
        .bind(&request.error_message)
        .bind(completed_at)
        .bind(&predecessors)
        .fetch_optional(&mut *self.db)
        .await?;

        if let Some(creation) = updated {
            return Ok(StatusUpdateOutcome::Applied(creation.into()));
        }

        match self.get_by_task_id(task_id).await? {
            Some(existing) => {
                trace!(current = existing.status.as_str(), "Status transition not applied");
                Ok(StatusUpdateOutcome::Unchanged(existing))
            }
            None => Ok(StatusUpdateOutcome::UnknownTask),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::{Accounts, Repository};
    use crate::db::models::accounts::AccountCreateDBRequest;
    use crate::db::models::creations::{ImageStyle, StoryGenre, StoryLength};
    use sqlx::PgPool;

    fn song() -> CreationPayload {
        CreationPayload::Music {
            prompt: "a lullaby for a sleepy dragon".to_string(),
            style: "lullaby".to_string(),
            title: "Sleepy Dragon".to_string(),
            instrumental: true,
        }
    }

    async fn account(conn: &mut PgConnection) -> AccountId {
        Accounts::new(conn)
            .create(&AccountCreateDBRequest::free_consumer("maker@example.com"))
            .await
            .unwrap()
            .id
    }

    #[sqlx::test]
    #[test_log::test]
    #[ignore = "requires a running Postgres (DATABASE_URL)"]
    async fn test_music_record_completes_once(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let account_id = account(&mut conn).await;
        let mut repo = Creations::new(&mut conn);

        let pending = repo
            .create(&CreationCreateDBRequest::pending(account_id, song(), "T123".to_string()))
            .await
            .unwrap();
        assert_eq!(pending.status, CreationStatus::Pending);
        assert!(pending.asset_urls.is_empty());

        let complete = StatusUpdateDBRequest {
            status: CreationStatus::Completed,
            asset_urls: vec!["https://cdn.example.com/t123.mp3".to_string()],
            error_message: None,
        };
        let applied = repo.update_status("T123", &complete).await.unwrap();
        let StatusUpdateOutcome::Applied(record) = applied else {
            panic!("expected first callback to apply");
        };
        assert_eq!(record.status, CreationStatus::Completed);
        assert!(record.completed_at.is_some());

        let failed = StatusUpdateDBRequest {
            status: CreationStatus::Failed,
            asset_urls: vec![],
            error_message: Some("late failure".to_string()),
        };
        let StatusUpdateOutcome::Unchanged(record) = repo.update_status("T123", &failed).await.unwrap() else {
            panic!("terminal record must not change");
        };
        assert_eq!(record.status, CreationStatus::Completed);
        assert_eq!(record.asset_urls, vec!["https://cdn.example.com/t123.mp3".to_string()]);
        assert!(record.error_message.is_none());

        assert!(matches!(
            repo.update_status("T999", &complete).await.unwrap(),
            StatusUpdateOutcome::UnknownTask
        ));
    }

    #[sqlx::test]
    #[test_log::test]
    #[ignore = "requires a running Postgres (DATABASE_URL)"]
    async fn test_list_library_order_puts_completed_first(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let account_id = account(&mut conn).await;
        let mut repo = Creations::new(&mut conn);

        let image = repo
            .create(&CreationCreateDBRequest::completed(
                account_id,
                CreationPayload::Image {
                    prompt: "a castle made of cheese".to_string(),
                    style: ImageStyle::Crayon,
                },
                vec!["https://cdn.example.com/castle.png".to_string()],
            ))
            .await
            .unwrap();
        let music = repo
            .create(&CreationCreateDBRequest::pending(account_id, song(), "T1".to_string()))
            .await
            .unwrap();
        repo.create(&CreationCreateDBRequest::completed(
            account_id,
            CreationPayload::Story {
                genre: StoryGenre::Animals,
                length: StoryLength::Short,
                prompt: "The fox found a map.".to_string(),
                text: "It led to a garden.".to_string(),
            },
            vec![],
        ))
        .await
        .unwrap();

        let recent = repo.list(&CreationFilter::new(account_id, 0, 10)).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].kind, CreationKind::Story);

        let library = repo
            .list(&CreationFilter {
                order: CreationOrder::Library,
                ..CreationFilter::new(account_id, 0, 10)
            })
            .await
            .unwrap();
        assert_eq!(library.last().map(|c| c.id), Some(music.id));

        let images = repo
            .list(&CreationFilter {
                kind: Some(CreationKind::Image),
                ..CreationFilter::new(account_id, 0, 10)
            })
            .await
            .unwrap();
        assert_eq!(images.iter().map(|c| c.id).collect::<Vec<_>>(), vec![image.id]);
    }
}
