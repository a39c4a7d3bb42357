use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use deskpilot_core::conversation::{
    ContactKey, ConversationPhase, ConversationState, MessageDirection,
};
use deskpilot_core::domain::ticket::TicketId;

use super::{
    format_timestamp, parse_direction, parse_timestamp, ConversationStateRepository,
    RepositoryError,
};
use crate::DbPool;

/// Per-contact conversation phase. Transitions out of the awaiting phase are
/// conditional single-row updates so concurrent deliveries settle on exactly
/// one path.
pub struct SqlConversationStateRepository {
    pool: DbPool,
}

impl SqlConversationStateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationStateRepository for SqlConversationStateRepository {
    async fn load(&self, key: &ContactKey) -> Result<Option<ConversationState>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT contact_id, channel_instance_id, awaiting_ticket_id, expires_at,
                   last_message_at, last_direction
            FROM conversation_state
            WHERE contact_id = ? AND channel_instance_id = ?
            "#,
        )
        .bind(&key.contact_id)
        .bind(&key.channel_instance_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| state_from_row(&r)).transpose()
    }

    async fn set_awaiting(
        &self,
        key: &ContactKey,
        ticket_id: &TicketId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if expires_at <= now {
            return Err(RepositoryError::InvalidInput(format!(
                "awaiting expiry {} must be after {}",
                format_timestamp(expires_at),
                format_timestamp(now)
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO conversation_state (
                contact_id, channel_instance_id, awaiting_ticket_id, expires_at, updated_at
            ) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (contact_id, channel_instance_id) DO UPDATE SET
                awaiting_ticket_id = excluded.awaiting_ticket_id,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&key.contact_id)
        .bind(&key.channel_instance_id)
        .bind(&ticket_id.0)
        .bind(format_timestamp(expires_at))
        .bind(format_timestamp(now))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_awaiting_if_current(
        &self,
        key: &ContactKey,
        ticket_id: &TicketId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let cleared = sqlx::query(
            r#"
            UPDATE conversation_state
            SET awaiting_ticket_id = NULL, expires_at = NULL, updated_at = ?
            WHERE contact_id = ? AND channel_instance_id = ?
              AND awaiting_ticket_id = ? AND expires_at >= ?
            "#,
        )
        .bind(format_timestamp(now))
        .bind(&key.contact_id)
        .bind(&key.channel_instance_id)
        .bind(&ticket_id.0)
        .bind(format_timestamp(now))
        .execute(&self.pool)
        .await?;

        Ok(cleared.rows_affected() == 1)
    }

    async fn clear_awaiting_if_expired(
        &self,
        key: &ContactKey,
        ticket_id: &TicketId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let cleared = sqlx::query(
            r#"
            UPDATE conversation_state
            SET awaiting_ticket_id = NULL, expires_at = NULL, updated_at = ?
            WHERE contact_id = ? AND channel_instance_id = ?
              AND awaiting_ticket_id = ? AND expires_at < ?
            "#,
        )
        .bind(format_timestamp(now))
        .bind(&key.contact_id)
        .bind(&key.channel_instance_id)
        .bind(&ticket_id.0)
        .bind(format_timestamp(now))
        .execute(&self.pool)
        .await?;

        Ok(cleared.rows_affected() == 1)
    }

    async fn touch(
        &self,
        key: &ContactKey,
        direction: MessageDirection,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO conversation_state (
                contact_id, channel_instance_id, last_message_at, last_direction, updated_at
            ) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (contact_id, channel_instance_id) DO UPDATE SET
                last_message_at = excluded.last_message_at,
                last_direction = excluded.last_direction,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&key.contact_id)
        .bind(&key.channel_instance_id)
        .bind(format_timestamp(at))
        .bind(direction.as_str())
        .bind(format_timestamp(at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn state_from_row(row: &SqliteRow) -> Result<ConversationState, RepositoryError> {
    let awaiting_ticket_id: Option<String> = row.try_get("awaiting_ticket_id")?;
    let expires_at: Option<String> = row.try_get("expires_at")?;
    let last_message_at: Option<String> = row.try_get("last_message_at")?;
    let last_direction: Option<String> = row.try_get("last_direction")?;

    let phase = match (awaiting_ticket_id, expires_at) {
        (Some(ticket_id), Some(expires_at)) => ConversationPhase::AwaitingTicketReply {
            ticket_id: TicketId(ticket_id),
            expires_at: parse_timestamp("expires_at", &expires_at)?,
        },
        _ => ConversationPhase::Idle,
    };

    Ok(ConversationState {
        key: ContactKey::new(
            row.try_get::<String, _>("contact_id")?,
            row.try_get::<String, _>("channel_instance_id")?,
        ),
        phase,
        last_message_at: last_message_at
            .as_deref()
            .map(|value| parse_timestamp("last_message_at", value))
            .transpose()?,
        last_direction: last_direction.as_deref().map(parse_direction).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use deskpilot_core::conversation::{ContactKey, ConversationPhase, MessageDirection};
    use deskpilot_core::domain::ticket::TicketId;

    use super::SqlConversationStateRepository;
    use crate::repositories::{ConversationStateRepository, RepositoryError};
    use crate::{connect_with_settings, migrations, DbPool};

    fn key() -> ContactKey {
        ContactKey::new("5511988887777", "inst-suporte")
    }

    #[tokio::test]
    async fn unknown_contact_has_no_state() {
        let pool = setup_pool().await;
        let repo = SqlConversationStateRepository::new(pool.clone());

        assert!(repo.load(&key()).await.expect("load").is_none());
        pool.close().await;
    }

    #[tokio::test]
    async fn set_awaiting_requires_future_expiry() {
        let pool = setup_pool().await;
        let repo = SqlConversationStateRepository::new(pool.clone());
        let now = Utc::now();

        let error = repo
            .set_awaiting(&key(), &TicketId("TCK-1".to_string()), now, now)
            .await
            .expect_err("expiry equal to now");
        assert!(matches!(error, RepositoryError::InvalidInput(_)));
        pool.close().await;
    }

    #[tokio::test]
    async fn clear_if_current_wins_exactly_once() {
        let pool = setup_pool().await;
        let repo = SqlConversationStateRepository::new(pool.clone());
        let now = Utc::now();
        let ticket = TicketId("TCK-1".to_string());

        repo.set_awaiting(&key(), &ticket, now + Duration::minutes(10), now)
            .await
            .expect("set awaiting");
        let state = repo.load(&key()).await.expect("load").expect("row");
        assert_eq!(state.phase.awaiting_ticket(), Some(&ticket));

        assert!(repo.clear_awaiting_if_current(&key(), &ticket, now).await.expect("first clear"));
        assert!(!repo.clear_awaiting_if_current(&key(), &ticket, now).await.expect("second clear"));

        let state = repo.load(&key()).await.expect("load").expect("row");
        assert_eq!(state.phase, ConversationPhase::Idle);
        pool.close().await;
    }

    #[tokio::test]
    async fn expired_state_is_only_cleared_by_expiry_path() {
        let pool = setup_pool().await;
        let repo = SqlConversationStateRepository::new(pool.clone());
        let set_at = Utc::now() - Duration::hours(2);
        let now = Utc::now();
        let ticket = TicketId("TCK-2".to_string());

        repo.set_awaiting(&key(), &ticket, set_at + Duration::hours(1), set_at)
            .await
            .expect("set awaiting");

        assert!(!repo.clear_awaiting_if_current(&key(), &ticket, now).await.expect("too late"));
        assert!(repo.clear_awaiting_if_expired(&key(), &ticket, now).await.expect("expired"));
        pool.close().await;
    }

    #[tokio::test]
    async fn newer_request_replaces_pending_ticket() {
        let pool = setup_pool().await;
        let repo = SqlConversationStateRepository::new(pool.clone());
        let now = Utc::now();

        repo.set_awaiting(&key(), &TicketId("TCK-1".into()), now + Duration::minutes(5), now)
            .await
            .expect("first");
        repo.set_awaiting(&key(), &TicketId("TCK-3".into()), now + Duration::minutes(5), now)
            .await
            .expect("second");

        assert!(!repo
            .clear_awaiting_if_current(&key(), &TicketId("TCK-1".into()), now)
            .await
            .expect("stale ticket"));
        let state = repo.load(&key()).await.expect("load").expect("row");
        assert_eq!(state.phase.awaiting_ticket().map(|id| id.0.as_str()), Some("TCK-3"));
        pool.close().await;
    }

    #[tokio::test]
    async fn touch_records_last_message_without_changing_phase() {
        let pool = setup_pool().await;
        let repo = SqlConversationStateRepository::new(pool.clone());
        let now = Utc::now();

        repo.set_awaiting(&key(), &TicketId("TCK-4".into()), now + Duration::minutes(5), now)
            .await
            .expect("set awaiting");
        repo.touch(&key(), MessageDirection::Outbound, now).await.expect("touch");

        let state = repo.load(&key()).await.expect("load").expect("row");
        assert_eq!(state.last_direction, Some(MessageDirection::Outbound));
        assert!(state.last_message_at.is_some());
        assert!(matches!(state.phase, ConversationPhase::AwaitingTicketReply { .. }));
        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }
}
