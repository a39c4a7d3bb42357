use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use deskpilot_core::conversation::{ContactKey, ConversationTurn, MessageDirection};

use super::{
    format_timestamp, parse_direction, parse_timestamp, InboundRecord, MessageLogRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlMessageLogRepository {
    pool: DbPool,
}

impl SqlMessageLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageLogRepository for SqlMessageLogRepository {
    async fn record_inbound(
        &self,
        key: &ContactKey,
        channel_message_id: &str,
        body: &str,
        at: DateTime<Utc>,
    ) -> Result<InboundRecord, RepositoryError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO conversation_messages (
                contact_id, channel_instance_id, channel_message_id, direction, body, processed,
                created_at
            ) VALUES (?, ?, ?, ?, ?, 0, ?)
            ON CONFLICT (channel_message_id) DO NOTHING
            "#,
        )
        .bind(&key.contact_id)
        .bind(&key.channel_instance_id)
        .bind(channel_message_id)
        .bind(MessageDirection::Inbound.as_str())
        .bind(body)
        .bind(format_timestamp(at))
        .execute(&self.pool)
        .await?;
        if inserted.rows_affected() == 1 {
            return Ok(InboundRecord::New);
        }

        let processed: i64 = sqlx::query_scalar(
            "SELECT processed FROM conversation_messages WHERE channel_message_id = ?",
        )
        .bind(channel_message_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(if processed == 0 { InboundRecord::Retry } else { InboundRecord::Processed })
    }

    async fn mark_processed(&self, channel_message_id: &str) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE conversation_messages SET processed = 1 WHERE channel_message_id = ?")
            .bind(channel_message_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_outbound(
        &self,
        key: &ContactKey,
        channel_message_id: Option<&str>,
        body: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO conversation_messages (
                contact_id, channel_instance_id, channel_message_id, direction, body, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (channel_message_id) DO NOTHING
            "#,
        )
        .bind(&key.contact_id)
        .bind(&key.channel_instance_id)
        .bind(channel_message_id)
        .bind(MessageDirection::Outbound.as_str())
        .bind(body)
        .bind(format_timestamp(at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_turns(
        &self,
        key: &ContactKey,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            SELECT direction, body, created_at
            FROM conversation_messages
            WHERE contact_id = ? AND channel_instance_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(&key.contact_id)
        .bind(&key.channel_instance_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut turns = rows.iter().map(turn_from_row).collect::<Result<Vec<_>, _>>()?;
        turns.reverse();
        Ok(turns)
    }
}

fn turn_from_row(row: &SqliteRow) -> Result<ConversationTurn, RepositoryError> {
    let direction: String = row.try_get("direction")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(ConversationTurn {
        direction: parse_direction(&direction)?,
        text: row.try_get("body")?,
        at: parse_timestamp("created_at", &created_at)?,
    })
}
