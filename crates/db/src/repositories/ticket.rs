use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use deskpilot_core::domain::priority::PriorityLevel;
use deskpilot_core::domain::team::TeamId;
use deskpilot_core::domain::ticket::{ClassificationResult, Ticket, TicketId, TicketReply};

use super::{format_timestamp, parse_timestamp, RepositoryError, TicketRepository};
use crate::DbPool;

pub struct SqlTicketRepository {
    pool: DbPool,
}

impl SqlTicketRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TicketRepository for SqlTicketRepository {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, contact_id, description, title, priority, team_id, created_at
            FROM tickets
            WHERE id = ?
            "#,
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| ticket_from_row(&r)).transpose()
    }

    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO tickets (
                id, contact_id, description, title, priority, team_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                contact_id = excluded.contact_id,
                description = excluded.description,
                title = excluded.title,
                priority = excluded.priority,
                team_id = excluded.team_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&ticket.id.0)
        .bind(&ticket.contact_id)
        .bind(&ticket.description)
        .bind(&ticket.title)
        .bind(ticket.priority.map(|level| level.as_str()))
        .bind(ticket.team_id.as_ref().map(|team| team.0.as_str()))
        .bind(format_timestamp(ticket.created_at))
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn apply_classification(
        &self,
        id: &TicketId,
        result: &ClassificationResult,
    ) -> Result<(), RepositoryError> {
        let updated = sqlx::query(
            r#"
            UPDATE tickets
            SET title = ?, priority = ?, team_id = ?, classification_confidence = ?,
                classification_rationale = ?, classification_degraded = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&result.title)
        .bind(result.priority.as_str())
        .bind(result.team_id.as_ref().map(|team| team.0.as_str()))
        .bind(result.confidence.as_str())
        .bind(&result.rationale)
        .bind(result.degraded)
        .bind(format_timestamp(Utc::now()))
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("ticket {}", id.0)));
        }
        Ok(())
    }

    async fn append_reply(&self, reply: TicketReply) -> Result<bool, RepositoryError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO ticket_messages (ticket_id, channel_message_id, contact_id, body, received_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (channel_message_id) DO NOTHING
            "#,
        )
        .bind(&reply.ticket_id.0)
        .bind(&reply.channel_message_id)
        .bind(&reply.contact_id)
        .bind(&reply.body)
        .bind(format_timestamp(reply.received_at))
        .execute(&self.pool)
        .await?;

        Ok(inserted.rows_affected() == 1)
    }

    async fn find_reply(
        &self,
        channel_message_id: &str,
    ) -> Result<Option<TicketReply>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT ticket_id, channel_message_id, contact_id, body, received_at
            FROM ticket_messages
            WHERE channel_message_id = ?
            "#,
        )
        .bind(channel_message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(reply_from_row).transpose()
    }

    async fn list_replies(&self, id: &TicketId) -> Result<Vec<TicketReply>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT ticket_id, channel_message_id, contact_id, body, received_at
            FROM ticket_messages
            WHERE ticket_id = ?
            ORDER BY received_at, id
            "#,
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(reply_from_row).collect()
    }
}

fn parse_priority(value: &str) -> Result<PriorityLevel, RepositoryError> {
    PriorityLevel::ALL
        .into_iter()
        .find(|level| level.as_str() == value)
        .ok_or_else(|| RepositoryError::Decode(format!("invalid priority: {value}")))
}

fn ticket_from_row(row: &SqliteRow) -> Result<Ticket, RepositoryError> {
    let priority: Option<String> = row.try_get("priority")?;
    let team_id: Option<String> = row.try_get("team_id")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Ticket {
        id: TicketId(row.try_get("id")?),
        contact_id: row.try_get("contact_id")?,
        description: row.try_get("description")?,
        title: row.try_get("title")?,
        priority: priority.as_deref().map(parse_priority).transpose()?,
        team_id: team_id.map(TeamId),
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

fn reply_from_row(row: &SqliteRow) -> Result<TicketReply, RepositoryError> {
    let received_at: String = row.try_get("received_at")?;

    Ok(TicketReply {
        ticket_id: TicketId(row.try_get("ticket_id")?),
        channel_message_id: row.try_get("channel_message_id")?,
        contact_id: row.try_get("contact_id")?,
        body: row.try_get("body")?,
        received_at: parse_timestamp("received_at", &received_at)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use deskpilot_core::domain::priority::PriorityLevel;
    use deskpilot_core::domain::team::TeamId;
    use deskpilot_core::domain::ticket::{
        ClassificationMode, ClassificationResult, Confidence, Ticket, TicketId, TicketReply,
    };

    use super::SqlTicketRepository;
    use crate::repositories::{RepositoryError, TicketRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    #[tokio::test]
    async fn classification_is_written_to_ticket_row() {
        let pool = setup_pool().await;
        let repo = SqlTicketRepository::new(pool.clone());
        repo.save(Ticket::new("TCK-1", "sistema caiu, loja parada")).await.expect("save");

        let result = ClassificationResult {
            title: "Sistema fora".to_string(),
            priority: PriorityLevel::Crisis,
            team_id: Some(TeamId("t-infra".to_string())),
            rationale: "Loja inteira parada".to_string(),
            confidence: Confidence::High,
            mode: ClassificationMode::Full,
            degraded: false,
        };
        repo.apply_classification(&TicketId("TCK-1".to_string()), &result)
            .await
            .expect("apply classification");

        let ticket = repo
            .find_by_id(&TicketId("TCK-1".to_string()))
            .await
            .expect("find")
            .expect("ticket exists");
        assert_eq!(ticket.title.as_deref(), Some("Sistema fora"));
        assert_eq!(ticket.priority, Some(PriorityLevel::Crisis));
        assert_eq!(ticket.team_id, Some(TeamId("t-infra".to_string())));

        let missing = repo
            .apply_classification(&TicketId("TCK-404".to_string()), &result)
            .await
            .expect_err("unknown ticket");
        assert!(matches!(missing, RepositoryError::NotFound(_)));
        pool.close().await;
    }

    #[tokio::test]
    async fn duplicate_channel_message_is_not_appended_twice() {
        let pool = setup_pool().await;
        let repo = SqlTicketRepository::new(pool.clone());
        repo.save(Ticket::new("TCK-2", "impressora")).await.expect("save");

        let reply = TicketReply {
            ticket_id: TicketId("TCK-2".to_string()),
            channel_message_id: "wamid-1".to_string(),
            contact_id: "5511999990000".to_string(),
            body: "Já reiniciei e continua".to_string(),
            received_at: Utc::now(),
        };

        assert!(repo.append_reply(reply.clone()).await.expect("first append"));
        assert!(!repo.append_reply(reply).await.expect("second append"));

        let replies =
            repo.list_replies(&TicketId("TCK-2".to_string())).await.expect("list replies");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].body, "Já reiniciei e continua");

        let found = repo.find_reply("wamid-1").await.expect("find reply").expect("stored reply");
        assert_eq!(found.ticket_id, TicketId("TCK-2".to_string()));
        assert!(repo.find_reply("wamid-2").await.expect("find reply").is_none());
        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }
}
