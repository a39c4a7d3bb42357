use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use deskpilot_core::domain::knowledge::{
    rank_hybrid, Document, DocumentId, HybridQuery, RetrievalCandidate,
};

use super::{format_timestamp, DocumentRepository, RepositoryError};
use crate::DbPool;

/// Knowledge base backed by SQLite. Vectors live as JSON arrays; scoring
/// happens in process over the whole corpus.
pub struct SqlDocumentRepository {
    pool: DbPool,
}

impl SqlDocumentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DocumentRepository for SqlDocumentRepository {
    async fn hybrid_search(
        &self,
        query: &HybridQuery<'_>,
    ) -> Result<Vec<RetrievalCandidate>, RepositoryError> {
        if query.match_count == 0 {
            return Ok(Vec::new());
        }
        let documents = self.list(false).await?;
        Ok(rank_hybrid(query, documents))
    }

    async fn list(&self, only_missing_embedding: bool) -> Result<Vec<Document>, RepositoryError> {
        let sql = if only_missing_embedding {
            "SELECT id, title, category, content, embedding_json FROM knowledge_documents
             WHERE embedding_json IS NULL OR embedding_json = '[]' ORDER BY id"
        } else {
            "SELECT id, title, category, content, embedding_json FROM knowledge_documents ORDER BY id"
        };
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        rows.iter().map(document_from_row).collect()
    }

    async fn save(&self, document: Document) -> Result<(), RepositoryError> {
        let embedding_json = encode_embedding(&document.embedding)?;

        // Edited content invalidates the stored vector unless a new one is supplied.
        sqlx::query(
            r#"
            INSERT INTO knowledge_documents (id, title, category, content, embedding_json, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                title = excluded.title,
                category = excluded.category,
                content = excluded.content,
                embedding_json = excluded.embedding_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&document.id.0)
        .bind(&document.title)
        .bind(&document.category)
        .bind(&document.content)
        .bind(embedding_json)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_embedding(
        &self,
        id: &DocumentId,
        embedding: &[f32],
    ) -> Result<(), RepositoryError> {
        let updated = sqlx::query(
            "UPDATE knowledge_documents SET embedding_json = ?, updated_at = ? WHERE id = ?",
        )
        .bind(encode_embedding(embedding)?)
        .bind(format_timestamp(Utc::now()))
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("document {}", id.0)));
        }
        Ok(())
    }
}

fn encode_embedding(embedding: &[f32]) -> Result<Option<String>, RepositoryError> {
    if embedding.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(embedding)
        .map(Some)
        .map_err(|e| RepositoryError::Decode(format!("could not encode embedding: {e}")))
}

fn document_from_row(row: &SqliteRow) -> Result<Document, RepositoryError> {
    let id: String = row.try_get("id")?;
    let embedding_json: Option<String> = row.try_get("embedding_json")?;
    let embedding = match embedding_json {
        Some(raw) => serde_json::from_str::<Vec<f32>>(&raw).map_err(|e| {
            RepositoryError::Decode(format!("invalid embedding for document {id}: {e}"))
        })?,
        None => Vec::new(),
    };

    Ok(Document {
        id: DocumentId(id),
        title: row.try_get("title")?,
        category: row.try_get("category")?,
        content: row.try_get("content")?,
        embedding,
    })
}

#[cfg(test)]
mod tests {
    use deskpilot_core::domain::knowledge::{Document, DocumentId, HybridQuery};

    use super::SqlDocumentRepository;
    use crate::repositories::{DocumentRepository, RepositoryError};
    use crate::{connect_with_settings, migrations, DbPool};

    fn document(id: &str, title: &str, content: &str, embedding: Vec<f32>) -> Document {
        Document {
            id: DocumentId(id.to_string()),
            title: title.to_string(),
            category: Some("faq".to_string()),
            content: content.to_string(),
            embedding,
        }
    }

    #[tokio::test]
    async fn hybrid_search_ranks_stored_documents() {
        let pool = setup_pool().await;
        let repo = SqlDocumentRepository::new(pool.clone());
        repo.save(document("kb-1", "VPN", "Como configurar a VPN corporativa", vec![1.0, 0.0]))
            .await
            .expect("save kb-1");
        repo.save(document("kb-2", "Senha", "Como redefinir a senha do email", vec![0.0, 1.0]))
            .await
            .expect("save kb-2");
        repo.save(document("kb-3", "Cardápio", "Almoço de sexta", vec![]))
            .await
            .expect("save kb-3");

        let candidates = repo
            .hybrid_search(&HybridQuery {
                embedding: &[0.0, 1.0],
                text: "redefinir senha",
                match_count: 12,
                alpha: 0.5,
            })
            .await
            .expect("search");

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].document.id.0, "kb-2");
        assert!((candidates[0].similarity_score - 1.0).abs() < 1e-6);
        pool.close().await;
    }

    #[tokio::test]
    async fn missing_embeddings_are_listed_and_updated() {
        let pool = setup_pool().await;
        let repo = SqlDocumentRepository::new(pool.clone());
        repo.save(document("kb-1", "VPN", "Configurar VPN", vec![0.5, 0.5])).await.expect("save");
        repo.save(document("kb-2", "Wifi", "Senha do wifi", vec![])).await.expect("save");

        let missing = repo.list(true).await.expect("list missing");
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id.0, "kb-2");

        repo.update_embedding(&DocumentId("kb-2".to_string()), &[0.25, 0.75])
            .await
            .expect("update embedding");
        assert!(repo.list(true).await.expect("list missing").is_empty());

        let all = repo.list(false).await.expect("list all");
        assert_eq!(all[1].embedding, vec![0.25, 0.75]);

        let error = repo
            .update_embedding(&DocumentId("kb-404".to_string()), &[1.0])
            .await
            .expect_err("unknown document");
        assert!(matches!(error, RepositoryError::NotFound(_)));
        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }
}
