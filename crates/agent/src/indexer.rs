use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use deskpilot_db::repositories::{DocumentRepository, RepositoryError};

use crate::llm::EmbeddingClient;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub considered: usize,
    pub embedded: usize,
    pub failed: usize,
    pub failed_ids: Vec<String>,
}

/// Embeds knowledge documents. A provider failure on one document is counted
/// and the batch continues; only a store failure aborts the run.
pub struct KnowledgeIndexer {
    embeddings: Arc<dyn EmbeddingClient>,
    documents: Arc<dyn DocumentRepository>,
}

impl KnowledgeIndexer {
    pub fn new(embeddings: Arc<dyn EmbeddingClient>, documents: Arc<dyn DocumentRepository>) -> Self {
        Self { embeddings, documents }
    }

    pub async fn reindex(&self, only_missing: bool) -> Result<ReindexReport, RepositoryError> {
        let documents = self.documents.list(only_missing).await?;
        let mut report = ReindexReport { considered: documents.len(), ..ReindexReport::default() };

        for document in documents {
            let input = format!("{}\n\n{}", document.title, document.content);
            match self.embeddings.embed(&input).await {
                Ok(vector) => {
                    self.documents.update_embedding(&document.id, &vector).await?;
                    report.embedded += 1;
                }
                Err(error) => {
                    warn!(
                        event_name = "indexer.embed_failed",
                        document_id = %document.id.0,
                        error = %error,
                        "document left without embedding"
                    );
                    report.failed += 1;
                    report.failed_ids.push(document.id.0);
                }
            }
        }

        info!(
            event_name = "indexer.completed",
            only_missing,
            considered = report.considered,
            embedded = report.embedded,
            failed = report.failed,
            "knowledge reindex finished"
        );
        Ok(report)
    }
}
