use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub category: Option<String>,
    pub content: String,
    pub embedding: Vec<f32>,
}

impl Document {
    pub fn needs_embedding(&self) -> bool {
        self.embedding.is_empty()
    }

    /// First `max_chars` characters of the content, cut on a char boundary.
    pub fn excerpt(&self, max_chars: usize) -> String {
        let mut excerpt: String = self.content.chars().take(max_chars).collect();
        if self.content.chars().count() > max_chars {
            excerpt.push('…');
        }
        excerpt
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub document: Document,
    pub similarity_score: f64,
    pub relevance_score: Option<u8>,
}

impl RetrievalCandidate {
    pub fn new(document: Document, similarity_score: f64) -> Self {
        Self { document, similarity_score, relevance_score: None }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HybridQuery<'a> {
    pub embedding: &'a [f32],
    pub text: &'a str,
    pub match_count: usize,
    /// Weight of the semantic component; `1 - alpha` goes to lexical matching.
    pub alpha: f64,
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.is_empty() || left.len() != right.len() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut left_norm = 0.0_f64;
    let mut right_norm = 0.0_f64;
    for (a, b) in left.iter().zip(right) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm.sqrt() * right_norm.sqrt())
}

fn query_terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of distinct query terms (3+ chars) present in title or content.
pub fn lexical_score(query: &str, document: &Document) -> f64 {
    let terms = query_terms(query);
    if terms.is_empty() {
        return 0.0;
    }

    let haystack = format!("{} {}", document.title, document.content).to_lowercase();
    let hits = terms.iter().filter(|term| haystack.contains(term.as_str())).count();
    hits as f64 / terms.len() as f64
}

pub fn hybrid_score(query: &HybridQuery<'_>, document: &Document) -> f64 {
    let alpha = query.alpha.clamp(0.0, 1.0);
    let semantic = cosine_similarity(query.embedding, &document.embedding).max(0.0);
    let lexical = lexical_score(query.text, document);
    alpha * semantic + (1.0 - alpha) * lexical
}

/// Scores every document and keeps the best `match_count`, highest first.
/// Documents that score zero on both components are never returned.
pub fn rank_hybrid<I>(query: &HybridQuery<'_>, documents: I) -> Vec<RetrievalCandidate>
where
    I: IntoIterator<Item = Document>,
{
    let mut candidates = documents
        .into_iter()
        .map(|document| {
            let score = hybrid_score(query, &document);
            RetrievalCandidate::new(document, score)
        })
        .filter(|candidate| candidate.similarity_score > 0.0)
        .collect::<Vec<_>>();

    candidates.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document.id.cmp(&b.document.id))
    });
    candidates.truncate(query.match_count);
    candidates
}

#[cfg(test)]
mod tests {
    use super::{cosine_similarity, lexical_score, rank_hybrid, Document, DocumentId, HybridQuery};

    fn doc(id: &str, title: &str, content: &str, embedding: Vec<f32>) -> Document {
        Document {
            id: DocumentId(id.to_string()),
            title: title.to_string(),
            category: None,
            content: content.to_string(),
            embedding,
        }
    }

    #[test]
    fn cosine_similarity_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn lexical_score_counts_distinct_terms_of_three_or_more_chars() {
        let document = doc("d1", "Impressora", "Como trocar o toner da impressora", vec![]);
        assert!((lexical_score("trocar toner de impressora", &document) - 1.0).abs() < 1e-9);
        assert!((lexical_score("toner wifi", &document) - 0.5).abs() < 1e-9);
        assert_eq!(lexical_score("a o", &document), 0.0);
    }

    #[test]
    fn hybrid_ranking_blends_components_and_truncates() {
        let documents = vec![
            doc("semantic", "Rede", "Configurar VPN", vec![1.0, 0.0]),
            doc("both", "Senha", "Como redefinir senha do email", vec![0.6, 0.8]),
            doc("noise", "Cafe", "Cardapio da copa", vec![0.0, -1.0]),
        ];
        let query = HybridQuery {
            embedding: &[1.0, 0.0],
            text: "redefinir senha",
            match_count: 2,
            alpha: 0.5,
        };

        let ranked = rank_hybrid(&query, documents);

        // both: 0.5 * 0.6 + 0.5 * 1.0; semantic: 0.5 * 1.0 + 0.5 * 0.0; noise scores zero
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].document.id.0, "both");
        assert!((ranked[0].similarity_score - 0.8).abs() < 1e-6);
        assert_eq!(ranked[1].document.id.0, "semantic");
        assert!(ranked.iter().all(|candidate| candidate.relevance_score.is_none()));
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let document = doc("d1", "t", "ação rápida", vec![]);
        assert_eq!(document.excerpt(4), "ação…");
        assert_eq!(document.excerpt(50), "ação rápida");
    }
}
