use crate::embeddings::EmbeddingProvider;
use crate::error::MatchError;
use crate::models::{Reviewer, ReviewerSuggestion};
use crate::similarity::cosine_similarity;
use std::collections::HashSet;
use tracing::debug;

pub const MAX_SUGGESTIONS: usize = 3;

/// Ranks a reviewer pool against one proposal's combined text signal and
/// returns up to [`MAX_SUGGESTIONS`] previously-unassigned reviewers, each
/// with a similarity score and a human-readable match explanation.
///
/// The engine is a pure function over its inputs: it reads the snapshots the
/// caller passes in and returns a value. Persisting the result as assignment
/// rows is the caller's explicit confirm step.
pub struct SuggestionEngine<P> {
    provider: P,
    max_suggestions: usize,
}

impl<P> SuggestionEngine<P>
where
    P: EmbeddingProvider + Send + Sync,
{
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            max_suggestions: MAX_SUGGESTIONS,
        }
    }

    /// Produces the ranked shortlist for one proposal.
    ///
    /// `proposal_text` is the proposal body, `priority_areas` the call's raw
    /// comma-delimited areas string; the two are concatenated into the
    /// embedding signal, while area matching against reviewer expertise uses
    /// the raw areas string independently of the embedding.
    ///
    /// An empty reviewer pool is a legitimate terminal state and returns an
    /// empty list. A blank combined signal is `MatchError::InvalidInput`.
    /// Embedding provider failures propagate.
    pub async fn suggest(
        &self,
        proposal_text: &str,
        priority_areas: &str,
        reviewers: &[Reviewer],
        assigned: &HashSet<i64>,
    ) -> Result<Vec<ReviewerSuggestion>, MatchError> {
        if reviewers.is_empty() {
            return Ok(Vec::new());
        }

        let combined = format!("{} {}", proposal_text, priority_areas);
        if combined.trim().is_empty() {
            return Err(MatchError::InvalidInput(
                "proposal has no text to rank against".to_string(),
            ));
        }

        // A reviewer who never uploaded a CV carries no ranking signal, so
        // the pool is narrowed to reviewers with non-blank CV text.
        let candidates: Vec<&Reviewer> = reviewers
            .iter()
            .filter(|reviewer| !reviewer.cv_text.trim().is_empty())
            .collect();

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let cv_texts: Vec<String> = candidates
            .iter()
            .map(|reviewer| reviewer.cv_text.clone())
            .collect();

        let (proposal_vector, reviewer_vectors) = tokio::try_join!(
            self.provider.embed(&combined),
            self.provider.embed_batch(&cv_texts)
        )?;

        let mut ranked: Vec<(usize, f32)> = reviewer_vectors
            .iter()
            .enumerate()
            .map(|(index, vector)| (index, cosine_similarity(&proposal_vector, vector)))
            .collect();

        // Stable sort: tied scores keep the pool's input order.
        ranked.sort_by(|left, right| right.1.total_cmp(&left.1));

        let mut suggestions = Vec::new();
        for (index, score) in ranked {
            if suggestions.len() >= self.max_suggestions {
                break;
            }

            let reviewer = candidates[index];
            if assigned.contains(&reviewer.id) {
                debug!(reviewer_id = reviewer.id, "skipping already-assigned reviewer");
                continue;
            }

            let matched_areas = matched_priority_areas(priority_areas, &reviewer.expertise);
            let explanation = build_explanation(&matched_areas, &reviewer.expertise);

            suggestions.push(ReviewerSuggestion {
                reviewer_id: reviewer.id,
                reviewer_name: reviewer.name.clone(),
                score,
                matched_areas,
                explanation,
            });
        }

        debug!(count = suggestions.len(), "reviewer suggestions ready");
        Ok(suggestions)
    }
}

/// Case-insensitive substring match of each comma-delimited priority area
/// against the reviewer's expertise text. Independent of the embedding score.
pub fn matched_priority_areas(priority_areas: &str, expertise: &str) -> Vec<String> {
    if priority_areas.trim().is_empty() || expertise.trim().is_empty() {
        return Vec::new();
    }

    let expertise_lower = expertise.to_lowercase();
    priority_areas
        .split(',')
        .map(str::trim)
        .filter(|area| !area.is_empty())
        .filter(|area| expertise_lower.contains(&area.to_lowercase()))
        .map(str::to_string)
        .collect()
}

fn build_explanation(matched_areas: &[String], expertise: &str) -> String {
    let matched = if matched_areas.is_empty() {
        "None".to_string()
    } else {
        matched_areas.join(", ")
    };

    format!(
        "Similarity signals:\n\
         - Text embedding similarity\n\
         - Priority area matching\n\
         \n\
         Matched Areas:\n\
         {matched}\n\
         \n\
         Reviewer Expertise:\n\
         {expertise}"
    )
}

#[cfg(test)]
mod tests {
    use super::{matched_priority_areas, SuggestionEngine};
    use crate::embeddings::EmbeddingProvider;
    use crate::error::{EmbeddingError, MatchError};
    use crate::models::Reviewer;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};

    /// Maps exact input text to fixed vectors; unknown text embeds to zero.
    struct FakeProvider {
        vectors: HashMap<String, Vec<f32>>,
        dimensions: usize,
        fail: bool,
    }

    impl FakeProvider {
        fn new(pairs: &[(&str, Vec<f32>)]) -> Self {
            let dimensions = pairs.first().map(|(_, v)| v.len()).unwrap_or(3);
            Self {
                vectors: pairs
                    .iter()
                    .map(|(text, vector)| (text.to_string(), vector.clone()))
                    .collect(),
                dimensions,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                vectors: HashMap::new(),
                dimensions: 3,
                fail: true,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FakeProvider {
        fn dimensions(&self) -> usize {
            self.dimensions
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if self.fail {
                return Err(EmbeddingError::BackendResponse {
                    endpoint: "fake".to_string(),
                    details: "provider unavailable".to_string(),
                });
            }
            Ok(self
                .vectors
                .get(text)
                .cloned()
                .unwrap_or_else(|| vec![0.0; self.dimensions]))
        }
    }

    fn reviewer(id: i64, name: &str, expertise: &str, cv_text: &str) -> Reviewer {
        Reviewer {
            id,
            name: name.to_string(),
            email: format!("{}@example.org", name.to_lowercase()),
            expertise: expertise.to_string(),
            cv_text: cv_text.to_string(),
        }
    }

    const PROPOSAL: &str = "machine learning for crop yield";
    const AREAS: &str = "AI, Agriculture";
    // The engine embeds body and areas as one signal.
    const COMBINED: &str = "machine learning for crop yield AI, Agriculture";

    #[tokio::test]
    async fn ranks_overlapping_reviewer_above_unrelated_and_excludes_assigned() {
        let provider = FakeProvider::new(&[
            (COMBINED, vec![1.0, 0.0, 0.0]),
            ("cv-a", vec![0.9, 0.1, 0.0]),
            ("cv-b", vec![0.0, 1.0, 0.0]),
            ("cv-c", vec![1.0, 0.0, 0.0]),
        ]);
        let engine = SuggestionEngine::new(provider);

        let reviewers = vec![
            reviewer(1, "Asha", "Expert in AI and agriculture", "cv-a"),
            reviewer(2, "Bjorn", "Marine biology", "cv-b"),
            reviewer(3, "Chen", "Crop science", "cv-c"),
        ];
        let assigned = HashSet::from([3]);

        let suggestions = engine
            .suggest(PROPOSAL, AREAS, &reviewers, &assigned)
            .await
            .unwrap();

        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].reviewer_id, 1);
        assert_eq!(suggestions[1].reviewer_id, 2);
        assert!(suggestions[0].score >= suggestions[1].score);
        assert!(suggestions.iter().all(|s| s.reviewer_id != 3));

        assert_eq!(suggestions[0].matched_areas, vec!["AI", "Agriculture"]);
        assert!(suggestions[0].explanation.contains("AI, Agriculture"));
        assert!(suggestions[1].matched_areas.is_empty());
        assert!(suggestions[1].explanation.contains("Matched Areas:\nNone"));
    }

    #[tokio::test]
    async fn empty_pool_returns_empty_list_without_error() {
        let engine = SuggestionEngine::new(FakeProvider::new(&[]));
        let suggestions = engine
            .suggest(PROPOSAL, AREAS, &[], &HashSet::new())
            .await
            .unwrap();
        assert!(suggestions.is_empty());
    }

    #[tokio::test]
    async fn caps_suggestions_at_three() {
        let provider = FakeProvider::new(&[
            (COMBINED, vec![1.0, 0.0, 0.0]),
            ("cv-1", vec![1.0, 0.0, 0.0]),
            ("cv-2", vec![0.9, 0.1, 0.0]),
            ("cv-3", vec![0.8, 0.2, 0.0]),
            ("cv-4", vec![0.7, 0.3, 0.0]),
            ("cv-5", vec![0.6, 0.4, 0.0]),
        ]);
        let engine = SuggestionEngine::new(provider);

        let reviewers: Vec<Reviewer> = (1..=5)
            .map(|n| reviewer(n, &format!("R{n}"), "AI", &format!("cv-{n}")))
            .collect();

        let suggestions = engine
            .suggest(PROPOSAL, AREAS, &reviewers, &HashSet::new())
            .await
            .unwrap();

        assert_eq!(suggestions.len(), 3);
        assert_eq!(
            suggestions.iter().map(|s| s.reviewer_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn tied_scores_keep_pool_order() {
        let provider = FakeProvider::new(&[
            (COMBINED, vec![1.0, 0.0, 0.0]),
            ("cv-same", vec![0.5, 0.5, 0.0]),
        ]);
        let engine = SuggestionEngine::new(provider);

        let reviewers = vec![
            reviewer(7, "First", "AI", "cv-same"),
            reviewer(8, "Second", "AI", "cv-same"),
        ];

        let suggestions = engine
            .suggest(PROPOSAL, AREAS, &reviewers, &HashSet::new())
            .await
            .unwrap();

        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].score, suggestions[1].score);
        assert_eq!(suggestions[0].reviewer_id, 7);
        assert_eq!(suggestions[1].reviewer_id, 8);
    }

    #[tokio::test]
    async fn zero_proposal_vector_scores_zero_not_nan() {
        // COMBINED is absent from the fake, so the proposal embeds to zero.
        let provider = FakeProvider::new(&[("cv-a", vec![0.9, 0.1, 0.0])]);
        let engine = SuggestionEngine::new(provider);

        let reviewers = vec![reviewer(1, "Asha", "AI", "cv-a")];
        let suggestions = engine
            .suggest(PROPOSAL, AREAS, &reviewers, &HashSet::new())
            .await
            .unwrap();

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].score, 0.0);
        assert!(!suggestions[0].score.is_nan());
    }

    #[tokio::test]
    async fn reviewers_without_cv_text_are_excluded() {
        let provider = FakeProvider::new(&[
            (COMBINED, vec![1.0, 0.0, 0.0]),
            ("cv-a", vec![0.9, 0.1, 0.0]),
        ]);
        let engine = SuggestionEngine::new(provider);

        let reviewers = vec![
            reviewer(1, "Asha", "AI", "cv-a"),
            reviewer(2, "NoCv", "AI", "   "),
        ];

        let suggestions = engine
            .suggest(PROPOSAL, AREAS, &reviewers, &HashSet::new())
            .await
            .unwrap();

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].reviewer_id, 1);
    }

    #[tokio::test]
    async fn blank_proposal_signal_is_invalid_input() {
        let engine = SuggestionEngine::new(FakeProvider::new(&[]));
        let reviewers = vec![reviewer(1, "Asha", "AI", "cv-a")];

        let result = engine.suggest("  ", "", &reviewers, &HashSet::new()).await;
        assert!(matches!(result, Err(MatchError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let engine = SuggestionEngine::new(FakeProvider::failing());
        let reviewers = vec![reviewer(1, "Asha", "AI", "cv-a")];

        let result = engine
            .suggest(PROPOSAL, AREAS, &reviewers, &HashSet::new())
            .await;
        assert!(matches!(result, Err(MatchError::Embedding(_))));
    }

    #[test]
    fn area_matching_is_case_insensitive_substring_containment() {
        let matched = matched_priority_areas("AI, Agriculture", "expert in ai and AGRICULTURE");
        assert_eq!(matched, vec!["AI", "Agriculture"]);

        assert!(matched_priority_areas("AI, Agriculture", "marine biology").is_empty());
        assert!(matched_priority_areas("", "anything").is_empty());
        assert!(matched_priority_areas("AI", "").is_empty());
    }
}
