pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod models;
pub mod remote;
pub mod similarity;
pub mod store;
pub mod suggest;

pub use embeddings::{EmbeddingProvider, HashEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{EmbeddingError, IngestError, MatchError, Result, StoreError};
pub use extractor::{extract_text_from_path, normalize_whitespace, LopdfExtractor, PdfExtractor};
pub use models::{
    Assignment, Call, DashboardStats, NewCall, NewProposal, NewResearcher, NewReview, NewReviewer,
    Proposal, ProposalStatus, Researcher, ReviewCriteria, ReviewScore, Reviewer,
    ReviewerSuggestion,
};
pub use remote::RemoteEmbedder;
pub use similarity::cosine_similarity;
pub use store::{hash_password, Database};
pub use suggest::{matched_priority_areas, SuggestionEngine, MAX_SUGGESTIONS};
