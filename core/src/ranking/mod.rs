pub mod ltr;
pub mod match_classifier;
pub mod pipeline;
pub mod scorer;
pub mod types;

pub use pipeline::{search, SearchResponse};
pub use types::{Candidate, MatchType, ScoreBreakdown};
