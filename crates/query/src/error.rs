use crate::intent::QueryIntent;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Invalid pattern for intent {intent}: {source}")]
    InvalidPattern {
        intent: QueryIntent,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Search(#[from] knowledge_search::SearchError),
}
