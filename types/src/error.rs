use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid caller id: {0:?}")]
    InvalidCallerId(String),

    #[error("invalid topic: {0:?}")]
    InvalidTopic(String),

    #[error("invalid id: {0}")]
    InvalidId(String),
}
