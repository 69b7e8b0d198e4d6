use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("governance error: {0}")]
    Governance(#[from] agora_governance::GovernanceError),

    #[error("records error: {0}")]
    Records(#[from] agora_records::RecordsError),

    #[error("pubsub error: {0}")]
    PubSub(#[from] agora_pubsub::PubSubError),

    #[error("invalid identifier: {0}")]
    Types(#[from] agora_types::TypesError),

    #[error("config error: {0}")]
    Config(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} service has stopped")]
    ServiceStopped(&'static str),
}
