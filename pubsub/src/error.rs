use agora_types::CallerId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PubSubError {
    #[error("no service registered as {0}")]
    UnknownService(CallerId),

    #[error("a service is already registered as {0}")]
    DuplicateService(CallerId),

    #[error("delivery to {target} failed: {reason}")]
    Delivery { target: CallerId, reason: String },

    #[error("service {0} has stopped")]
    ServiceStopped(CallerId),
}
