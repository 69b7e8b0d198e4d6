//! agora node — hosts the proposal, exam and counter services.
//!
//! Each service runs as its own task that owns its state and handles one
//! call at a time. Callers use cheap cloneable handles; the node wires them
//! together, loads state from disk at startup and writes it back at shutdown.

pub mod config;
pub mod error;
pub mod exam_service;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod proposal_service;
pub mod shutdown;
pub mod snapshot;

pub use config::NodeConfig;
pub use error::NodeError;
pub use exam_service::ExamHandle;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::AgoraNode;
pub use proposal_service::ProposalHandle;
pub use shutdown::ShutdownController;
pub use snapshot::SnapshotStore;
