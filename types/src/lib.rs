//! Identifiers shared across every crate in the workspace.
//!
//! Callers, proposals, exam records and counter topics are all addressed by
//! the small newtypes defined here.

pub mod caller;
pub mod error;
pub mod id;
pub mod topic;

pub use caller::CallerId;
pub use error::TypesError;
pub use id::{ExamId, ProposalId};
pub use topic::Topic;
