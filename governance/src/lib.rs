//! Proposal voting for agora.
//!
//! Proposals move one way, Open → Closed. While open they can be edited by
//! their owner and voted on (one vote per caller); once closed the
//! description and tallies are frozen.

pub mod engine;
pub mod error;
pub mod proposal;

pub use engine::ProposalEngine;
pub use error::GovernanceError;
pub use proposal::{Choice, Proposal, ProposalDraft, Tally};
