use agora_types::{CallerId, ProposalId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GovernanceError {
    #[error("proposal {0} not found")]
    NotFound(ProposalId),

    #[error("proposal {0} is closed")]
    AlreadyClosed(ProposalId),

    #[error("caller {caller} has already voted on proposal {id}")]
    AlreadyVoted { id: ProposalId, caller: CallerId },

    #[error("only the owner of proposal {0} may do this")]
    NotOwner(ProposalId),

    #[error("tally overflow on proposal {0}")]
    TallyOverflow(ProposalId),

    #[error("proposal id space exhausted")]
    IdsExhausted,
}
