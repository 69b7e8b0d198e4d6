//! Proposal engine — owns every proposal record and applies the
//! create / edit / vote / close operations to them.
//!
//! All checks run before anything is written, so a rejected call never
//! leaves a record half-updated.

use std::collections::BTreeMap;

use agora_types::{CallerId, ProposalId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GovernanceError;
use crate::proposal::{Choice, Proposal, ProposalDraft, Tally};

/// The proposal table.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "StoredEngine")]
pub struct ProposalEngine {
    proposals: BTreeMap<ProposalId, Proposal>,
    /// Next service-assigned id. Always greater than every stored key.
    next_id: u64,
}

/// Serialized form. `next_id` is re-derived on load so a stale value can
/// never hand out a key that is already stored.
#[derive(Deserialize)]
struct StoredEngine {
    proposals: BTreeMap<ProposalId, Proposal>,
    next_id: u64,
}

impl From<StoredEngine> for ProposalEngine {
    fn from(stored: StoredEngine) -> Self {
        let floor = stored
            .proposals
            .keys()
            .next_back()
            .map_or(0, |id| id.get().saturating_add(1));
        Self {
            next_id: stored.next_id.max(floor),
            proposals: stored.proposals,
        }
    }
}

impl ProposalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a proposal under a fresh, strictly increasing id.
    pub fn create_proposal(
        &mut self,
        caller: &CallerId,
        draft: ProposalDraft,
    ) -> Result<ProposalId, GovernanceError> {
        let id = ProposalId::new(self.next_id);
        let next = id.next().ok_or(GovernanceError::IdsExhausted)?;
        self.proposals
            .insert(id, Proposal::from_draft(draft, caller.clone()));
        self.next_id = next.get();
        debug!(%id, owner = %caller, "proposal created");
        Ok(id)
    }

    /// Insert a proposal at a caller-chosen id, replacing and returning any
    /// record already stored there.
    ///
    /// Only an open proposal owned by `caller` may be replaced; a closed one
    /// stays frozen. The replacement starts with zero tallies and no voters.
    pub fn put_proposal(
        &mut self,
        caller: &CallerId,
        id: ProposalId,
        draft: ProposalDraft,
    ) -> Result<Option<Proposal>, GovernanceError> {
        if let Some(existing) = self.proposals.get(&id) {
            if existing.is_closed() {
                return Err(GovernanceError::AlreadyClosed(id));
            }
            if &existing.owner != caller {
                return Err(GovernanceError::NotOwner(id));
            }
        }
        let previous = self
            .proposals
            .insert(id, Proposal::from_draft(draft, caller.clone()));
        // u64::MAX as a key leaves no room for assigned ids; create_proposal
        // then reports IdsExhausted.
        self.next_id = self.next_id.max(id.get().saturating_add(1));
        debug!(%id, owner = %caller, replaced = previous.is_some(), "proposal stored");
        Ok(previous)
    }

    pub fn get_proposal(&self, id: ProposalId) -> Option<&Proposal> {
        self.proposals.get(&id)
    }

    pub fn get_proposal_count(&self) -> u64 {
        self.proposals.len() as u64
    }

    /// Every proposal, in id order.
    pub fn list_proposals(&self) -> impl Iterator<Item = (ProposalId, &Proposal)> {
        self.proposals.iter().map(|(id, p)| (*id, p))
    }

    /// Open proposals only, in id order.
    pub fn list_active(&self) -> impl Iterator<Item = (ProposalId, &Proposal)> {
        self.list_proposals().filter(|(_, p)| p.is_active)
    }

    pub fn tally(&self, id: ProposalId) -> Option<Tally> {
        self.proposals.get(&id).map(Proposal::tally)
    }

    /// Replace the description and activity flag of an open proposal.
    ///
    /// Setting `is_active = false` closes the proposal for good.
    pub fn edit_proposal(
        &mut self,
        caller: &CallerId,
        id: ProposalId,
        draft: ProposalDraft,
    ) -> Result<(), GovernanceError> {
        let proposal = self.owned_mut(caller, id)?;
        if proposal.is_closed() {
            return Err(GovernanceError::AlreadyClosed(id));
        }
        proposal.description = draft.description;
        proposal.is_active = draft.is_active;
        debug!(%id, is_active = proposal.is_active, "proposal edited");
        Ok(())
    }

    /// Record `caller`'s vote. Each caller votes at most once per proposal.
    pub fn vote(
        &mut self,
        caller: &CallerId,
        id: ProposalId,
        choice: Choice,
    ) -> Result<(), GovernanceError> {
        let proposal = self
            .proposals
            .get_mut(&id)
            .ok_or(GovernanceError::NotFound(id))?;
        if proposal.is_closed() {
            return Err(GovernanceError::AlreadyClosed(id));
        }
        if proposal.has_voted(caller) {
            return Err(GovernanceError::AlreadyVoted {
                id,
                caller: caller.clone(),
            });
        }
        let bumped = proposal
            .count(choice)
            .checked_add(1)
            .ok_or(GovernanceError::TallyOverflow(id))?;

        *proposal.count_mut(choice) = bumped;
        proposal.voters.insert(caller.clone());
        debug!(%id, voter = %caller, %choice, "vote recorded");
        Ok(())
    }

    /// Close a proposal. Closing an already closed proposal is a no-op.
    pub fn end_proposal(&mut self, caller: &CallerId, id: ProposalId) -> Result<(), GovernanceError> {
        let proposal = self.owned_mut(caller, id)?;
        if proposal.is_active {
            proposal.is_active = false;
            debug!(%id, "proposal closed");
        }
        Ok(())
    }

    fn owned_mut(
        &mut self,
        caller: &CallerId,
        id: ProposalId,
    ) -> Result<&mut Proposal, GovernanceError> {
        let proposal = self
            .proposals
            .get_mut(&id)
            .ok_or(GovernanceError::NotFound(id))?;
        if &proposal.owner != caller {
            return Err(GovernanceError::NotOwner(id));
        }
        Ok(proposal)
    }
}
