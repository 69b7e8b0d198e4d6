//! Proposal records and vote choices.

use agora_types::CallerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A single vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Choice {
    Approve,
    Reject,
    Pass,
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Choice::Approve => "approve",
            Choice::Reject => "reject",
            Choice::Pass => "pass",
        })
    }
}

impl FromStr for Choice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "approve" => Ok(Choice::Approve),
            "reject" => Ok(Choice::Reject),
            "pass" => Ok(Choice::Pass),
            other => Err(format!("unknown choice {other:?}")),
        }
    }
}

/// Caller-supplied fields for creating or editing a proposal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalDraft {
    pub description: String,
    pub is_active: bool,
}

impl ProposalDraft {
    pub fn new(description: impl Into<String>, is_active: bool) -> Self {
        Self {
            description: description.into(),
            is_active,
        }
    }
}

/// A stored proposal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub description: String,
    pub is_active: bool,
    pub approve: u32,
    pub reject: u32,
    pub pass: u32,
    /// Who created the proposal. Only the owner may edit or close it.
    pub owner: CallerId,
    /// Callers that have already voted.
    pub voters: BTreeSet<CallerId>,
}

impl Proposal {
    /// A fresh proposal with every tally at zero.
    pub fn from_draft(draft: ProposalDraft, owner: CallerId) -> Self {
        Self {
            description: draft.description,
            is_active: draft.is_active,
            approve: 0,
            reject: 0,
            pass: 0,
            owner,
            voters: BTreeSet::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        !self.is_active
    }

    pub fn has_voted(&self, caller: &CallerId) -> bool {
        self.voters.contains(caller)
    }

    /// Tally counter for `choice`.
    pub fn count(&self, choice: Choice) -> u32 {
        match choice {
            Choice::Approve => self.approve,
            Choice::Reject => self.reject,
            Choice::Pass => self.pass,
        }
    }

    pub(crate) fn count_mut(&mut self, choice: Choice) -> &mut u32 {
        match choice {
            Choice::Approve => &mut self.approve,
            Choice::Reject => &mut self.reject,
            Choice::Pass => &mut self.pass,
        }
    }

    pub fn tally(&self) -> Tally {
        Tally {
            approve: self.approve,
            reject: self.reject,
            pass: self.pass,
        }
    }
}

/// Vote totals for one proposal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub approve: u32,
    pub reject: u32,
    pub pass: u32,
}

impl Tally {
    pub fn total(&self) -> u64 {
        u64::from(self.approve) + u64::from(self.reject) + u64::from(self.pass)
    }

    /// The choice with strictly the most votes, or `None` on a tie or no votes.
    pub fn leading(&self) -> Option<Choice> {
        let mut ranked = [
            (Choice::Approve, self.approve),
            (Choice::Reject, self.reject),
            (Choice::Pass, self.pass),
        ];
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        match ranked {
            [(_, 0), ..] => None,
            [(first, a), (_, b), _] if a > b => Some(first),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(name: &str) -> CallerId {
        CallerId::new(name).unwrap()
    }

    #[test]
    fn new_proposal_starts_with_zero_tallies() {
        let p = Proposal::from_draft(ProposalDraft::new("desc", true), caller("alice"));
        assert_eq!(p.tally(), Tally::default());
        assert!(p.voters.is_empty());
        assert!(!p.is_closed());
    }

    #[test]
    fn leading_choice() {
        let t = Tally { approve: 2, reject: 1, pass: 0 };
        assert_eq!(t.leading(), Some(Choice::Approve));
        assert_eq!(t.total(), 3);

        let tie = Tally { approve: 1, reject: 1, pass: 0 };
        assert_eq!(tie.leading(), None);
        assert_eq!(Tally::default().leading(), None);

        let pass = Tally { approve: 0, reject: 0, pass: 4 };
        assert_eq!(pass.leading(), Some(Choice::Pass));
    }

    #[test]
    fn choice_parses_case_insensitively() {
        assert_eq!("Approve".parse::<Choice>(), Ok(Choice::Approve));
        assert_eq!("REJECT".parse::<Choice>(), Ok(Choice::Reject));
        assert!("maybe".parse::<Choice>().is_err());
    }
}
