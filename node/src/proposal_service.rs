//! The proposal service: a [`ProposalEngine`] owned by a single task.
//!
//! Every call is a message on a bounded channel, handled to completion before
//! the next one starts, so tally increments and upserts never interleave.

use std::sync::Arc;

use agora_governance::{Choice, GovernanceError, Proposal, ProposalDraft, ProposalEngine, Tally};
use agora_types::{CallerId, ProposalId};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::NodeError;
use crate::metrics::NodeMetrics;

const SERVICE: &str = "proposal";

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Create {
        caller: CallerId,
        draft: ProposalDraft,
        reply: Reply<Result<ProposalId, GovernanceError>>,
    },
    Put {
        caller: CallerId,
        id: ProposalId,
        draft: ProposalDraft,
        reply: Reply<Result<Option<Proposal>, GovernanceError>>,
    },
    Get {
        id: ProposalId,
        reply: Reply<Option<Proposal>>,
    },
    Count {
        reply: Reply<u64>,
    },
    List {
        active_only: bool,
        reply: Reply<Vec<(ProposalId, Proposal)>>,
    },
    Tally {
        id: ProposalId,
        reply: Reply<Option<Tally>>,
    },
    Edit {
        caller: CallerId,
        id: ProposalId,
        draft: ProposalDraft,
        reply: Reply<Result<(), GovernanceError>>,
    },
    Vote {
        caller: CallerId,
        id: ProposalId,
        choice: Choice,
        reply: Reply<Result<(), GovernanceError>>,
    },
    End {
        caller: CallerId,
        id: ProposalId,
        reply: Reply<Result<(), GovernanceError>>,
    },
    Snapshot {
        reply: Reply<ProposalEngine>,
    },
}

struct ProposalService {
    engine: ProposalEngine,
    metrics: Arc<NodeMetrics>,
}

impl ProposalService {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        self.metrics
            .proposal_count
            .set(self.engine.get_proposal_count() as i64);
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
        debug!("proposal service stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Create {
                caller,
                draft,
                reply,
            } => {
                let result = self.engine.create_proposal(&caller, draft);
                if result.is_ok() {
                    self.metrics.proposals_created.inc();
                }
                self.refresh_count();
                let _ = reply.send(result);
            }
            Command::Put {
                caller,
                id,
                draft,
                reply,
            } => {
                let result = self.engine.put_proposal(&caller, id, draft);
                if let Ok(None) = result {
                    self.metrics.proposals_created.inc();
                }
                self.refresh_count();
                let _ = reply.send(result);
            }
            Command::Get { id, reply } => {
                let _ = reply.send(self.engine.get_proposal(id).cloned());
            }
            Command::Count { reply } => {
                let _ = reply.send(self.engine.get_proposal_count());
            }
            Command::List { active_only, reply } => {
                let list = if active_only {
                    self.engine
                        .list_active()
                        .map(|(id, p)| (id, p.clone()))
                        .collect()
                } else {
                    self.engine
                        .list_proposals()
                        .map(|(id, p)| (id, p.clone()))
                        .collect()
                };
                let _ = reply.send(list);
            }
            Command::Tally { id, reply } => {
                let _ = reply.send(self.engine.tally(id));
            }
            Command::Edit {
                caller,
                id,
                draft,
                reply,
            } => {
                let _ = reply.send(self.engine.edit_proposal(&caller, id, draft));
            }
            Command::Vote {
                caller,
                id,
                choice,
                reply,
            } => {
                let result = self.engine.vote(&caller, id, choice);
                match result {
                    Ok(()) => self.metrics.votes_accepted.inc(),
                    Err(_) => self.metrics.votes_rejected.inc(),
                }
                let _ = reply.send(result);
            }
            Command::End { caller, id, reply } => {
                let _ = reply.send(self.engine.end_proposal(&caller, id));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.engine.clone());
            }
        }
    }

    fn refresh_count(&self) {
        self.metrics
            .proposal_count
            .set(self.engine.get_proposal_count() as i64);
    }
}

/// Cloneable handle to the running proposal service.
#[derive(Clone)]
pub struct ProposalHandle {
    tx: mpsc::Sender<Command>,
}

impl ProposalHandle {
    /// Start the service task over `engine`. Must be called inside a tokio runtime.
    pub fn spawn(engine: ProposalEngine, metrics: Arc<NodeMetrics>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(ProposalService { engine, metrics }.run(rx));
        Self { tx }
    }

    pub async fn create_proposal(
        &self,
        caller: CallerId,
        draft: ProposalDraft,
    ) -> Result<ProposalId, NodeError> {
        Ok(self
            .call(|reply| Command::Create {
                caller,
                draft,
                reply,
            })
            .await??)
    }

    pub async fn put_proposal(
        &self,
        caller: CallerId,
        id: ProposalId,
        draft: ProposalDraft,
    ) -> Result<Option<Proposal>, NodeError> {
        Ok(self
            .call(|reply| Command::Put {
                caller,
                id,
                draft,
                reply,
            })
            .await??)
    }

    pub async fn get_proposal(&self, id: ProposalId) -> Result<Option<Proposal>, NodeError> {
        self.call(|reply| Command::Get { id, reply }).await
    }

    pub async fn get_proposal_count(&self) -> Result<u64, NodeError> {
        self.call(|reply| Command::Count { reply }).await
    }

    pub async fn list_proposals(&self) -> Result<Vec<(ProposalId, Proposal)>, NodeError> {
        self.call(|reply| Command::List {
            active_only: false,
            reply,
        })
        .await
    }

    pub async fn list_active(&self) -> Result<Vec<(ProposalId, Proposal)>, NodeError> {
        self.call(|reply| Command::List {
            active_only: true,
            reply,
        })
        .await
    }

    pub async fn tally(&self, id: ProposalId) -> Result<Option<Tally>, NodeError> {
        self.call(|reply| Command::Tally { id, reply }).await
    }

    pub async fn edit_proposal(
        &self,
        caller: CallerId,
        id: ProposalId,
        draft: ProposalDraft,
    ) -> Result<(), NodeError> {
        Ok(self
            .call(|reply| Command::Edit {
                caller,
                id,
                draft,
                reply,
            })
            .await??)
    }

    pub async fn vote(&self, caller: CallerId, id: ProposalId, choice: Choice) -> Result<(), NodeError> {
        Ok(self
            .call(|reply| Command::Vote {
                caller,
                id,
                choice,
                reply,
            })
            .await??)
    }

    pub async fn end_proposal(&self, caller: CallerId, id: ProposalId) -> Result<(), NodeError> {
        Ok(self.call(|reply| Command::End { caller, id, reply }).await??)
    }

    /// A copy of the whole engine, consistent as of this call.
    pub async fn snapshot(&self) -> Result<ProposalEngine, NodeError> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, NodeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| NodeError::ServiceStopped(SERVICE))?;
        rx.await.map_err(|_| NodeError::ServiceStopped(SERVICE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(name: &str) -> CallerId {
        CallerId::new(name).unwrap()
    }

    fn spawn() -> (ProposalHandle, Arc<NodeMetrics>) {
        let metrics = Arc::new(NodeMetrics::new());
        (
            ProposalHandle::spawn(ProposalEngine::new(), metrics.clone(), 16),
            metrics,
        )
    }

    #[tokio::test]
    async fn scenario_two_approves_one_reject() {
        let (service, metrics) = spawn();
        let previous = service
            .put_proposal(
                caller("alice"),
                ProposalId::new(0),
                ProposalDraft::new("Add feature X", true),
            )
            .await
            .unwrap();
        assert!(previous.is_none());

        let pid = ProposalId::new(0);
        service.vote(caller("v1"), pid, Choice::Approve).await.unwrap();
        service.vote(caller("v2"), pid, Choice::Approve).await.unwrap();
        service.vote(caller("v3"), pid, Choice::Reject).await.unwrap();

        let p = service.get_proposal(pid).await.unwrap().unwrap();
        assert_eq!((p.approve, p.reject, p.pass), (2, 1, 0));
        assert_eq!(metrics.votes_accepted.get(), 3);
        assert_eq!(metrics.proposal_count.get(), 1);
    }

    #[tokio::test]
    async fn errors_come_back_as_values() {
        let (service, metrics) = spawn();
        let alice = caller("alice");
        let id = service
            .create_proposal(alice.clone(), ProposalDraft::new("x", true))
            .await
            .unwrap();
        service.end_proposal(alice.clone(), id).await.unwrap();
        service.end_proposal(alice, id).await.unwrap();

        let err = service
            .vote(caller("bob"), id, Choice::Pass)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NodeError::Governance(GovernanceError::AlreadyClosed(_))
        ));
        let err = service
            .vote(caller("bob"), ProposalId::new(99), Choice::Pass)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NodeError::Governance(GovernanceError::NotFound(_))
        ));
        assert_eq!(metrics.votes_rejected.get(), 2);

        let err = service
            .put_proposal(caller("mallory"), id, ProposalDraft::new("reopened", true))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NodeError::Governance(GovernanceError::AlreadyClosed(_))
        ));
        assert!(service.get_proposal(id).await.unwrap().unwrap().is_closed());
    }

    #[tokio::test]
    async fn concurrent_votes_are_all_counted() {
        let (service, _) = spawn();
        let id = service
            .create_proposal(caller("alice"), ProposalDraft::new("x", true))
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for n in 0..40 {
            let service = service.clone();
            tasks.push(tokio::spawn(async move {
                service
                    .vote(CallerId::new(format!("v{n}")).unwrap(), id, Choice::Approve)
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(service.tally(id).await.unwrap().unwrap().approve, 40);
    }

    #[tokio::test]
    async fn list_and_snapshot() {
        let (service, _) = spawn();
        let alice = caller("alice");
        for n in 0..3 {
            service
                .create_proposal(alice.clone(), ProposalDraft::new(format!("p{n}"), true))
                .await
                .unwrap();
        }
        service.end_proposal(alice, ProposalId::new(1)).await.unwrap();

        assert_eq!(service.list_proposals().await.unwrap().len(), 3);
        let active: Vec<u64> = service
            .list_active()
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id.get())
            .collect();
        assert_eq!(active, vec![0, 2]);
        assert_eq!(service.snapshot().await.unwrap().get_proposal_count(), 3);
        assert_eq!(service.get_proposal_count().await.unwrap(), 3);
    }
}
