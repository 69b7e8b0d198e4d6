//! The exam service: an [`ExamStore`] owned by a single task.

use std::sync::Arc;

use agora_records::{Exam, ExamDraft, ExamStore, RecordsError};
use agora_types::ExamId;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::NodeError;
use crate::metrics::NodeMetrics;

const SERVICE: &str = "exam";

type Reply<T> = oneshot::Sender<T>;

enum Command {
    InsertExam {
        id: ExamId,
        draft: ExamDraft,
        reply: Reply<Result<Option<Exam>, RecordsError>>,
    },
    GetExam {
        id: ExamId,
        reply: Reply<Option<Exam>>,
    },
    InsertParticipation {
        id: ExamId,
        value: u64,
        reply: Reply<Option<u64>>,
    },
    GetParticipation {
        id: ExamId,
        reply: Reply<Option<u64>>,
    },
    Snapshot {
        reply: Reply<ExamStore>,
    },
}

struct ExamService {
    store: ExamStore,
    metrics: Arc<NodeMetrics>,
}

impl ExamService {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        self.metrics.exam_count.set(self.store.exam_count() as i64);
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
        debug!("exam service stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::InsertExam { id, draft, reply } => {
                let result = self.store.insert_exam(id, draft);
                match &result {
                    Ok(_) => self.metrics.exams_inserted.inc(),
                    Err(e) => {
                        self.metrics.exam_inserts_rejected.inc();
                        debug!(%id, "exam rejected: {e}");
                    }
                }
                self.metrics.exam_count.set(self.store.exam_count() as i64);
                let _ = reply.send(result);
            }
            Command::GetExam { id, reply } => {
                let _ = reply.send(self.store.get_exam(id).cloned());
            }
            Command::InsertParticipation { id, value, reply } => {
                let _ = reply.send(self.store.insert_participation(id, value));
            }
            Command::GetParticipation { id, reply } => {
                let _ = reply.send(self.store.get_participation(id));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.store.clone());
            }
        }
    }
}

/// Cloneable handle to the running exam service.
#[derive(Clone)]
pub struct ExamHandle {
    tx: mpsc::Sender<Command>,
}

impl ExamHandle {
    /// Start the service task over `store`. Must be called inside a tokio runtime.
    pub fn spawn(store: ExamStore, metrics: Arc<NodeMetrics>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(ExamService { store, metrics }.run(rx));
        Self { tx }
    }

    pub async fn insert_exam(&self, id: ExamId, draft: ExamDraft) -> Result<Option<Exam>, NodeError> {
        Ok(self
            .call(|reply| Command::InsertExam { id, draft, reply })
            .await??)
    }

    pub async fn get_exam(&self, id: ExamId) -> Result<Option<Exam>, NodeError> {
        self.call(|reply| Command::GetExam { id, reply }).await
    }

    pub async fn insert_participation(&self, id: ExamId, value: u64) -> Result<Option<u64>, NodeError> {
        self.call(|reply| Command::InsertParticipation { id, value, reply })
            .await
    }

    pub async fn get_participation(&self, id: ExamId) -> Result<Option<u64>, NodeError> {
        self.call(|reply| Command::GetParticipation { id, reply }).await
    }

    pub async fn snapshot(&self) -> Result<ExamStore, NodeError> {
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
