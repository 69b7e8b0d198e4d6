//! The agora node: wires every service together and owns their lifecycle.

use std::sync::Arc;

use agora_governance::ProposalEngine;
use agora_pubsub::{Directory, Publisher, PublisherHandle, Subscriber, SubscriberHandle};
use agora_records::ExamStore;
use agora_types::{CallerId, Topic};
use tracing::{error, info};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::exam_service::ExamHandle;
use crate::metrics::NodeMetrics;
use crate::proposal_service::ProposalHandle;
use crate::shutdown::ShutdownController;
use crate::snapshot::{SnapshotStore, EXAMS_FILE, PROPOSALS_FILE};

/// A running agora node.
pub struct AgoraNode {
    pub config: NodeConfig,
    pub metrics: Arc<NodeMetrics>,
    pub shutdown: Arc<ShutdownController>,
    /// Routes `update_count` pushes between counter services.
    pub directory: Directory,
    pub proposals: ProposalHandle,
    pub exams: ExamHandle,
    /// The node's own counter publisher, registered as `config.publisher_id`.
    pub publisher: PublisherHandle,
    snapshots: Option<SnapshotStore>,
}

impl AgoraNode {
    /// Build a node from `config`, loading snapshots from `config.data_dir`
    /// when persistence is on. Must be called inside a tokio runtime.
    pub async fn new(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;

        let snapshots = config
            .persist_snapshots
            .then(|| SnapshotStore::new(&config.data_dir));
        let (engine, store) = match &snapshots {
            Some(snapshots) => (
                snapshots.load::<ProposalEngine>(PROPOSALS_FILE)?,
                snapshots.load::<ExamStore>(EXAMS_FILE)?,
            ),
            None => (ProposalEngine::new(), ExamStore::new()),
        };
        info!(
            proposals = engine.get_proposal_count(),
            exams = store.exam_count(),
            "state loaded"
        );

        let metrics = Arc::new(NodeMetrics::new());
        let capacity = config.mailbox_capacity;
        let proposals = ProposalHandle::spawn(engine, metrics.clone(), capacity);
        let exams = ExamHandle::spawn(store, metrics.clone(), capacity);

        let directory = Directory::new();
        let publisher_id = CallerId::new(config.publisher_id.as_str())?;
        let publisher = Publisher::spawn(publisher_id, directory.clone(), capacity)?;

        Ok(Self {
            config,
            metrics,
            shutdown: Arc::new(ShutdownController::new()),
            directory,
            proposals,
            exams,
            publisher,
            snapshots,
        })
    }

    /// Start a subscriber in this node's directory.
    pub fn spawn_subscriber(&self, id: CallerId) -> Result<SubscriberHandle, NodeError> {
        Ok(Subscriber::spawn(
            id,
            self.directory.clone(),
            self.config.mailbox_capacity,
        )?)
    }

    /// Bump `topic` on the node's publisher by the configured step.
    pub async fn increment(&self, topic: Topic) -> Result<u64, NodeError> {
        Ok(self
            .publisher
            .increment(topic, self.config.increment_step)
            .await?)
    }

    /// Run until SIGINT/SIGTERM or a programmatic shutdown.
    pub async fn start(&self) -> Result<(), NodeError> {
        info!(
            data_dir = %self.config.data_dir.display(),
            publisher = %self.publisher.id(),
            persist = self.config.persist_snapshots,
            "agora node started"
        );
        self.shutdown.wait_for_signal().await;
        Ok(())
    }

    /// Write both snapshots. A no-op when persistence is off.
    pub async fn persist(&self) -> Result<(), NodeError> {
        let Some(snapshots) = &self.snapshots else {
            return Ok(());
        };
        let engine = self.proposals.snapshot().await?;
        snapshots.save(PROPOSALS_FILE, &engine)?;
        let store = self.exams.snapshot().await?;
        snapshots.save(EXAMS_FILE, &store)?;
        info!(
            proposals = engine.get_proposal_count(),
            exams = store.exam_count(),
            "state persisted"
        );
        Ok(())
    }

    /// Persist state and release the counter services.
    pub async fn stop(&self) -> Result<(), NodeError> {
        info!("agora node stopping");
        self.shutdown.shutdown();
        let result = self.persist().await;
        if let Err(e) = &result {
            error!(error = %e, "failed to persist state");
        }
        self.directory.clear();
        result
    }
}
