//! Prometheus metrics for the agora node.
//!
//! [`NodeMetrics`] owns a dedicated [`Registry`]; [`NodeMetrics::render`]
//! encodes it in the Prometheus text exposition format.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, IntCounter,
    IntGauge, Opts, Registry, TextEncoder,
};

/// Service-level counters and gauges.
pub struct NodeMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    pub proposals_created: IntCounter,
    pub votes_accepted: IntCounter,
    /// Votes refused (closed, duplicate, unknown proposal).
    pub votes_rejected: IntCounter,
    pub exams_inserted: IntCounter,
    /// Exam writes refused for out-of-range fields.
    pub exam_inserts_rejected: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub proposal_count: IntGauge,
    pub exam_count: IntGauge,
}

impl NodeMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let proposals_created = register_int_counter_with_registry!(
            Opts::new("agora_proposals_created_total", "Proposals created"),
            registry
        )
        .expect("failed to register proposals_created counter");

        let votes_accepted = register_int_counter_with_registry!(
            Opts::new("agora_votes_accepted_total", "Votes recorded"),
            registry
        )
        .expect("failed to register votes_accepted counter");

        let votes_rejected = register_int_counter_with_registry!(
            Opts::new("agora_votes_rejected_total", "Votes refused"),
            registry
        )
        .expect("failed to register votes_rejected counter");

        let exams_inserted = register_int_counter_with_registry!(
            Opts::new("agora_exams_inserted_total", "Exam records written"),
            registry
        )
        .expect("failed to register exams_inserted counter");

        let exam_inserts_rejected = register_int_counter_with_registry!(
            Opts::new(
                "agora_exam_inserts_rejected_total",
                "Exam writes refused for out-of-range fields"
            ),
            registry
        )
        .expect("failed to register exam_inserts_rejected counter");

        let proposal_count = register_int_gauge_with_registry!(
            Opts::new("agora_proposal_count", "Stored proposals"),
            registry
        )
        .expect("failed to register proposal_count gauge");

        let exam_count = register_int_gauge_with_registry!(
            Opts::new("agora_exam_count", "Stored exam records"),
            registry
        )
        .expect("failed to register exam_count gauge");

        Self {
            registry,
            proposals_created,
            votes_accepted,
            votes_rejected,
            exams_inserted,
            exam_inserts_rejected,
            proposal_count,
            exam_count,
        }
    }

    /// Encode every metric in the text exposition format.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
            tracing::warn!("metrics encoding failed: {e}");
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
