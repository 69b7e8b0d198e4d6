use std::time::Duration;

use agora_governance::{Choice, ProposalDraft};
use agora_node::{AgoraNode, NodeConfig, NodeError};
use agora_records::ExamDraft;
use agora_types::{CallerId, ExamId, Topic};

fn config(dir: &std::path::Path) -> NodeConfig {
    NodeConfig {
        data_dir: dir.to_path_buf(),
        ..NodeConfig::default()
    }
}

fn caller(name: &str) -> CallerId {
    CallerId::new(name).unwrap()
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let node = AgoraNode::new(config(dir.path())).await.unwrap();
    let id = node
        .proposals
        .create_proposal(caller("alice"), ProposalDraft::new("Add feature X", true))
        .await
        .unwrap();
    node.proposals.vote(caller("bob"), id, Choice::Approve).await.unwrap();
    node.exams
        .insert_exam(ExamId::new(1), ExamDraft::new(100, "Math", 5))
        .await
        .unwrap();
    node.exams.insert_participation(ExamId::new(1), 42).await.unwrap();
    node.stop().await.unwrap();

    let node = AgoraNode::new(config(dir.path())).await.unwrap();
    let proposal = node.proposals.get_proposal(id).await.unwrap().unwrap();
    assert_eq!(proposal.approve, 1);
    assert!(proposal.has_voted(&caller("bob")));
    let exam = node.exams.get_exam(ExamId::new(1)).await.unwrap().unwrap();
    assert_eq!(exam.course, "Math");
    assert_eq!(
        node.exams.get_participation(ExamId::new(1)).await.unwrap(),
        Some(42)
    );

    // Service-assigned ids continue after the restored ones.
    let next = node
        .proposals
        .create_proposal(caller("alice"), ProposalDraft::new("next", true))
        .await
        .unwrap();
    assert_eq!(next.get(), id.get() + 1);
}

#[tokio::test]
async fn no_files_written_without_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let node = AgoraNode::new(NodeConfig {
        persist_snapshots: false,
        ..config(dir.path())
    })
    .await
    .unwrap();
    node.proposals
        .create_proposal(caller("alice"), ProposalDraft::new("x", true))
        .await
        .unwrap();
    node.stop().await.unwrap();
    assert!(!dir.path().join("proposals.bin").exists());
}

#[tokio::test]
async fn invalid_config_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let result = AgoraNode::new(NodeConfig {
        mailbox_capacity: 0,
        ..config(dir.path())
    })
    .await;
    assert!(matches!(result, Err(NodeError::Config(_))));
}

#[tokio::test]
async fn node_publisher_feeds_subscribers() {
    let dir = tempfile::tempdir().unwrap();
    let node = AgoraNode::new(config(dir.path())).await.unwrap();
    let topic = Topic::new("cpu").unwrap();
    let sub = node.spawn_subscriber(caller("dashboard")).unwrap();
    sub.setup_subscribe(node.publisher.id().clone(), topic.clone())
        .await
        .unwrap();

    assert_eq!(node.increment(topic.clone()).await.unwrap(), 5);
    assert_eq!(node.increment(topic.clone()).await.unwrap(), 10);

    let mut seen = 0;
    for _ in 0..100 {
        seen = sub.get_count().await.unwrap();
        if seen == 10 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(seen, 10);
    node.stop().await.unwrap();
}

#[tokio::test]
async fn start_returns_after_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let node = std::sync::Arc::new(AgoraNode::new(config(dir.path())).await.unwrap());
    let runner = {
        let node = node.clone();
        tokio::spawn(async move { node.start().await })
    };
    tokio::task::yield_now().await;
    node.shutdown.shutdown();
    tokio::time::timeout(Duration::from_secs(1), runner)
        .await
        .expect("start should return")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn stop_before_start_does_not_hang() {
    let dir = tempfile::tempdir().unwrap();
    let node = AgoraNode::new(config(dir.path())).await.unwrap();
    node.stop().await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), node.start())
        .await
        .expect("start should return after an earlier stop")
        .unwrap();
}
