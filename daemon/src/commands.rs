//! One-shot commands. Each returns the JSON printed on stdout.

use std::time::Duration;

use agora_governance::ProposalDraft;
use agora_node::AgoraNode;
use agora_pubsub::Counter;
use agora_records::ExamDraft;
use agora_types::CallerId;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::{CounterAction, ExamAction, ParticipationAction, ProposalAction};

/// How long the counter demo waits for subscribers to catch up.
const CONVERGE_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn proposal(node: &AgoraNode, action: ProposalAction) -> anyhow::Result<Value> {
    let proposals = &node.proposals;
    Ok(match action {
        ProposalAction::Create {
            caller,
            description,
            inactive,
        } => {
            let id = proposals
                .create_proposal(caller, ProposalDraft::new(description, !inactive))
                .await?;
            json!({ "id": id })
        }
        ProposalAction::Put {
            caller,
            id,
            description,
            inactive,
        } => {
            let previous = proposals
                .put_proposal(caller, id, ProposalDraft::new(description, !inactive))
                .await?;
            json!({ "id": id, "previous": previous })
        }
        ProposalAction::Show { id } => json!(proposals.get_proposal(id).await?),
        ProposalAction::List { active } => {
            let list = if active {
                proposals.list_active().await?
            } else {
                proposals.list_proposals().await?
            };
            let entries: Vec<Value> = list
                .into_iter()
                .map(|(id, proposal)| json!({ "id": id, "proposal": proposal }))
                .collect();
            json!({ "count": proposals.get_proposal_count().await?, "proposals": entries })
        }
        ProposalAction::Edit {
            caller,
            id,
            description,
            inactive,
        } => {
            proposals
                .edit_proposal(caller, id, ProposalDraft::new(description, !inactive))
                .await?;
            json!({ "id": id, "edited": true })
        }
        ProposalAction::Vote { caller, id, choice } => {
            proposals.vote(caller, id, choice).await?;
            json!({ "id": id, "tally": proposals.tally(id).await? })
        }
        ProposalAction::End { caller, id } => {
            proposals.end_proposal(caller, id).await?;
            json!({ "id": id, "closed": true })
        }
        ProposalAction::Tally { id } => match proposals.tally(id).await? {
            Some(tally) => json!({
                "id": id,
                "tally": tally,
                "total": tally.total(),
                "leading": tally.leading().map(|c| c.to_string()),
            }),
            None => Value::Null,
        },
    })
}

pub async fn exam(node: &AgoraNode, action: ExamAction) -> anyhow::Result<Value> {
    Ok(match action {
        ExamAction::Insert {
            id,
            out_of,
            course,
            curve,
        } => {
            let previous = node
                .exams
                .insert_exam(id, ExamDraft::new(out_of, course, curve))
                .await?;
            json!({ "id": id, "previous": previous })
        }
        ExamAction::Show { id } => json!(node.exams.get_exam(id).await?),
    })
}

pub async fn participation(node: &AgoraNode, action: ParticipationAction) -> anyhow::Result<Value> {
    Ok(match action {
        ParticipationAction::Set { id, value } => {
            let previous = node.exams.insert_participation(id, value).await?;
            json!({ "id": id, "value": value, "previous": previous })
        }
        ParticipationAction::Show { id } => json!(node.exams.get_participation(id).await?),
    })
}

pub async fn counter(node: &AgoraNode, action: CounterAction) -> anyhow::Result<Value> {
    let CounterAction::Demo {
        topic,
        value,
        subscribers,
        increments,
    } = action;

    let publisher = node.publisher.id().clone();
    let mut handles = Vec::with_capacity(subscribers);
    for n in 0..subscribers {
        let sub = node.spawn_subscriber(CallerId::new(format!("subscriber-{n}"))?)?;
        sub.setup_subscribe(publisher.clone(), topic.clone()).await?;
        handles.push(sub);
    }

    if let Some(value) = value {
        let cli = CallerId::new("cli")?;
        node.publisher
            .update_count(&cli, Counter::report(topic.clone(), value))
            .await?;
    }
    for _ in 0..increments {
        node.increment(topic.clone()).await?;
    }
    let expected = node.publisher.get_count(topic.clone()).await?;

    let deadline = Instant::now() + CONVERGE_TIMEOUT;
    let counts = loop {
        let mut counts = Vec::with_capacity(handles.len());
        for sub in &handles {
            counts.push(sub.get_topic_count(topic.clone()).await?);
        }
        if counts.iter().all(|c| *c == expected) || Instant::now() >= deadline {
            break counts;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };

    let converged = counts.iter().all(|c| *c == expected);
    if !converged {
        tracing::warn!(%topic, "subscribers did not converge before the deadline");
    }
    let subscribers: Vec<Value> = handles
        .iter()
        .zip(&counts)
        .map(|(sub, count)| json!({ "id": sub.id(), "count": count }))
        .collect();
    Ok(json!({
        "topic": topic.to_string(),
        "publisher": {
            "id": publisher,
            "count": expected,
            "delivered": node.publisher.stats().delivered(),
            "failed": node.publisher.stats().failed(),
        },
        "subscribers": subscribers,
        "converged": converged,
    }))
}
