mod helpers;

use agora::bus::types::{
    AgentLearning, AgentMessage, LearningImpact, LearningKind, MessageKind, OutboundMessage,
    RecipientContext, WisdomQuery,
};
use agora::bus::{relevance_score, MessageBus};
use agora::config::{AgentSpec, BusConfig};
use agora::error::Error;
use agora::store::WisdomStore;
use chrono::{Duration, Utc};
use helpers::{test_bus, test_store, FailingStore};
use std::sync::Arc;

#[tokio::test]
async fn mailbox_drains_in_send_order() {
    let bus = test_bus(&["A", "B"]);
    for content in ["first", "second", "third"] {
        bus.send(AgentMessage::new("A", "B", MessageKind::Update, content))
            .await
            .unwrap();
    }

    let drained: Vec<String> = bus.receive("B").into_iter().map(|m| m.content).collect();
    assert_eq!(drained, vec!["first", "second", "third"]);
    assert!(bus.receive("B").is_empty());
}

#[tokio::test]
async fn send_to_unknown_agent_fails() {
    let bus = test_bus(&["A", "B"]);
    let err = bus
        .send(AgentMessage::new("A", "Nobody", MessageKind::Wisdom, "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownRecipient(ref name) if name == "Nobody"));
    assert!(bus.receive("A").is_empty());
    assert!(bus.receive("B").is_empty());
}

#[tokio::test]
async fn receive_on_unknown_agent_is_empty() {
    let bus = test_bus(&["A"]);
    assert!(bus.receive("Nobody").is_empty());
}

#[tokio::test]
async fn existing_timestamp_is_kept() {
    let bus = test_bus(&["A", "B"]);
    let sent_at = Utc::now() - Duration::hours(2);
    bus.send(AgentMessage::new("A", "B", MessageKind::Update, "x").with_timestamp(sent_at))
        .await
        .unwrap();
    assert_eq!(bus.receive("B")[0].timestamp, Some(sent_at));
}

#[tokio::test]
async fn broadcast_skips_sender() {
    let bus = test_bus(&["X", "Y", "Z"]);
    let delivered = bus
        .broadcast(OutboundMessage::new("X", MessageKind::Update, "news"))
        .await
        .unwrap();

    assert_eq!(delivered, 2);
    assert!(bus.receive("X").is_empty());
    for agent in ["Y", "Z"] {
        let mail = bus.receive(agent);
        assert_eq!(mail.len(), 1);
        assert_eq!(mail[0].kind, MessageKind::Broadcast);
        assert_eq!(mail[0].from, "X");
    }
}

#[tokio::test]
async fn broadcast_ring_keeps_newest_hundred() {
    let bus = test_bus(&["A", "B"]);
    for i in 0..150 {
        bus.send(AgentMessage::new("A", "B", MessageKind::Broadcast, format!("b{i}")))
            .await
            .unwrap();
    }

    let ring = bus.broadcast_messages(usize::MAX);
    assert_eq!(ring.len(), 100);
    assert_eq!(ring.first().unwrap().content, "b50");
    assert_eq!(ring.last().unwrap().content, "b149");

    let recent: Vec<String> = bus
        .broadcast_messages(3)
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(recent, vec!["b147", "b148", "b149"]);
}

#[test]
fn relevance_stays_within_bounds() {
    let all_bonuses = AgentMessage::new("A", "B", MessageKind::Wisdom, "x")
        .with_context("element", "fire")
        .with_context("pattern_id", "p-1")
        .with_context("urgency", "high")
        .with_context("subject_id", "user-1");
    let recipient = RecipientContext {
        element: Some("fire".into()),
        patterns: vec!["p-1".into()],
        subject_id: Some("user-1".into()),
    };
    assert_eq!(relevance_score(&all_bonuses, &recipient), 1.0);

    let stale = AgentMessage::new("A", "B", MessageKind::Wisdom, "x")
        .with_timestamp(Utc::now() - Duration::days(3));
    let score = relevance_score(&stale, &RecipientContext::default());
    assert!((0.0..=1.0).contains(&score));
    assert!((score - 0.5).abs() < 1e-9);
}

fn persistent_bus(store: Arc<dyn WisdomStore>) -> MessageBus {
    let config = BusConfig {
        agents: vec![
            AgentSpec::new("FireAgent", Some("fire")),
            AgentSpec::new("WaterAgent", Some("water")),
        ],
        request_wisdom_delay_ms: 0,
        ..Default::default()
    };
    MessageBus::new(config, Some(store))
}

#[tokio::test]
async fn wisdom_exchanges_are_persisted_and_queried() {
    let store = test_store();
    let bus = persistent_bus(Arc::new(store.clone()));

    bus.send(
        AgentMessage::new("FireAgent", "WaterAgent", MessageKind::Wisdom, "soften the edges")
            .with_context("element", "water")
            .with_context("urgency", "high"),
    )
    .await
    .unwrap();
    bus.send(AgentMessage::new("FireAgent", "WaterAgent", MessageKind::Request, "not an exchange"))
        .await
        .unwrap();

    let stored = store.query_exchanges("WaterAgent", 0.0, 100).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!((stored[0].relevance - 0.9).abs() < 1e-9);

    let found = bus
        .relevant_wisdom(
            "WaterAgent",
            &WisdomQuery {
                element: Some("water".into()),
                ..Default::default()
            },
        )
        .await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].content, "soften the edges");

    assert!(bus.record_application(&found[0].id).await);
    let stored = store.query_exchanges("WaterAgent", 0.0, 100).await.unwrap();
    assert_eq!(stored[0].applied_count, 1);
}

#[tokio::test]
async fn store_outage_does_not_block_delivery() {
    let failing = Arc::new(FailingStore::default());
    let bus = persistent_bus(failing.clone());

    bus.send(
        AgentMessage::new("FireAgent", "WaterAgent", MessageKind::Wisdom, "keep going")
            .with_context("element", "water"),
    )
    .await
    .unwrap();

    assert_eq!(bus.receive("WaterAgent").len(), 1);
    assert_eq!(bus.local_wisdom("WaterAgent").len(), 1);
    assert_eq!(failing.calls(), 1);

    // falls back to the in-memory wisdom list
    let found = bus
        .relevant_wisdom(
            "WaterAgent",
            &WisdomQuery {
                element: Some("water".into()),
                ..Default::default()
            },
        )
        .await;
    assert_eq!(found.len(), 1);

    bus.log_learning(&AgentLearning {
        agent_name: "WaterAgent".into(),
        kind: LearningKind::UserFeedback,
        content: "user found it grounding".into(),
        integration_successful: true,
        impact: LearningImpact::default(),
    })
    .await;
}

#[tokio::test]
async fn request_wisdom_broadcasts_then_answers() {
    let store = test_store();
    let bus = persistent_bus(Arc::new(store));

    bus.send(
        AgentMessage::new("WaterAgent", "FireAgent", MessageKind::Pattern, "pattern found")
            .with_context("pattern_id", "p-9")
            .with_context("element", "fire"),
    )
    .await
    .unwrap();

    let found = bus
        .request_wisdom(
            "FireAgent",
            "burnout",
            &WisdomQuery {
                pattern_id: Some("p-9".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    let water_mail = bus.receive("WaterAgent");
    assert_eq!(water_mail.len(), 1);
    assert_eq!(water_mail[0].kind, MessageKind::Broadcast);
    assert_eq!(water_mail[0].context_str("topic"), Some("burnout"));
}

#[tokio::test]
async fn known_patterns_raise_relevance_of_repeat_news() {
    let bus = MessageBus::new(
        BusConfig {
            agents: vec![AgentSpec::new("A", None), AgentSpec::new("B", None)],
            ..Default::default()
        },
        None,
    );
    let pattern_msg = || {
        AgentMessage::new("A", "B", MessageKind::Pattern, "p").with_context("pattern_id", "p-1")
    };
    bus.send(pattern_msg()).await.unwrap();
    bus.send(pattern_msg()).await.unwrap();

    let wisdom = bus.local_wisdom("B");
    assert!((wisdom[0].relevance - 0.6).abs() < 1e-9);
    assert!((wisdom[1].relevance - 0.8).abs() < 1e-9);
}
