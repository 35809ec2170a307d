//! Agent message bus.
//!
//! Per-agent FIFO mailboxes, fan-out broadcast, a capped broadcast ring, and
//! wisdom exchange records. Mailbox operations are in-memory and never wait on
//! storage; only recording and querying wisdom exchanges touches the durable
//! [`WisdomStore`], and failures there are logged without affecting delivery.

pub mod relevance;
pub mod types;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

pub use relevance::relevance_score;
use types::{
    context_mentions_element, AgentLearning, AgentMessage, MessageKind, OutboundMessage,
    PatternDiscovery, RecipientContext, WisdomExchange, WisdomQuery,
};

use crate::config::BusConfig;
use crate::error::{Error, Result};
use crate::store::WisdomStore;

/// Maximum number of exchanges returned by [`MessageBus::relevant_wisdom`].
const RELEVANT_WISDOM_LIMIT: usize = 10;

/// Upper bound on stored exchanges scanned per [`MessageBus::relevant_wisdom`] call.
const EXCHANGE_SCAN_LIMIT: usize = RELEVANT_WISDOM_LIMIT * 20;

/// Exchanges above this relevance match any query context.
const GENERAL_RELEVANCE: f64 = 0.8;

/// Strength above which a discovery is also announced on the broadcast ring.
const SIGNIFICANT_STRENGTH: f64 = 0.85;

/// Strength above which a discovery is sent with high urgency.
const URGENT_STRENGTH: f64 = 0.8;

struct AgentSlot {
    element: Option<String>,
    mailbox: VecDeque<AgentMessage>,
    wisdom: VecDeque<WisdomExchange>,
}

impl AgentSlot {
    fn new(element: Option<String>) -> Self {
        Self {
            element,
            mailbox: VecDeque::new(),
            wisdom: VecDeque::new(),
        }
    }

    fn recipient_context(&self) -> RecipientContext {
        RecipientContext {
            element: self.element.clone(),
            patterns: self
                .wisdom
                .iter()
                .filter_map(|w| w.context_str("pattern_id").map(str::to_string))
                .collect(),
            subject_id: None,
        }
    }
}

#[derive(Default)]
struct BusState {
    agents: BTreeMap<String, AgentSlot>,
    broadcasts: VecDeque<AgentMessage>,
}

/// Mailbox-and-broadcast bus shared by every agent in the process.
pub struct MessageBus {
    config: BusConfig,
    wisdom_store: Option<Arc<dyn WisdomStore>>,
    state: Mutex<BusState>,
}

impl MessageBus {
    /// Build a bus with the configured agents registered.
    pub fn new(config: BusConfig, wisdom_store: Option<Arc<dyn WisdomStore>>) -> Self {
        let mut state = BusState::default();
        for agent in &config.agents {
            state
                .agents
                .insert(agent.name.clone(), AgentSlot::new(agent.element.clone()));
        }
        Self {
            config,
            wisdom_store,
            state: Mutex::new(state),
        }
    }

    /// Register a mailbox at runtime. Returns `false` if the agent already exists.
    pub fn register_agent(&self, name: &str, element: Option<&str>) -> bool {
        let mut state = self.state.lock();
        if state.agents.contains_key(name) {
            return false;
        }
        state
            .agents
            .insert(name.to_string(), AgentSlot::new(element.map(str::to_string)));
        tracing::info!(agent = %name, "agent registered");
        true
    }

    /// Names of all registered agents.
    pub fn agents(&self) -> Vec<String> {
        self.state.lock().agents.keys().cloned().collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.state.lock().agents.contains_key(name)
    }

    /// Deliver a message to its recipient's mailbox.
    ///
    /// Fails with [`Error::UnknownRecipient`] before anything is enqueued if the
    /// recipient has no mailbox. `wisdom` and `pattern` messages also create a
    /// [`WisdomExchange`]; `broadcast` messages are copied into the broadcast ring.
    pub async fn send(&self, mut message: AgentMessage) -> Result<()> {
        message.timestamp.get_or_insert_with(Utc::now);

        let recipient = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(slot) = state.agents.get_mut(&message.to) else {
                tracing::warn!(from = %message.from, to = %message.to, "send to unknown agent");
                return Err(Error::UnknownRecipient(message.to));
            };
            slot.mailbox.push_back(message.clone());
            let recipient = message.kind.is_exchange().then(|| slot.recipient_context());

            if message.kind == MessageKind::Broadcast {
                state.broadcasts.push_back(message.clone());
                while state.broadcasts.len() > self.config.broadcast_capacity {
                    state.broadcasts.pop_front();
                }
            }
            recipient
        };

        tracing::debug!(
            from = %message.from,
            to = %message.to,
            kind = %message.kind,
            "agent message sent"
        );

        if let Some(recipient) = recipient {
            self.record_exchange(&message, &recipient).await;
        }
        Ok(())
    }

    /// Drain and return an agent's mailbox in arrival order.
    ///
    /// Unknown agents have nothing pending and get an empty list.
    pub fn receive(&self, agent: &str) -> Vec<AgentMessage> {
        let mut state = self.state.lock();
        state
            .agents
            .get_mut(agent)
            .map(|slot| slot.mailbox.drain(..).collect())
            .unwrap_or_default()
    }

    /// Send `message` to every agent except its sender, tagged `broadcast`.
    /// Returns the number of recipients.
    pub async fn broadcast(&self, message: OutboundMessage) -> Result<usize> {
        self.fan_out(message, MessageKind::Broadcast).await
    }

    async fn fan_out(&self, mut message: OutboundMessage, kind: MessageKind) -> Result<usize> {
        message.kind = kind;
        message.timestamp.get_or_insert_with(Utc::now);

        let targets: Vec<String> = self
            .agents()
            .into_iter()
            .filter(|agent| *agent != message.from)
            .collect();

        for target in &targets {
            self.send(message.addressed_to(target)).await?;
        }
        Ok(targets.len())
    }

    /// The most recent `limit` entries of the broadcast ring, oldest first.
    pub fn broadcast_messages(&self, limit: usize) -> Vec<AgentMessage> {
        let state = self.state.lock();
        let skip = state.broadcasts.len().saturating_sub(limit);
        state.broadcasts.iter().skip(skip).cloned().collect()
    }

    /// Wisdom addressed to `agent` that is relevant to `query`, most relevant first.
    ///
    /// Reads the durable store; if it is missing or unreachable the in-memory
    /// wisdom list stands in.
    pub async fn relevant_wisdom(&self, agent: &str, query: &WisdomQuery) -> Vec<WisdomExchange> {
        let threshold = self.config.relevance_threshold;
        let stored = match &self.wisdom_store {
            Some(store) => match store.query_exchanges(agent, threshold, EXCHANGE_SCAN_LIMIT).await {
                Ok(exchanges) => Some(exchanges),
                Err(e) => {
                    tracing::warn!(agent = %agent, error = %e, "wisdom store unavailable, using local wisdom");
                    None
                }
            },
            None => None,
        };
        let candidates = stored.unwrap_or_else(|| {
            self.local_wisdom(agent)
                .into_iter()
                .filter(|w| w.relevance >= threshold)
                .collect()
        });

        let mut relevant: Vec<WisdomExchange> = candidates
            .into_iter()
            .filter(|w| matches_query(w, query))
            .collect();
        relevant.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        relevant.truncate(RELEVANT_WISDOM_LIMIT);
        relevant
    }

    /// In-memory wisdom received by `agent`, oldest first.
    pub fn local_wisdom(&self, agent: &str) -> Vec<WisdomExchange> {
        let state = self.state.lock();
        state
            .agents
            .get(agent)
            .map(|slot| slot.wisdom.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Announce a promoted pattern to every other agent as a `pattern` message.
    /// Significant discoveries are broadcast as well.
    pub async fn share_pattern_discovery(&self, discovery: &PatternDiscovery) -> Result<usize> {
        let urgency = if discovery.strength > URGENT_STRENGTH {
            "high"
        } else {
            "medium"
        };
        let announcement = OutboundMessage::new(
            &discovery.discovered_by,
            MessageKind::Pattern,
            format!("New pattern discovered: {}", discovery.wisdom),
        )
        .with_context("pattern_id", discovery.pattern_id.as_str())
        .with_context("elements", json!(discovery.elements))
        .with_context("strength", discovery.strength)
        .with_context("urgency", urgency);

        let delivered = self.fan_out(announcement, MessageKind::Pattern).await?;

        if discovery.strength > SIGNIFICANT_STRENGTH {
            let significant = OutboundMessage::new(
                &discovery.discovered_by,
                MessageKind::Broadcast,
                format!("Significant pattern discovered: {}", discovery.wisdom),
            )
            .with_context("pattern_id", discovery.pattern_id.as_str())
            .with_context("elements", json!(discovery.elements))
            .with_context("strength", discovery.strength);
            self.broadcast(significant).await?;
        }

        tracing::info!(
            pattern_id = %discovery.pattern_id,
            discovered_by = %discovery.discovered_by,
            recipients = delivered,
            "pattern discovery shared"
        );
        Ok(delivered)
    }

    /// Ask every other agent for wisdom on `topic`, give them a moment to
    /// react, then return what is relevant to the requester.
    pub async fn request_wisdom(
        &self,
        requester: &str,
        topic: &str,
        query: &WisdomQuery,
    ) -> Result<Vec<WisdomExchange>> {
        let mut request = OutboundMessage::new(
            requester,
            MessageKind::Request,
            format!("Requesting wisdom on: {topic}"),
        )
        .with_context("topic", topic)
        .with_context("urgency", "medium");
        if let Some(element) = &query.element {
            request = request.with_context("element", element.as_str());
        }
        if let Some(pattern_id) = &query.pattern_id {
            request = request.with_context("pattern_id", pattern_id.as_str());
        }
        if let Some(subject_id) = &query.subject_id {
            request = request.with_context("subject_id", subject_id.as_str());
        }

        self.broadcast(request).await?;
        tokio::time::sleep(Duration::from_millis(self.config.request_wisdom_delay_ms)).await;
        Ok(self.relevant_wisdom(requester, query).await)
    }

    /// Tell every other agent that `agent` learned a new capability.
    pub async fn update_agent_capabilities(&self, agent: &str, capability: &str) -> Result<usize> {
        let update = OutboundMessage::new(
            agent,
            MessageKind::Update,
            format!("Agent {agent} has learned: {capability}"),
        )
        .with_context("capability", capability);
        self.broadcast(update).await
    }

    /// Persist a learning record. Best-effort.
    pub async fn log_learning(&self, learning: &AgentLearning) {
        let Some(store) = &self.wisdom_store else {
            return;
        };
        match store.insert_learning(learning).await {
            Ok(()) => tracing::info!(
                agent = %learning.agent_name,
                kind = learning.kind.as_str(),
                success = learning.integration_successful,
                "agent learning logged"
            ),
            Err(e) => tracing::warn!(agent = %learning.agent_name, error = %e, "failed to log agent learning"),
        }
    }

    /// Count one application of a wisdom exchange. Returns `false` if no such
    /// exchange is known locally or durably.
    pub async fn record_application(&self, exchange_id: &str) -> bool {
        let local = {
            let mut state = self.state.lock();
            let mut found = false;
            for slot in state.agents.values_mut() {
                if let Some(w) = slot.wisdom.iter_mut().find(|w| w.id == exchange_id) {
                    w.applied_count += 1;
                    found = true;
                    break;
                }
            }
            found
        };

        let durable = match &self.wisdom_store {
            Some(store) => match store.increment_applied(exchange_id).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(exchange_id = %exchange_id, error = %e, "failed to record wisdom application");
                    false
                }
            },
            None => false,
        };
        local || durable
    }

    /// Create the exchange record for a delivered `wisdom`/`pattern` message.
    async fn record_exchange(&self, message: &AgentMessage, recipient: &RecipientContext) {
        let exchange = WisdomExchange {
            id: uuid::Uuid::now_v7().to_string(),
            from_agent: message.from.clone(),
            to_agent: message.to.clone(),
            content: message.content.clone(),
            context: message.context.clone(),
            kind: message.kind,
            relevance: relevance_score(message, recipient),
            applied_count: 0,
            created_at: message.timestamp.unwrap_or_else(Utc::now),
        };

        {
            let mut state = self.state.lock();
            if let Some(slot) = state.agents.get_mut(&message.to) {
                slot.wisdom.push_back(exchange.clone());
                while slot.wisdom.len() > self.config.wisdom_history {
                    slot.wisdom.pop_front();
                }
            }
        }

        if let Some(store) = &self.wisdom_store {
            if let Err(e) = store.insert_exchange(&exchange).await {
                tracing::warn!(
                    exchange_id = %exchange.id,
                    to = %exchange.to_agent,
                    error = %e,
                    "failed to persist wisdom exchange"
                );
            }
        }
    }
}

fn matches_query(wisdom: &WisdomExchange, query: &WisdomQuery) -> bool {
    if let Some(element) = query.element.as_deref() {
        if context_mentions_element(&wisdom.context, element) {
            return true;
        }
    }
    if let Some(pattern_id) = query.pattern_id.as_deref() {
        if wisdom.context_str("pattern_id") == Some(pattern_id) {
            return true;
        }
    }
    if let Some(subject_id) = query.subject_id.as_deref() {
        if wisdom.context_str("subject_id") == Some(subject_id) {
            return true;
        }
    }
    wisdom.relevance > GENERAL_RELEVANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentSpec;

    fn bus() -> MessageBus {
        let config = BusConfig {
            agents: vec![
                AgentSpec::new("FireAgent", Some("fire")),
                AgentSpec::new("WaterAgent", Some("water")),
                AgentSpec::new("MainOracleAgent", None),
            ],
            request_wisdom_delay_ms: 0,
            ..Default::default()
        };
        MessageBus::new(config, None)
    }

    #[tokio::test]
    async fn send_stamps_missing_timestamp() {
        let bus = bus();
        bus.send(AgentMessage::new("FireAgent", "WaterAgent", MessageKind::Update, "hello"))
            .await
            .unwrap();
        let received = bus.receive("WaterAgent");
        assert!(received[0].timestamp.is_some());
    }

    #[tokio::test]
    async fn unknown_recipient_enqueues_nothing() {
        let bus = bus();
        let err = bus
            .send(AgentMessage::new("FireAgent", "GhostAgent", MessageKind::Wisdom, "boo"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownRecipient(name) if name == "GhostAgent"));
        for agent in bus.agents() {
            assert!(bus.receive(&agent).is_empty());
            assert!(bus.local_wisdom(&agent).is_empty());
        }
    }

    #[tokio::test]
    async fn wisdom_messages_are_scored_against_recipient() {
        let bus = bus();
        bus.send(
            AgentMessage::new("FireAgent", "WaterAgent", MessageKind::Wisdom, "stay with it")
                .with_context("element", "water"),
        )
        .await
        .unwrap();
        bus.send(AgentMessage::new("WaterAgent", "FireAgent", MessageKind::Request, "help"))
            .await
            .unwrap();

        let water = bus.local_wisdom("WaterAgent");
        assert_eq!(water.len(), 1);
        // base + element + recency
        assert!((water[0].relevance - 0.8).abs() < 1e-9);
        assert!(bus.local_wisdom("FireAgent").is_empty());
    }

    #[tokio::test]
    async fn relevant_wisdom_falls_back_to_local_list() {
        let bus = bus();
        bus.send(
            AgentMessage::new("FireAgent", "WaterAgent", MessageKind::Wisdom, "relevant")
                .with_context("element", "water"),
        )
        .await
        .unwrap();
        bus.send(AgentMessage::new("FireAgent", "WaterAgent", MessageKind::Wisdom, "generic"))
            .await
            .unwrap();

        let query = WisdomQuery {
            element: Some("water".into()),
            ..Default::default()
        };
        let found = bus.relevant_wisdom("WaterAgent", &query).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].content, "relevant");
    }

    #[tokio::test]
    async fn local_wisdom_history_is_bounded() {
        let config = BusConfig {
            agents: vec![AgentSpec::new("A", None), AgentSpec::new("B", None)],
            wisdom_history: 3,
            ..Default::default()
        };
        let bus = MessageBus::new(config, None);
        for i in 0..5 {
            bus.send(AgentMessage::new("A", "B", MessageKind::Wisdom, format!("w{i}")))
                .await
                .unwrap();
        }
        let contents: Vec<String> = bus.local_wisdom("B").into_iter().map(|w| w.content).collect();
        assert_eq!(contents, vec!["w2", "w3", "w4"]);
    }

    #[tokio::test]
    async fn record_application_updates_local_copy() {
        let bus = bus();
        bus.send(AgentMessage::new("FireAgent", "WaterAgent", MessageKind::Wisdom, "x"))
            .await
            .unwrap();
        let id = bus.local_wisdom("WaterAgent")[0].id.clone();

        assert!(bus.record_application(&id).await);
        assert_eq!(bus.local_wisdom("WaterAgent")[0].applied_count, 1);
        assert!(!bus.record_application("missing").await);
    }

    #[tokio::test]
    async fn register_agent_adds_mailbox_once() {
        let bus = bus();
        assert!(bus.register_agent("ShadowAgent", Some("shadow")));
        assert!(!bus.register_agent("ShadowAgent", None));
        bus.send(AgentMessage::new("FireAgent", "ShadowAgent", MessageKind::Update, "hi"))
            .await
            .unwrap();
        assert_eq!(bus.receive("ShadowAgent").len(), 1);
    }

    #[tokio::test]
    async fn update_capabilities_reaches_others() {
        let bus = bus();
        let delivered = bus
            .update_agent_capabilities("FireAgent", "breathwork pacing")
            .await
            .unwrap();
        assert_eq!(delivered, 2);
        let msgs = bus.receive("WaterAgent");
        assert_eq!(msgs[0].kind, MessageKind::Broadcast);
        assert_eq!(msgs[0].context_str("capability"), Some("breathwork pacing"));
        assert!(bus.receive("FireAgent").is_empty());
    }

    #[tokio::test]
    async fn significant_discovery_is_also_broadcast() {
        let bus = bus();
        let discovery = PatternDiscovery {
            discovered_by: "PatternEngine".into(),
            pattern_id: "p-1".into(),
            elements: vec!["fire".into(), "water".into()],
            wisdom: "the key is balance".into(),
            strength: 0.9,
        };
        let delivered = bus.share_pattern_discovery(&discovery).await.unwrap();
        assert_eq!(delivered, 3);

        let fire = bus.receive("FireAgent");
        let kinds: Vec<MessageKind> = fire.iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![MessageKind::Pattern, MessageKind::Broadcast]);
        assert_eq!(fire[0].context_str("urgency"), Some("high"));
        assert_eq!(bus.broadcast_messages(10).len(), 3);
    }
}
