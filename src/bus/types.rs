//! Message bus records.
//!
//! Defines [`AgentMessage`] (a mailbox entry), [`MessageKind`], [`WisdomExchange`]
//! (the durable record of a `wisdom`/`pattern` message), and [`AgentLearning`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open key/value context attached to a message.
///
/// Well-known keys: `subject_id`, `element`, `elements`, `pattern_id`, `urgency`.
pub type MessageContext = Map<String, Value>;

/// What a message is for. `wisdom` and `pattern` messages are also persisted
/// as [`WisdomExchange`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Wisdom,
    Pattern,
    Request,
    Update,
    Broadcast,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wisdom => "wisdom",
            Self::Pattern => "pattern",
            Self::Request => "request",
            Self::Update => "update",
            Self::Broadcast => "broadcast",
        }
    }

    /// Whether sending this kind records a wisdom exchange.
    pub fn is_exchange(&self) -> bool {
        matches!(self, Self::Wisdom | Self::Pattern)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wisdom" => Ok(Self::Wisdom),
            "pattern" => Ok(Self::Pattern),
            "request" => Ok(Self::Request),
            "update" => Ok(Self::Update),
            "broadcast" => Ok(Self::Broadcast),
            _ => Err(format!("unknown message kind: {s}")),
        }
    }
}

/// A mailbox entry. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub from: String,
    pub to: String,
    pub kind: MessageKind,
    pub content: String,
    #[serde(default)]
    pub context: MessageContext,
    /// Stamped by the bus on `send` when absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl AgentMessage {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: MessageKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
            content: content.into(),
            context: MessageContext::new(),
            timestamp: None,
        }
    }

    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// String value of a context key, if present and a string.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        context_str(&self.context, key)
    }
}

/// A message before fan-out: everything but the recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub from: String,
    pub kind: MessageKind,
    pub content: String,
    #[serde(default)]
    pub context: MessageContext,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl OutboundMessage {
    pub fn new(from: impl Into<String>, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            kind,
            content: content.into(),
            context: MessageContext::new(),
            timestamp: None,
        }
    }

    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    /// Address a copy of this message to `to`.
    pub fn addressed_to(&self, to: &str) -> AgentMessage {
        AgentMessage {
            from: self.from.clone(),
            to: to.to_string(),
            kind: self.kind,
            content: self.content.clone(),
            context: self.context.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Durable record of one `wisdom` or `pattern` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WisdomExchange {
    /// UUID v7 primary key.
    pub id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub content: String,
    pub context: MessageContext,
    pub kind: MessageKind,
    /// Relevance to the recipient in `[0.0, 1.0]`.
    pub relevance: f64,
    pub applied_count: u32,
    pub created_at: DateTime<Utc>,
}

impl WisdomExchange {
    pub fn context_str(&self, key: &str) -> Option<&str> {
        context_str(&self.context, key)
    }
}

/// Category of an [`AgentLearning`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningKind {
    PatternRecognition,
    WisdomIntegration,
    UserFeedback,
    CollectiveInsight,
}

impl LearningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatternRecognition => "pattern_recognition",
            Self::WisdomIntegration => "wisdom_integration",
            Self::UserFeedback => "user_feedback",
            Self::CollectiveInsight => "collective_insight",
        }
    }
}

/// Something an agent learned, kept for evolution tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLearning {
    pub agent_name: String,
    pub kind: LearningKind,
    pub content: String,
    pub integration_successful: bool,
    #[serde(default)]
    pub impact: LearningImpact,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningImpact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_increase: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_satisfaction: Option<f64>,
}

/// What a recipient already knows, used to score incoming messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipientContext {
    pub element: Option<String>,
    /// Pattern ids the recipient has already received.
    pub patterns: Vec<String>,
    pub subject_id: Option<String>,
}

/// Filter context for [`super::MessageBus::relevant_wisdom`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WisdomQuery {
    pub element: Option<String>,
    pub pattern_id: Option<String>,
    pub subject_id: Option<String>,
}

/// A freshly promoted pattern, as announced to the other agents.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternDiscovery {
    pub discovered_by: String,
    pub pattern_id: String,
    pub elements: Vec<String>,
    pub wisdom: String,
    pub strength: f64,
}

pub(crate) fn context_str<'a>(context: &'a MessageContext, key: &str) -> Option<&'a str> {
    context.get(key).and_then(Value::as_str)
}

/// True when the context names `element`, either as `element` or inside `elements`.
pub(crate) fn context_mentions_element(context: &MessageContext, element: &str) -> bool {
    if context_str(context, "element") == Some(element) {
        return true;
    }
    context
        .get("elements")
        .and_then(Value::as_array)
        .is_some_and(|elements| elements.iter().any(|e| e.as_str() == Some(element)))
}
