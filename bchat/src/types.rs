//! Chat turn requests, replies, and the streaming wire contract.

use std::pin::Pin;

use bprovider::TokenUsage;
use btooling::ToolUsageRecord;
use futures_core::Stream;
use serde::{Deserialize, Serialize};

/// Reasoning style for one turn. `Think` takes a deliberate step-by-step
/// path through the tool loop; `Normal` is conversational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    #[default]
    Normal,
    Think,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Think => "think",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "think" => Self::Think,
            _ => Self::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurnRequest {
    pub prompt: String,
    pub mode: ChatMode,
    pub topic: String,
    pub session_name: String,
}

impl ChatTurnRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            mode: ChatMode::Normal,
            topic: String::new(),
            session_name: String::new(),
        }
    }

    pub fn with_mode(mut self, mode: ChatMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_session_name(mut self, session_name: impl Into<String>) -> Self {
        self.session_name = session_name.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub tool_usages: Vec<ToolUsageRecord>,
    pub usage: TokenUsage,
    pub time_response: f64,
}

/// Server-sent events for the streaming form. Fragments and errors echo the
/// turn's addressing fields; the terminal event carries the aggregates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnswerEvent {
    Fragment {
        content: String,
        topic: String,
        session_name: String,
        mode: ChatMode,
    },
    Error {
        error: String,
        topic: String,
        session_name: String,
        mode: ChatMode,
    },
    Done {
        tool_usages: Vec<ToolUsageRecord>,
        time_response: f64,
    },
}

impl AnswerEvent {
    pub fn fragment(content: impl Into<String>, request: &ChatTurnRequest) -> Self {
        Self::Fragment {
            content: content.into(),
            topic: request.topic.clone(),
            session_name: request.session_name.clone(),
            mode: request.mode,
        }
    }

    pub fn error(message: impl Into<String>, request: &ChatTurnRequest) -> Self {
        Self::Error {
            error: message.into(),
            topic: request.topic.clone(),
            session_name: request.session_name.clone(),
            mode: request.mode,
        }
    }
}

pub type AnswerStream<'a> = Pin<Box<dyn Stream<Item = AnswerEvent> + Send + 'a>>;
