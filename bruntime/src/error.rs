//! Runtime-layer errors for scheduling and pooled-client operations.

use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    Scheduler,
    Client,
    Worker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn scheduler(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::Scheduler, message)
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::Client, message)
    }

    pub fn worker(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::Worker, message)
    }
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for RuntimeError {}
