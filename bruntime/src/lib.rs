//! Process-wide async plumbing: one scheduling loop, one pooled outbound
//! client, and blocking adapters so synchronous call sites can reach the
//! same async core as request handlers.

mod bridge;
mod error;
mod runtime;

pub mod prelude {
    pub use crate::{
        BlockingStream, HttpClientConfig, LoopDriver, RuntimeError, RuntimeErrorKind,
        SharedRuntime,
    };
}

pub use bridge::BlockingStream;
pub use error::{RuntimeError, RuntimeErrorKind};
pub use runtime::{HttpClientConfig, LoopDriver, SharedRuntime};
