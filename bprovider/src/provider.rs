//! Provider trait contract: one-shot completion, incremental completion,
//! and text embedding.

use std::future::Future;
use std::pin::Pin;

use crate::{BoxedEventStream, ModelRequest, ModelResponse, ProviderError, ProviderId};

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Dimensionality of the primary embedding model. A vector of exactly this
/// many zeros means "no semantic signal", never an error.
pub const EMBEDDING_DIMENSIONS: usize = 3072;

pub fn zero_embedding() -> Vec<f32> {
    vec![0.0; EMBEDDING_DIMENSIONS]
}

pub fn is_zero_embedding(vector: &[f32]) -> bool {
    vector.iter().all(|value| *value == 0.0)
}

pub trait ModelProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn complete<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>>;

    fn stream<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>>;

    fn embed<'a>(
        &'a self,
        text: String,
    ) -> ProviderFuture<'a, Result<Vec<f32>, ProviderError>>;
}
