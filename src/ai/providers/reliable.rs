//! ReliableProvider — retry + fallback wrapper around any LLMProvider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::ai::provider::{LLMProvider, Result, StreamResponse};
use crate::ai::types::{CompletionRequest, CompletionResponse};

/// Wraps a primary provider with retry-with-exponential-backoff and an
/// optional ordered fallback chain.
pub struct ReliableProvider {
    primary: Arc<dyn LLMProvider>,
    fallbacks: Vec<Arc<dyn LLMProvider>>,
    max_retries: u32,
    base_delay: Duration,
}

impl ReliableProvider {
    /// Create a new `ReliableProvider` with the given primary provider.
    pub fn new(primary: Arc<dyn LLMProvider>) -> Self {
        Self {
            primary,
            fallbacks: vec![],
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }

    /// Set the retry configuration.
    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    /// Add a fallback provider tried after all retries on the primary fail.
    pub fn with_fallback(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.fallbacks.push(provider);
        self
    }
}

#[async_trait]
impl LLMProvider for ReliableProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        // Try primary with retries
        let mut last_err = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                tokio::time::sleep(delay).await;
            }
            match self.primary.complete(request.clone()).await {
                Ok(resp) => return Ok(resp),
                Err(e) => last_err = e,
            }
        }

        // Retries exhausted — try fallbacks
        for fallback in &self.fallbacks {
            match fallback.complete(request.clone()).await {
                Ok(resp) => return Ok(resp),
                Err(e) => last_err = e,
            }
        }

        Err(format!("All providers failed. Last error: {last_err}"))
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamResponse> {
        // Try primary with retries
        let mut last_err = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                tokio::time::sleep(delay).await;
            }
            match self.primary.stream(request.clone()).await {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = e,
            }
        }

        // Retries exhausted — try fallbacks
        for fallback in &self.fallbacks {
            match fallback.stream(request.clone()).await {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = e,
            }
        }

        Err(format!("All providers failed. Last error: {last_err}"))
    }

    /// Returns the minimum context limit across the primary provider and all
    /// fallbacks so that callers never submit requests that would exceed a
    /// fallback provider's capacity.
    fn context_limit(&self) -> usize {
        self.fallbacks
            .iter()
            .map(|f| f.context_limit())
            .fold(self.primary.context_limit(), |min, limit| min.min(limit))
    }

    /// Returns `true` only when every provider in the chain (primary and all
    /// fallbacks) supports tool use, ensuring that tool-based requests remain
    /// valid after a fallback switch.
    fn supports_tools(&self) -> bool {
        self.primary.supports_tools() && self.fallbacks.iter().all(|f| f.supports_tools())
    }

    fn provider_name(&self) -> &str {
        self.primary.provider_name()
    }

    async fn warmup(&self) -> Result<()> {
        // Warm up primary; log failures but don't propagate (provider may come online later)
        if let Err(e) = self.primary.warmup().await {
            log::warn!(
                "ReliableProvider warmup failed for {}: {e}",
                self.primary.provider_name()
            );
        }
        Ok(())
    }
}
