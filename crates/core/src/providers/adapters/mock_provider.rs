//! Mock provider implementation for testing.

use crate::providers::base::{ModelError, ModelProvider, ModelRequest, ModelResponse};
use async_trait::async_trait;
use sk_protocol::run_models::TokenUsage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

type Responder = Arc<dyn Fn(&ModelRequest) -> Result<String, ModelError> + Send + Sync>;

#[derive(Clone)]
enum Behavior {
    Echo,
    Fixed(String),
    Scripted(Arc<Mutex<VecDeque<Result<String, ModelError>>>>),
    Respond(Responder),
    Failing(ModelError),
}

/// In-process model provider with scripted behaviour.
///
/// Cloning shares the call counter and recorded prompts.
#[derive(Clone)]
pub struct MockProvider {
    available: bool,
    behavior: Behavior,
    delay: Option<Duration>,
    usage: Option<TokenUsage>,
    cost: Option<f64>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            available: true,
            behavior,
            delay: None,
            usage: None,
            cost: None,
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns every prompt unchanged.
    pub fn echo() -> Self {
        Self::with_behavior(Behavior::Echo)
    }

    /// Returns the same text for every call.
    pub fn fixed(text: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Fixed(text.into()))
    }

    /// Returns the given results in order; fails once they run out.
    pub fn scripted(responses: Vec<Result<String, ModelError>>) -> Self {
        Self::with_behavior(Behavior::Scripted(Arc::new(Mutex::new(responses.into()))))
    }

    /// Computes each response from the request.
    pub fn responding<F>(respond: F) -> Self
    where
        F: Fn(&ModelRequest) -> Result<String, ModelError> + Send + Sync + 'static,
    {
        Self::with_behavior(Behavior::Respond(Arc::new(respond)))
    }

    /// Fails every call with a provider error.
    pub fn failing() -> Self {
        Self::with_behavior(Behavior::Failing(ModelError::ProviderError(
            "Mock failure".to_string(),
        )))
    }

    pub fn failing_with(error: ModelError) -> Self {
        Self::with_behavior(Behavior::Failing(error))
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::echo()
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report fixed accounting figures with every response.
    pub fn with_usage(mut self, usage: TokenUsage, cost: f64) -> Self {
        self.usage = Some(usage);
        self.cost = Some(cost);
        self
    }

    /// Number of calls answered or failed so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, in arrival order.
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn check_availability(&self) -> bool {
        self.available
    }

    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        if !self.available {
            return Err(ModelError::NotAvailable("Mock provider not available".to_string()));
        }

        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().await.push(request.prompt.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let text = match &self.behavior {
            Behavior::Echo => Ok(request.prompt.clone()),
            Behavior::Fixed(text) => Ok(text.clone()),
            Behavior::Scripted(queue) => queue.lock().await.pop_front().unwrap_or_else(|| {
                Err(ModelError::ProviderError("Mock script exhausted".to_string()))
            }),
            Behavior::Respond(respond) => respond(request),
            Behavior::Failing(error) => Err(error.clone()),
        }?;

        Ok(ModelResponse {
            text,
            token_usage: self.usage,
            cost_estimate: self.cost,
        })
    }
}
