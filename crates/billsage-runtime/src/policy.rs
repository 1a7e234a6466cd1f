//! Timeout and retry policy applied to every external call.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use billsage_chat::{ChatError, CompletionClient, CompletionRequest};
use billsage_core::{CallPolicy, Error, Result};
use tracing::warn;

/// Run `call` under `policy`: each attempt is bounded by the timeout, and
/// transient failures (network, non-2xx, timeout) are retried up to
/// `policy.retries` times. Other errors return immediately.
pub async fn call_with_policy<T, E, F, Fut>(policy: &CallPolicy, label: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<Error>,
{
    let attempts = policy.retries.saturating_add(1);
    let mut last_error = Error::Internal(format!("{}: no attempt made", label));

    for attempt in 1..=attempts {
        let error = match tokio::time::timeout(policy.timeout(), call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e.into(),
            Err(_) => Error::Timeout(policy.timeout_secs),
        };

        if !error.is_transient() {
            return Err(error);
        }
        if attempt < attempts {
            warn!("{} attempt {}/{} failed: {}; retrying", label, attempt, attempts, error);
        }
        last_error = error;
    }

    Err(last_error)
}

/// Applies a [`CallPolicy`] to another completion client.
pub struct PolicyCompletionClient {
    inner: Arc<dyn CompletionClient>,
    policy: CallPolicy,
}

impl PolicyCompletionClient {
    pub fn new(inner: Arc<dyn CompletionClient>, policy: CallPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl CompletionClient for PolicyCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> std::result::Result<String, ChatError> {
        let attempts = self.policy.retries.saturating_add(1);
        let mut last_error = ChatError::Request("no attempt made".into());

        for attempt in 1..=attempts {
            let error = match tokio::time::timeout(
                self.policy.timeout(),
                self.inner.complete(request.clone()),
            )
            .await
            {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e @ ChatError::NotConfigured)) | Ok(Err(e @ ChatError::Response(_))) => {
                    return Err(e)
                }
                Ok(Err(e)) => e,
                Err(_) => ChatError::Request(format!(
                    "timed out after {}s",
                    self.policy.timeout_secs
                )),
            };
            if attempt < attempts {
                warn!("Completion attempt {}/{} failed: {}; retrying", attempt, attempts, error);
            }
            last_error = error;
        }

        Err(last_error)
    }

    fn classification_temperature(&self) -> f64 {
        self.inner.classification_temperature()
    }
}
