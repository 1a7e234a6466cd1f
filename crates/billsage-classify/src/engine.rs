//! Ordered-fallback decision engine.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use billsage_chat::CompletionClient;
use billsage_core::{BillContext, ClassificationDecision, ClassifiedService, Service};
use futures::future::join_all;
use futures::FutureExt;
use tracing::{debug, error};

use crate::ai::AiClassifier;
use crate::context::ContextClassifier;
use crate::rules::RuleClassifier;

/// One classification strategy. `None` defers to the next tier.
#[async_trait]
pub trait ClassifierTier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn classify(
        &self,
        service: &Service,
        context: &BillContext,
    ) -> Option<ClassificationDecision>;
}

/// Tries each tier in order and returns the first verdict.
pub struct DecisionEngine {
    tiers: Vec<Box<dyn ClassifierTier>>,
}

impl DecisionEngine {
    /// Standard chain: rules, facility context, then the language model.
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self::with_tiers(vec![
            Box::new(RuleClassifier),
            Box::new(ContextClassifier),
            Box::new(AiClassifier::new(client)),
        ])
    }

    pub fn with_tiers(tiers: Vec<Box<dyn ClassifierTier>>) -> Self {
        Self { tiers }
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    async fn run_chain(
        &self,
        service: &Service,
        context: &BillContext,
    ) -> Option<ClassificationDecision> {
        for tier in &self.tiers {
            if let Some(decision) = tier.classify(service, context).await {
                debug!(
                    "'{}' -> {} ({:.2}) via {}",
                    service.description,
                    decision.component_type,
                    decision.confidence,
                    tier.name()
                );
                return Some(decision);
            }
        }
        None
    }

    /// Decide one service. Total: a panicking tier or an exhausted chain
    /// yields the error default.
    pub async fn decide(&self, service: &Service, context: &BillContext) -> ClassificationDecision {
        match AssertUnwindSafe(self.run_chain(service, context))
            .catch_unwind()
            .await
        {
            Ok(Some(decision)) => decision,
            Ok(None) => ClassificationDecision::error_default("No classifier tier produced a verdict"),
            Err(_) => {
                error!("Classifier panicked on '{}'", service.description);
                ClassificationDecision::error_default("Classification failed unexpectedly")
            }
        }
    }

    /// Decide every service concurrently; output order matches input.
    pub async fn decide_all(
        &self,
        services: &[Service],
        context: &BillContext,
    ) -> Vec<ClassifiedService> {
        self.decide_all_with(services, context, |_| async {}).await
    }

    /// Like [`decide_all`](Self::decide_all), calling `on_decided` with the
    /// running count of finished services.
    pub async fn decide_all_with<F, Fut>(
        &self,
        services: &[Service],
        context: &BillContext,
        on_decided: F,
    ) -> Vec<ClassifiedService>
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = ()>,
    {
        let done = AtomicUsize::new(0);
        let on_decided = &on_decided;
        let done = &done;

        join_all(services.iter().map(|service| async move {
            let decision = self.decide(service, context).await;
            on_decided(done.fetch_add(1, Ordering::SeqCst) + 1).await;
            ClassifiedService {
                service: service.clone(),
                decision,
            }
        }))
        .await
    }
}
