use async_trait::async_trait;
use signal_core::{CoreError, Quote, QuoteProvider};
use std::sync::Arc;

/// Outcome of one provider attempt within a fallback chain.
#[derive(Debug, Clone)]
pub struct ProviderAttempt {
    pub provider: String,
    pub error: Option<String>,
}

/// Ordered list of quote providers tried in sequence.
///
/// Each attempt produces an explicit success or failure result; the first
/// success wins. No exception-driven control flow: a provider that cannot
/// serve the symbol simply yields its error and the chain moves on.
pub struct FallbackQuoteProvider {
    providers: Vec<(String, Arc<dyn QuoteProvider>)>,
}

impl FallbackQuoteProvider {
    pub fn new(providers: Vec<(String, Arc<dyn QuoteProvider>)>) -> Self {
        Self { providers }
    }

    /// Fetch with full attempt history, for callers that want to log or
    /// surface which providers were tried.
    pub async fn fetch_with_attempts(
        &self,
        symbol: &str,
    ) -> (Result<Quote, CoreError>, Vec<ProviderAttempt>) {
        let mut attempts = Vec::with_capacity(self.providers.len());

        for (name, provider) in &self.providers {
            match provider.fetch_quote(symbol).await {
                Ok(quote) => {
                    attempts.push(ProviderAttempt {
                        provider: name.clone(),
                        error: None,
                    });
                    return (Ok(quote), attempts);
                }
                Err(e) => {
                    tracing::debug!(
                        provider = %name,
                        symbol,
                        error = %e,
                        "quote provider failed, trying next"
                    );
                    attempts.push(ProviderAttempt {
                        provider: name.clone(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let summary = attempts
            .iter()
            .filter_map(|a| a.error.as_ref().map(|e| format!("{}: {}", a.provider, e)))
            .collect::<Vec<_>>()
            .join("; ");
        (
            Err(CoreError::TransientFetch(format!(
                "all providers failed for {}: {}",
                symbol, summary
            ))),
            attempts,
        )
    }
}

#[async_trait]
impl QuoteProvider for FallbackQuoteProvider {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, CoreError> {
        let (result, _) = self.fetch_with_attempts(symbol).await;
        result
    }
}
