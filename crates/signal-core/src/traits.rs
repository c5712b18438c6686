use crate::{CoreError, Quote, SignalItem};
use async_trait::async_trait;

/// External content source (news parser, social crawler, AI classifier).
/// The core consumes the produced shape only; fetching and parsing live in
/// the implementor.
#[async_trait]
pub trait ContentIngestionAdapter: Send + Sync {
    fn source_id(&self) -> &str;

    /// Produce zero or more signal items for this invocation.
    ///
    /// A `Configuration` error means the adapter is unusable this pass
    /// (missing credential or endpoint) and aborts only its contribution.
    async fn poll(&self) -> Result<Vec<SignalItem>, CoreError>;
}

/// External quote source. Fallible and safely retryable; callers never
/// assume success.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, CoreError>;
}
