use crate::outcome::OutcomeCallbacks;
use async_trait::async_trait;
use bytes::Bytes;
use cubegate_types::{BucketContext, CubeQuery};
use futures::Stream;
use std::fmt::Debug;
use std::pin::Pin;

/// A single result row, keyed by column name
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A lazy, single-pass stream of result rows.
///
/// Not restartable; once the transport has consumed it, it is gone.
pub type SendableRowStream = Pin<Box<dyn Stream<Item = Result<Row, ProcessorError>> + Send>>;

/// The error resumed to the dispatching side when a unit fails.
///
/// When the processor supplied an underlying cause, that cause propagates
/// as-is; otherwise the failure's message text stands alone. The distinction
/// keeps caller-visible context faithful to what the processor reported.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("{0}")]
    Cause(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("{0}")]
    Message(String),
}

/// A failure reported by the processor, optionally carrying its cause.
#[derive(Debug)]
pub struct ProcessorFailure {
    message: String,
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProcessorFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        message: impl Into<String>,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ProcessorFailure> for ProcessorError {
    fn from(failure: ProcessorFailure) -> Self {
        match failure.cause {
            Some(cause) => Self::Cause(cause),
            None => Self::Message(failure.message),
        }
    }
}

/// The fully normalized package submitted exactly once to the processor.
///
/// Ownership moves to the processor on submission; the facade keeps no
/// further reference to it.
#[derive(Debug, Clone)]
pub struct DispatchUnit {
    /// Target registry the processor resolves cube metadata against
    pub registry: String,
    /// The canonical query, overrides already applied
    pub query: CubeQuery,
    /// The raw request body the query was parsed from
    pub raw_body: Bytes,
    /// Per-request routing/identity parameters
    pub bucket: BucketContext,
}

/// An asynchronous multi-engine query processor.
#[async_trait]
pub trait QueryProcessor: Debug + Send + Sync + 'static {
    /// Submit one unit of work.
    ///
    /// `callbacks` is already bound to the dispatching side's outcome handle
    /// when this is invoked. Implementations enqueue the unit onto their own
    /// execution context, return promptly, and resolve the callbacks from
    /// there, exactly once. There is no cancellation; a submitted unit runs
    /// to one of its two terminal outcomes.
    async fn process(&self, unit: DispatchUnit, callbacks: OutcomeCallbacks);
}

#[cfg(test)]
mod tests {
    use super::{ProcessorError, ProcessorFailure};
    use pretty_assertions::assert_eq;

    #[test]
    fn failure_with_cause_propagates_the_cause() {
        let cause = std::io::Error::other("connection reset by engine");
        let failure = ProcessorFailure::with_cause("query failed", cause);
        let err = ProcessorError::from(failure);
        assert!(matches!(err, ProcessorError::Cause(_)));
        assert_eq!(err.to_string(), "connection reset by engine");
    }

    #[test]
    fn failure_without_cause_keeps_the_message_text() {
        let failure = ProcessorFailure::new("cube exceeded row budget");
        let err = ProcessorError::from(failure);
        assert!(matches!(err, ProcessorError::Message(_)));
        assert_eq!(err.to_string(), "cube exceeded row budget");
    }
}
