//! Pending-outgoing-request bookkeeping

use crate::error::Error;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

/// Outcome delivered to a suspended `request` caller
pub(crate) type RequestOutcome = Result<Value, Error>;

/// One outstanding request awaiting its correlated response
///
/// Lives in the router's pending table from issue until exactly one of
/// {response, timeout, cancellation} fires; whichever terminal event wins
/// removes the entry, so completion consumes the bookkeeping.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    tx: oneshot::Sender<RequestOutcome>,
}

impl PendingRequest {
    /// Register a new pending request, returning the caller's wait handle
    pub(crate) fn new() -> (Self, oneshot::Receiver<RequestOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Deliver the terminal outcome to the waiting caller
    ///
    /// A dropped receiver means the caller already gave up (timeout or
    /// cancellation won the race); that is logged, not an error.
    pub(crate) fn complete(self, outcome: RequestOutcome) {
        if self.tx.send(outcome).is_err() {
            debug!("response arrived after the caller stopped waiting");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_complete_delivers_outcome() {
        let (pending, rx) = PendingRequest::new();
        pending.complete(Ok(json!({ "v": 1 })));
        assert_eq!(rx.await.unwrap().unwrap(), json!({ "v": 1 }));
    }

    #[tokio::test]
    async fn test_complete_with_error() {
        let (pending, rx) = PendingRequest::new();
        pending.complete(Err(Error::Remote("denied".into())));
        assert!(matches!(rx.await.unwrap(), Err(Error::Remote(e)) if e == "denied"));
    }

    #[tokio::test]
    async fn test_complete_after_caller_gave_up_is_harmless() {
        let (pending, rx) = PendingRequest::new();
        drop(rx);
        pending.complete(Ok(json!({})));
    }
}
