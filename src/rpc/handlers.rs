//! Named handler registries and typed handler erasure

use crate::error::Result;
use crate::protocol::{object_payload, Address};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Erased request handler: payload in, response payload out
pub(crate) type RequestHandler =
    Arc<dyn Fn(Address, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Erased notification handler: payload in, nothing out
pub(crate) type NotificationHandler =
    Arc<dyn Fn(Address, Value) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Exactly-one-handler-per-name registry
///
/// Registering a second handler for the same name is a programming error and
/// fails fast.
pub(crate) struct HandlerRegistry<H> {
    kind: &'static str,
    handlers: HashMap<String, H>,
}

impl<H: Clone> HandlerRegistry<H> {
    pub(crate) fn new(kind: &'static str) -> Self {
        Self {
            kind,
            handlers: HashMap::new(),
        }
    }

    /// # Panics
    ///
    /// Panics if a handler is already registered under `name`.
    pub(crate) fn insert(&mut self, name: &str, handler: H) {
        if self
            .handlers
            .insert(name.to_string(), handler)
            .is_some()
        {
            panic!("{} handler is already registered for {name}", self.kind);
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<H> {
        self.handlers.get(name).cloned()
    }
}

/// Wrap a typed request handler into the erased form
///
/// Deserialization of the incoming payload and serialization of the result
/// happen inside the erased closure, so a malformed payload surfaces as a
/// handler failure (and therefore as an error response) rather than a
/// dropped packet.
pub(crate) fn erase_request_handler<Req, Res, F, Fut>(handler: F) -> RequestHandler
where
    Req: DeserializeOwned + Send + 'static,
    Res: Serialize + Send + 'static,
    F: Fn(Address, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Res>> + Send + 'static,
{
    let handler = Arc::new(handler);
    Arc::new(move |from, value| {
        let handler = Arc::clone(&handler);
        Box::pin(async move {
            let data: Req = serde_json::from_value(value)?;
            let response = handler(from, data).await?;
            object_payload(serde_json::to_value(response)?)
        })
    })
}

/// Wrap a typed notification handler into the erased form
pub(crate) fn erase_notification_handler<Req, F, Fut>(handler: F) -> NotificationHandler
where
    Req: DeserializeOwned + Send + 'static,
    F: Fn(Address, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let handler = Arc::new(handler);
    Arc::new(move |from, value| {
        let handler = Arc::clone(&handler);
        Box::pin(async move {
            let data: Req = serde_json::from_value(value)?;
            handler(from, data).await
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Echo {
        v: u64,
    }

    #[derive(Serialize)]
    struct Echoed {
        v: u64,
    }

    #[test]
    fn test_registry_stores_and_returns_handlers() {
        let mut registry: HandlerRegistry<u32> = HandlerRegistry::new("request");
        registry.insert("A", 1);
        registry.insert("B", 2);
        assert_eq!(registry.get("A"), Some(1));
        assert_eq!(registry.get("C"), None);
    }

    #[test]
    #[should_panic(expected = "already registered for Echo")]
    fn test_duplicate_registration_panics() {
        let mut registry: HandlerRegistry<u32> = HandlerRegistry::new("request");
        registry.insert("Echo", 1);
        registry.insert("Echo", 2);
    }

    #[tokio::test]
    async fn test_erased_request_handler_converts_payloads() {
        let handler = erase_request_handler(|_from, echo: Echo| async move {
            Ok(Echoed { v: echo.v + 1 })
        });
        let out = handler(Address::Content, json!({ "v": 41 })).await.unwrap();
        assert_eq!(out, json!({ "v": 42 }));
    }

    #[tokio::test]
    async fn test_erased_request_handler_surfaces_bad_payload_as_failure() {
        let handler =
            erase_request_handler(|_from, echo: Echo| async move { Ok(Echoed { v: echo.v }) });
        let result = handler(Address::Content, json!({ "wrong": true })).await;
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[tokio::test]
    async fn test_erased_notification_handler_runs() {
        let handler = erase_notification_handler(|_from, echo: Echo| async move {
            if echo.v == 0 {
                return Err(Error::Handler("zero".into()));
            }
            Ok(())
        });
        assert!(handler(Address::Popup, json!({ "v": 1 })).await.is_ok());
        assert!(handler(Address::Popup, json!({ "v": 0 })).await.is_err());
    }
}
