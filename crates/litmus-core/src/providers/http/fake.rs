use super::{HttpExchange, Transport};
use crate::errors::{EngineError, Result};
use crate::model::RequestSpec;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum FakeReply {
    Json { status: u16, body: Value },
    /// Connection-level failure (no HTTP status).
    Error(String),
    Delay(Duration, Box<FakeReply>),
}

impl FakeReply {
    pub fn ok(body: Value) -> Self {
        FakeReply::Json { status: 200, body }
    }

    pub fn status(status: u16, body: Value) -> Self {
        FakeReply::Json { status, body }
    }
}

type Handler = Box<dyn Fn(&RequestSpec) -> FakeReply + Send + Sync>;

struct Route {
    url: String,
    replies: VecDeque<FakeReply>,
    handler: Option<Handler>,
}

#[derive(Debug, Clone)]
pub struct SentRequest {
    pub request: RequestSpec,
    pub tracing_id: String,
}

/// In-process target for tests and dry runs. Routes match on the exact URL.
/// A reply sequence is consumed in order and its last entry repeats.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<Vec<Route>>,
    sent: Mutex<Vec<SentRequest>>,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: &str, status: u16, body: Value) -> Self {
        self.route_sequence(url, vec![FakeReply::Json { status, body }])
    }

    pub fn route_sequence(self, url: &str, replies: Vec<FakeReply>) -> Self {
        guard(&self.routes).push(Route {
            url: url.to_string(),
            replies: replies.into(),
            handler: None,
        });
        self
    }

    pub fn route_with<F>(self, url: &str, handler: F) -> Self
    where
        F: Fn(&RequestSpec) -> FakeReply + Send + Sync + 'static,
    {
        guard(&self.routes).push(Route {
            url: url.to_string(),
            replies: VecDeque::new(),
            handler: Some(Box::new(handler)),
        });
        self
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        guard(&self.sent).clone()
    }

    pub fn sent_to(&self, url: &str) -> usize {
        guard(&self.sent)
            .iter()
            .filter(|s| s.request.url == url)
            .count()
    }

    fn next_reply(&self, request: &RequestSpec) -> Option<FakeReply> {
        let mut routes = guard(&self.routes);
        let route = routes.iter_mut().find(|r| r.url == request.url)?;
        if let Some(handler) = &route.handler {
            return Some(handler(request));
        }
        if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: &RequestSpec, tracing_id: &str) -> Result<HttpExchange> {
        guard(&self.sent).push(SentRequest {
            request: request.clone(),
            tracing_id: tracing_id.to_string(),
        });
        let mut reply = self
            .next_reply(request)
            .ok_or_else(|| EngineError::transport(format!("no route for {}", request.url)))?;
        while let FakeReply::Delay(wait, inner) = reply {
            tokio::time::sleep(wait).await;
            reply = *inner;
        }
        match reply {
            FakeReply::Json { status, body } if (200..300).contains(&status) => Ok(HttpExchange {
                status,
                body,
                latency_ms: 1,
            }),
            FakeReply::Json { status, body } => Err(EngineError::Transport {
                message: format!("HTTP {status}: {}", crate::json_path::value_to_text(&body)),
                status: Some(status),
            }),
            FakeReply::Error(message) => Err(EngineError::transport(message)),
            FakeReply::Delay(..) => Err(EngineError::transport("unreachable delay")),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn get(url: &str) -> RequestSpec {
        RequestSpec {
            url: url.into(),
            method: crate::model::HttpMethod::Get,
            headers: Default::default(),
            body: None,
        }
    }

    #[tokio::test]
    async fn sequence_then_repeat_last() {
        let t = FakeTransport::new().route_sequence(
            "http://a",
            vec![FakeReply::status(500, json!("boom")), FakeReply::ok(json!(1))],
        );
        let first = t.send(&get("http://a"), "t1").await.unwrap_err();
        assert_eq!(first.status(), Some(500));
        assert_eq!(t.send(&get("http://a"), "t2").await.unwrap().body, json!(1));
        assert_eq!(t.send(&get("http://a"), "t3").await.unwrap().body, json!(1));
        assert_eq!(t.sent_to("http://a"), 3);
        assert_eq!(t.sent()[1].tracing_id, "t2");
    }

    #[tokio::test]
    async fn unknown_url_fails() {
        let t = FakeTransport::new();
        assert!(t.send(&get("http://nowhere"), "t").await.is_err());
    }
}
