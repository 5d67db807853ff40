use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::{Method, StatusCode};

use crate::http_client::{HttpTransport, RawResponse, TransportError};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub url: String,
    pub authorization: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone)]
enum Scripted {
    Respond(u16, String),
    Fail,
}

struct Route {
    method: Method,
    path: String,
    responses: VecDeque<Scripted>,
}

struct FakeInner {
    routes: Vec<Route>,
    calls: Vec<RecordedCall>,
}

/// Scripted transport for tests. Routes are matched by method and URL
/// suffix; queued responses are consumed in order and the final one repeats.
/// Unmatched requests answer 404 with an empty body, which the client treats
/// as "no result" (or "expected absent" for quiet endpoints).
#[derive(Clone)]
pub struct FakeTransport {
    inner: Arc<Mutex<FakeInner>>,
}

impl FakeTransport {
    pub fn new() -> FakeTransport {
        FakeTransport {
            inner: Arc::new(Mutex::new(FakeInner {
                routes: Vec::new(),
                calls: Vec::new(),
            })),
        }
    }

    pub fn on(&self, method: Method, path: &str, responses: Vec<(u16, &str)>) {
        let mut inner = self.inner.lock().unwrap();
        inner.routes.push(Route {
            method,
            path: path.to_string(),
            responses: responses
                .into_iter()
                .map(|(status, body)| Scripted::Respond(status, body.to_string()))
                .collect(),
        });
    }

    /// Every call to this route fails at the network level.
    pub fn fail_always(&self, method: Method, path: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.routes.push(Route {
            method,
            path: path.to_string(),
            responses: VecDeque::from([Scripted::Fail]),
        });
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count(&self, method: &Method, path: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| &call.method == method && call.url.ends_with(path))
            .count()
    }

    /// Chronological "METHOD /path" list, for call-order assertions.
    pub fn call_sequence(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|call| {
                let path = call
                    .url
                    .split_once("://")
                    .and_then(|(_, rest)| rest.split_once('/'))
                    .map(|(_, path)| format!("/{}", path))
                    .unwrap_or_else(|| call.url.clone());
                format!("{} {}", call.method, path)
            })
            .collect()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn execute(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<String>,
    ) -> Result<RawResponse, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RecordedCall {
            method: method.clone(),
            url: url.to_string(),
            authorization: headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            body,
        });

        let script = inner
            .routes
            .iter_mut()
            .find(|route| route.method == method && url.ends_with(&route.path))
            .map(|route| {
                if route.responses.len() > 1 {
                    route.responses.pop_front().unwrap()
                } else {
                    route.responses.front().cloned().unwrap_or(Scripted::Fail)
                }
            });

        match script {
            Some(Scripted::Respond(status, body)) => Ok(RawResponse {
                status: StatusCode::from_u16(status).unwrap(),
                body,
            }),
            Some(Scripted::Fail) => Err(TransportError::ConnectionFailed(
                "simulated network failure".to_string(),
            )),
            None => Ok(RawResponse {
                status: StatusCode::NOT_FOUND,
                body: String::new(),
            }),
        }
    }
}
