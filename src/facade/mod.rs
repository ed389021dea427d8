// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! HTTP Façade (spec.md §4.5): per-verb request helpers plus a generic
//! `request`, a request-concurrency semaphore for the direct path, and a
//! fallback method that walks the registry under its own mutex so concurrent
//! callers never oscillate between tunnels.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    buffer::RequestBuffer,
    collaborators::Clock,
    error::FacadeError,
    model::buffered_request::BufferPriority,
    supervisor::TunnelSupervisor,
    sync::{Mutex, Semaphore},
};

/// One retry round beyond the first attempt for a direct request, matching
/// §7's "other errors propagate after at most one retry round" and the
/// network-class retry policy of §4.5.
const MAX_DIRECT_RETRIES: u32 = 2;
/// Base delay for the direct path's exponential backoff between retries
/// (spec.md §4.5: "retries on network-class errors... with exponential
/// backoff"); doubled per attempt.
const DIRECT_RETRY_BASE_DELAY_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

/// Everything needed to (re-)issue one HTTP-like request; carried verbatim
/// by a [`crate::model::buffered_request::BufferedRequest`] while it waits
/// in the [`RequestBuffer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRequest {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<Vec<u8>>,
}

impl PendingRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), headers: Vec::new(), body: None }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Capability that actually performs a [`PendingRequest`] against a base URL
/// reached through the active tunnel (spec.md §6's pattern of
/// caller-implemented collaborators, extended to the façade's own transport
/// need).
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(&self, base_url: &str, req: &PendingRequest) -> Result<HttpResponse, FacadeError>;
}

/// Default [`RequestExecutor`] backed by `reqwest`.
pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for ReqwestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestExecutor for ReqwestExecutor {
    async fn execute(&self, base_url: &str, req: &PendingRequest) -> Result<HttpResponse, FacadeError> {
        let method = match req.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        };
        let url = format!("{base_url}{}", req.path);
        let mut builder = self.client.request(method, url);
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = req.body.clone() {
            builder = builder.body(body);
        }
        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or_default().to_string()))
            .collect();
        let body = response.bytes().await.map_err(map_reqwest_error)?.to_vec();
        Ok(HttpResponse { status, headers, body })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FacadeError {
    if err.is_timeout() {
        FacadeError::AbortOrTimeout
    } else if err.is_connect() {
        FacadeError::ConnectionRefused
    } else {
        FacadeError::Other(err.to_string())
    }
}

pub struct HttpFacade {
    supervisor: Arc<TunnelSupervisor>,
    buffer: Arc<RequestBuffer>,
    executor: Arc<dyn RequestExecutor>,
    clock: Arc<dyn Clock>,
    request_semaphore: Semaphore,
    fallback_mutex: Mutex<()>,
    base_url: String,
}

impl HttpFacade {
    pub fn new(
        supervisor: Arc<TunnelSupervisor>,
        buffer: Arc<RequestBuffer>,
        executor: Arc<dyn RequestExecutor>,
        clock: Arc<dyn Clock>,
        request_concurrency: u32,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            supervisor,
            buffer,
            executor,
            clock,
            request_semaphore: Semaphore::new(request_concurrency.max(1) as usize),
            fallback_mutex: Mutex::new(()),
            base_url: base_url.into(),
        }
    }

    pub async fn get(&self, path: impl Into<String>, priority: Option<BufferPriority>) -> Result<HttpResponse, FacadeError> {
        self.request(PendingRequest::new(HttpMethod::Get, path), priority).await
    }

    pub async fn post(&self, path: impl Into<String>, priority: Option<BufferPriority>) -> Result<HttpResponse, FacadeError> {
        self.request(PendingRequest::new(HttpMethod::Post, path), priority).await
    }

    pub async fn put(&self, path: impl Into<String>, priority: Option<BufferPriority>) -> Result<HttpResponse, FacadeError> {
        self.request(PendingRequest::new(HttpMethod::Put, path), priority).await
    }

    pub async fn delete(&self, path: impl Into<String>, priority: Option<BufferPriority>) -> Result<HttpResponse, FacadeError> {
        self.request(PendingRequest::new(HttpMethod::Delete, path), priority).await
    }

    pub async fn patch(&self, path: impl Into<String>, priority: Option<BufferPriority>) -> Result<HttpResponse, FacadeError> {
        self.request(PendingRequest::new(HttpMethod::Patch, path), priority).await
    }

    pub async fn head(&self, path: impl Into<String>, priority: Option<BufferPriority>) -> Result<HttpResponse, FacadeError> {
        self.request(PendingRequest::new(HttpMethod::Head, path), priority).await
    }

    pub async fn options(&self, path: impl Into<String>, priority: Option<BufferPriority>) -> Result<HttpResponse, FacadeError> {
        self.request(PendingRequest::new(HttpMethod::Options, path), priority).await
    }

    /// Generic entry point every per-verb helper funnels through (spec.md
    /// §4.5). Without a priority, always executes directly. With one, routes
    /// through the [`RequestBuffer`] whenever the tunnel is absent,
    /// transitioning, or the direct attempt itself failed.
    pub async fn request(
        &self,
        req: PendingRequest,
        priority: Option<BufferPriority>,
    ) -> Result<HttpResponse, FacadeError> {
        let Some(priority) = priority else {
            return self.execute_direct(req).await;
        };

        if self.supervisor.current().await.is_none() || self.supervisor.is_transitioning() {
            return self.buffer.enqueue(req, priority).await;
        }

        match self.execute_direct(req.clone()).await {
            Ok(resp) => Ok(resp),
            Err(_) => self.buffer.enqueue(req, priority).await,
        }
    }

    /// Executes `req` against the request-concurrency semaphore with retries
    /// on network-class errors (spec.md §4.5, §7).
    async fn execute_direct(&self, req: PendingRequest) -> Result<HttpResponse, FacadeError> {
        if self.supervisor.current().await.is_none() {
            return Err(FacadeError::NoTunnel);
        }
        if self.supervisor.is_transitioning() {
            return Err(FacadeError::Transitioning);
        }

        self.request_semaphore
            .run_with_permit(|| async {
                let mut last_err = FacadeError::NoTunnel;
                for attempt in 0..=MAX_DIRECT_RETRIES {
                    match self.executor.execute(&self.base_url, &req).await {
                        Ok(resp) => return Ok(resp),
                        Err(e) if e.is_retryable() && attempt < MAX_DIRECT_RETRIES => {
                            last_err = e;
                            let backoff_ms = DIRECT_RETRY_BASE_DELAY_MS << attempt;
                            self.clock.sleep(std::time::Duration::from_millis(backoff_ms)).await;
                        },
                        Err(e) => return Err(e),
                    }
                }
                Err(last_err)
            })
            .await
    }

    /// "Try request; on failure pick a different tunnel and retry, up to 3
    /// tunnel attempts", serialized under its own mutex so concurrent
    /// fallback calls do not oscillate between tunnels (spec.md §4.5).
    pub async fn fallback(&self, req: PendingRequest) -> Result<HttpResponse, FacadeError> {
        self.fallback_mutex
            .run_with_lock(|_| async {
                let tunnels = self.supervisor.registry().snapshot_by_priority().await;
                let mut last_err = FacadeError::NoTunnel;
                for tunnel in tunnels.iter().take(3) {
                    if self.supervisor.switch_to(&tunnel.name).await.is_err() {
                        continue;
                    }
                    match self.execute_direct(req.clone()).await {
                        Ok(resp) => return Ok(resp),
                        Err(e) => last_err = e,
                    }
                }
                Err(last_err)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{
        cfg::config::BufferConfig,
        events::EventBus,
        model::tunnel::{TunnelDescriptor, TunnelKind},
        registry::TunnelRegistry,
        testkit::{MockClock, MockProber, MockTunnelDriver},
    };

    struct StubExecutor {
        responses: std::sync::Mutex<std::collections::VecDeque<Result<HttpResponse, FacadeError>>>,
    }

    impl StubExecutor {
        fn new(responses: Vec<Result<HttpResponse, FacadeError>>) -> Self {
            Self { responses: std::sync::Mutex::new(responses.into()) }
        }
    }

    #[async_trait]
    impl RequestExecutor for StubExecutor {
        async fn execute(&self, _base_url: &str, _req: &PendingRequest) -> Result<HttpResponse, FacadeError> {
            self.responses
                .lock()
                .expect("poisoned")
                .pop_front()
                .unwrap_or(Ok(HttpResponse { status: 200, headers: Vec::new(), body: Vec::new() }))
        }
    }

    fn ok_response() -> HttpResponse {
        HttpResponse { status: 200, headers: Vec::new(), body: b"ok".to_vec() }
    }

    async fn connected_facade(executor: Arc<dyn RequestExecutor>) -> HttpFacade {
        let registry = Arc::new(
            TunnelRegistry::new(vec![TunnelDescriptor::new("a", 0, TunnelKind::OpenStyle, json!({}))]).expect("ok"),
        );
        let events = EventBus::new();
        let supervisor = TunnelSupervisor::new(
            registry,
            Arc::new(MockTunnelDriver::new()),
            Arc::new(MockProber::new()),
            Arc::new(MockClock::new(0)),
            events.clone(),
            None,
            3,
            Duration::from_secs(5),
        );
        supervisor.connect("a").await.expect("connect");
        let buffer = RequestBuffer::new(
            BufferConfig::default(),
            executor.clone(),
            events,
            Arc::new(MockClock::new(0)),
            "http://tunnel.local",
        );
        HttpFacade::new(supervisor, buffer, executor, Arc::new(MockClock::new(0)), 10, "http://tunnel.local")
    }

    #[tokio::test]
    async fn direct_request_without_priority_never_touches_the_buffer() {
        let executor = Arc::new(StubExecutor::new(vec![Ok(ok_response())]));
        let facade = connected_facade(executor).await;
        let resp = facade.get("/status", None).await.expect("ok");
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn prioritized_request_is_buffered_without_a_tunnel() {
        let executor = Arc::new(StubExecutor::new(vec![]));
        let registry = Arc::new(TunnelRegistry::new(vec![]).expect("empty registry is legal to construct"));
        let events = EventBus::new();
        let supervisor = TunnelSupervisor::new(
            registry,
            Arc::new(MockTunnelDriver::new()),
            Arc::new(MockProber::new()),
            Arc::new(MockClock::new(0)),
            events.clone(),
            None,
            3,
            Duration::from_secs(5),
        );
        let buffer = RequestBuffer::new(
            BufferConfig::default(),
            executor.clone(),
            events,
            Arc::new(MockClock::new(0)),
            "http://tunnel.local",
        );
        let facade = HttpFacade::new(supervisor, buffer, executor, Arc::new(MockClock::new(0)), 10, "http://tunnel.local");

        // No tunnel is attached, no drain loop runs, so the buffered request
        // never resolves on its own; confirm it went into the buffer instead
        // of failing immediately with `NoTunnel`.
        let enqueue = facade.get("/status", Some(BufferPriority::Normal));
        tokio::select! {
            _ = enqueue => panic!("a buffered request with no drainer must not resolve"),
            _ = tokio::time::sleep(Duration::from_millis(20)) => {},
        }
    }

    #[tokio::test]
    async fn direct_request_falls_back_to_buffer_on_failure() {
        let executor = Arc::new(StubExecutor::new(vec![Err(FacadeError::ConnectionReset), Ok(ok_response())]));
        let facade = connected_facade(executor.clone()).await;

        // `executor` here is shared with the buffer, so the retried attempt
        // the buffer's own drain loop would perform is available too; this
        // test only exercises that routing happens, not that it resolves
        // without a running drain loop.
        let enqueue = facade.get("/status", Some(BufferPriority::Critical));
        tokio::select! {
            _ = enqueue => panic!("routed request should wait in the buffer without a drain loop"),
            _ = tokio::time::sleep(Duration::from_millis(20)) => {},
        }
    }
}
