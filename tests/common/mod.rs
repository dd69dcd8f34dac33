#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use journey_load::{HttpClient, HttpRequest, Response, TransportError};
use parking_lot::Mutex;

/// In-memory [`HttpClient`]: answers by URL path, 200 for anything unscripted.
pub struct FakeClient {
    routes: HashMap<String, Result<u16, TransportError>>,
    latency: Duration,
    pub sent: Mutex<Vec<HttpRequest>>,
    pub calls: AtomicUsize,
}

impl FakeClient {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            latency: Duration::from_millis(10),
            sent: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn route(mut self, path: &str, status: u16) -> Self {
        self.routes.insert(path.to_string(), Ok(status));
        self
    }

    pub fn fail(mut self, path: &str, error: TransportError) -> Self {
        self.routes.insert(path.to_string(), Err(error));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<String> {
        self.sent.lock().iter().map(|r| path_of(&r.url)).collect()
    }
}

fn path_of(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    match without_scheme.find('/') {
        Some(i) => without_scheme[i..].to_string(),
        None => "/".to_string(),
    }
}

#[async_trait]
impl HttpClient for FakeClient {
    async fn send(&self, request: HttpRequest) -> Result<Response, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = path_of(&request.url);
        self.sent.lock().push(request);

        // Time must pass per request or paused-clock tests spin forever.
        tokio::time::sleep(self.latency).await;

        let status = self.routes.get(&path).cloned().unwrap_or(Ok(200))?;
        Ok(Response {
            status,
            body: "<title>ShopFlutter</title>".to_string(),
            headers: [("content-type".to_string(), "text/html".to_string())].into(),
            elapsed: self.latency,
        })
    }
}
