use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;

use super::{HttpClient, HttpMethod, HttpRequest, RequestBody, Response};
use crate::error::TransportError;

/// [`HttpClient`] backed by a pooled `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
    timeout: Duration,
    discard_bodies: bool,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self {
            client,
            timeout,
            discard_bodies: false,
        })
    }

    /// Skip reading response bodies to save memory under heavy load.
    pub fn with_discarded_bodies(mut self, discard: bool) -> Self {
        self.discard_bodies = discard;
        self
    }

    fn classify(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if error.is_connect() {
            TransportError::Connect(error.to_string())
        } else if error.is_builder() {
            TransportError::InvalidRequest(error.to_string())
        } else {
            TransportError::Other(error.to_string())
        }
    }
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<Response, TransportError> {
        let mut builder = self
            .client
            .request(to_method(request.method), &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        match request.body {
            Some(RequestBody::Json(json)) => {
                let body = serde_json::to_string(&json)
                    .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                if !request
                    .headers
                    .keys()
                    .any(|k| k.eq_ignore_ascii_case(CONTENT_TYPE.as_str()))
                {
                    builder = builder.header(CONTENT_TYPE, "application/json");
                }
                builder = builder.body(body);
            }
            Some(RequestBody::Text(text)) => {
                builder = builder.body(text);
            }
            None => {}
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(|e| self.classify(e))?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = if self.discard_bodies {
            String::new()
        } else {
            response.text().await.map_err(|e| self.classify(e))?
        };

        Ok(Response {
            status,
            body,
            headers,
            elapsed: start.elapsed(),
        })
    }
}
