use std::{future::Future, pin::Pin, time::Duration};

use bytes::Bytes;
use log::debug;
use reqwest::{
    Client,
    header::{self, HeaderValue},
    multipart,
};
use serde_json::Value;

use crate::error::{GenerationError, Result};

pub const USER_AGENT: &str = "ai-draw/1.0";

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub enum Body {
    Json(Value),
    Multipart {
        field: &'static str,
        file_name: String,
        mime_type: String,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub accept: &'static str,
    pub body: Option<Body>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            bearer: None,
            accept: "application/json",
            body: None,
            timeout,
        }
    }

    pub fn post_json(url: impl Into<String>, payload: Value, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            body: Some(Body::Json(payload)),
            ..Self::get(url, timeout)
        }
    }

    pub fn bearer(mut self, key: Option<&str>) -> Self {
        self.bearer = key.map(String::from);
        self
    }

    pub fn accept(mut self, accept: &'static str) -> Self {
        self.accept = accept;
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The only seam between the orchestrator and the network.
/// Implementations report transport failures; status codes are left to the caller.
pub trait Transport: Send + Sync {
    fn send(&self, req: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GenerationError::from_reqwest("building HTTP client", e))?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, req: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        Box::pin(async move {
            let HttpRequest {
                method,
                url,
                bearer,
                accept,
                body,
                timeout,
            } = req;

            let mut builder = match method {
                Method::Get => self.client.get(&url),
                Method::Post => self.client.post(&url),
            }
            .timeout(timeout)
            .header(header::ACCEPT, HeaderValue::from_static(accept));

            if let Some(key) = bearer {
                builder = builder.bearer_auth(key);
            }

            builder = match body {
                None => builder,
                Some(Body::Json(payload)) => builder.json(&payload),
                Some(Body::Multipart {
                    field,
                    file_name,
                    mime_type,
                    bytes,
                }) => {
                    let part = multipart::Part::bytes(bytes)
                        .file_name(file_name)
                        .mime_str(&mime_type)
                        .map_err(|e| {
                            GenerationError::InvalidInput(format!("mime type {mime_type}: {e}"))
                        })?;
                    builder.multipart(multipart::Form::new().part(field, part))
                }
            };

            debug!("{method:?} {url}");
            let context = format!("{method:?} {url}");
            let resp = builder
                .send()
                .await
                .map_err(|e| GenerationError::from_reqwest(context.clone(), e))?;
            let status = resp.status().as_u16();
            let body = resp
                .bytes()
                .await
                .map_err(|e| GenerationError::from_reqwest(context, e))?;
            debug!("{method:?} {url} -> {status} ({} bytes)", body.len());

            Ok(HttpResponse { status, body })
        })
    }
}
