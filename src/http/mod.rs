//! Request plumbing shared by all extractors.
//!
//! Extractors never talk to `reqwest` directly. They build [`Request`] values and hand them to
//! their [`Session`], which applies the session headers and forwards them to a [`Transport`].
//! The production transport is [`HttpClient`]; tests swap in a scripted one.
use async_trait::async_trait;
use log::debug;
use std::fmt::Display;
use std::sync::{Arc, Mutex};

use crate::error::ExtractorError;
use crate::message::Headers;

mod client;
#[cfg(test)]
pub(crate) mod mock;

pub use client::{HttpClient, USER_AGENT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub headers: Headers,
    /// Decode the body with this charset instead of the one announced by the server.
    pub encoding: Option<String>,
}

impl Request {
    fn new(method: Method, url: &str) -> Self {
        Self {
            method,
            url: url.to_string(),
            query: Vec::new(),
            form: Vec::new(),
            headers: Headers::new(),
            encoding: None,
        }
    }

    #[must_use]
    pub fn get(url: &str) -> Self {
        Self::new(Method::Get, url)
    }

    #[must_use]
    pub fn post(url: &str) -> Self {
        Self::new(Method::Post, url)
    }

    #[must_use]
    pub fn query<K: Display, V: Display>(mut self, key: K, value: V) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn form<K: Display, V: Display>(mut self, key: K, value: V) -> Self {
        self.form.push((key.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn encoding(mut self, encoding: &str) -> Self {
        self.encoding = Some(encoding.to_string());
        self
    }

    /// The URL with the query parameters appended, percent-encoded and in insertion order.
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.url, separator, query)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    pub text: String,
    /// Raw `Set-Cookie` values received with this response.
    pub cookies: Vec<String>,
}

impl Response {
    #[inline]
    pub const fn is_success(&self) -> bool {
        self.status < 400
    }
}

/// Something able to perform HTTP requests and keep cookies between them.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, ExtractorError>;

    /// Store a raw `Set-Cookie` style string for `url`, as if the server had sent it.
    fn add_cookie(&self, cookie: &str, url: &str);

    /// `name=value` pairs of every cookie that would be sent to `url`.
    ///
    /// Includes cookies set on redirects that never reached the final [`Response`].
    fn cookies(&self, url: &str) -> Vec<String>;
}

/// Per-extractor view of a transport with its own default headers.
pub struct Session {
    transport: Arc<dyn Transport>,
    headers: Mutex<Headers>,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            headers: Mutex::new(Headers::new()),
        }
    }

    /// Add a header sent with every subsequent request of this session.
    pub fn set_header(&self, name: &str, value: &str) {
        self.headers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), value.to_string());
    }

    pub fn add_cookie(&self, cookie: &str, url: &str) {
        self.transport.add_cookie(cookie, url);
    }

    pub fn cookies(&self, url: &str) -> Vec<String> {
        self.transport.cookies(url)
    }

    /// Send `request` and return the response whatever its status.
    pub async fn send(&self, mut request: Request) -> Result<Response, ExtractorError> {
        {
            let defaults = self.headers.lock().unwrap_or_else(|e| e.into_inner());
            for (name, value) in defaults.iter() {
                request
                    .headers
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        debug!("{} {}", request.method, request.full_url());
        self.transport.send(request).await
    }

    /// Send `request`, turning error statuses into errors.
    ///
    /// `404` becomes [`ExtractorError::NotFound`], any other status `>= 400` becomes
    /// [`ExtractorError::HttpStatus`].
    pub async fn request(&self, request: Request) -> Result<Response, ExtractorError> {
        let response = self.send(request).await?;
        match response.status {
            404 => Err(ExtractorError::NotFound { resource: None }),
            status if status >= 400 => Err(ExtractorError::HttpStatus {
                status,
                url: response.url,
            }),
            _ => Ok(response),
        }
    }

    /// Shortcut for a plain `GET` returning the body.
    pub async fn get_text(&self, url: &str) -> Result<String, ExtractorError> {
        Ok(self.request(Request::get(url)).await?.text)
    }
}
