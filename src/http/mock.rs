//! Scripted [`Transport`] for tests.
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{Method, Request, Response, Transport};
use crate::error::ExtractorError;

#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub body: String,
    pub cookies: Vec<String>,
}

/// Replies are registered per method and full URL and served in order; the last reply of a
/// route keeps being served once the others are used up. Unknown routes answer `404`.
///
/// Cookies from replies and from [`Transport::add_cookie`] end up in one jar that ignores
/// domain and path.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<MockReply>>>,
    requests: Mutex<Vec<Request>>,
    cookies: Mutex<Vec<(String, String)>>,
    jar: Mutex<Vec<(String, String)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, method: Method, url: &str, reply: MockReply) {
        self.routes
            .lock()
            .unwrap()
            .entry((method, url.to_string()))
            .or_default()
            .push_back(reply);
    }

    pub fn reply(&self, method: Method, url: &str, status: u16, body: &str) {
        self.push(
            method,
            url,
            MockReply {
                status,
                body: body.to_string(),
                cookies: Vec::new(),
            },
        );
    }

    pub fn get(&self, url: &str, body: &str) {
        self.reply(Method::Get, url, 200, body);
    }

    pub fn post(&self, url: &str, body: &str) {
        self.reply(Method::Post, url, 200, body);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests sent with `method` whose full URL starts with `prefix`.
    pub fn count(&self, method: Method, prefix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.full_url().starts_with(prefix))
            .count()
    }

    /// Cookies added through [`Transport::add_cookie`], with the URL they were added for.
    pub fn added_cookies(&self) -> Vec<(String, String)> {
        self.cookies.lock().unwrap().clone()
    }

    fn store(&self, cookie: &str) {
        let pair = cookie.split(';').next().unwrap_or_default().trim();
        let Some((name, value)) = pair.split_once('=') else {
            return;
        };
        let mut jar = self.jar.lock().unwrap();
        jar.retain(|(n, _)| n != name);
        jar.push((name.to_string(), value.to_string()));
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> Result<Response, ExtractorError> {
        let url = request.full_url();
        let key = (request.method, url.clone());
        self.requests.lock().unwrap().push(request);

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        if let Some(reply) = &reply {
            for cookie in &reply.cookies {
                self.store(cookie);
            }
        }

        Ok(match reply {
            Some(reply) => Response {
                status: reply.status,
                url,
                text: reply.body,
                cookies: reply.cookies,
            },
            None => Response {
                status: 404,
                url,
                text: String::new(),
                cookies: Vec::new(),
            },
        })
    }

    fn add_cookie(&self, cookie: &str, url: &str) {
        self.store(cookie);
        self.cookies
            .lock()
            .unwrap()
            .push((cookie.to_string(), url.to_string()));
    }

    fn cookies(&self, _url: &str) -> Vec<String> {
        self.jar
            .lock()
            .unwrap()
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect()
    }
}
