use async_trait::async_trait;
use log::warn;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::SET_COOKIE;
use reqwest::{Client, Url};
use std::sync::Arc;

use super::{Method, Request, Response, Transport};
use crate::error::ExtractorError;

pub const USER_AGENT: &str = concat!("Rust Gallery Downloader/", env!("CARGO_PKG_VERSION"));

/// [`Transport`] backed by a `reqwest` client with its own cookie jar.
///
/// Every extractor run gets a fresh client, so cookies never leak between extractors.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    jar: Arc<Jar>,
}

impl HttpClient {
    pub fn new() -> Result<Self, ExtractorError> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(jar.clone())
            .build()?;
        Ok(Self { client, jar })
    }

    /// Returns the underlying client, sharing this transport's cookies.
    pub fn client(&self) -> Client {
        self.client.clone()
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, request: Request) -> Result<Response, ExtractorError> {
        let url = request.full_url();
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }

        let res = builder.send().await?;

        let status = res.status().as_u16();
        let final_url = res.url().to_string();
        let cookies = res
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(ToString::to_string)
            .collect();

        let text = match &request.encoding {
            Some(encoding) => res.text_with_charset(encoding).await?,
            None => res.text().await?,
        };

        Ok(Response {
            status,
            url: final_url,
            text,
            cookies,
        })
    }

    fn add_cookie(&self, cookie: &str, url: &str) {
        match Url::parse(url) {
            Ok(url) => self.jar.add_cookie_str(cookie, &url),
            Err(error) => warn!("Not adding cookie for invalid URL {}: {}", url, error),
        }
    }

    fn cookies(&self, url: &str) -> Vec<String> {
        let Ok(url) = Url::parse(url) else {
            warn!("Not reading cookies for invalid URL {}", url);
            return Vec::new();
        };
        self.jar
            .cookies(&url)
            .and_then(|header| header.to_str().map(ToString::to_string).ok())
            .map(|header| header.split("; ").map(ToString::to_string).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Session;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn sends_query_and_keeps_cookies() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_string_contains("email=user"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "session=abc; Path=/")
                    .set_body_string("welcome"),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api"))
            .and(query_param("start", "20"))
            .and(header("cookie", "session=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("page"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();

        let login = client
            .send(
                Request::post(&format!("{}/login", server.uri()))
                    .form("email", "user")
                    .form("password", "secret"),
            )
            .await
            .unwrap();
        assert_eq!(login.text, "welcome");
        assert_eq!(login.cookies.len(), 1);
        assert!(login.cookies[0].starts_with("session=abc"));

        let page = client
            .send(Request::get(&format!("{}/api", server.uri())).query("start", 20))
            .await
            .unwrap();
        assert_eq!(page.status, 200);
        assert_eq!(page.text, "page");
    }

    #[tokio::test]
    async fn injected_cookies_are_sent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gallery/"))
            .and(header("cookie", "agegate_state=1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("adult"))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        client.add_cookie("agegate_state=1", &server.uri());

        let res = client
            .send(Request::get(&format!("{}/gallery/", server.uri())))
            .await
            .unwrap();
        assert_eq!(res.text, "adult");
    }

    #[tokio::test]
    async fn cookies_set_during_redirects_stay_in_the_jar() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/login_int.php"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("set-cookie", "NIJIEIJIEID=abc; Path=/")
                    .insert_header("location", "/home"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/home"))
            .respond_with(ResponseTemplate::new(200).set_body_string("welcome"))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let login = client
            .send(Request::post(&format!("{}/login_int.php", server.uri())).form("email", "user"))
            .await
            .unwrap();
        assert_eq!(login.status, 200);
        assert!(login.cookies.is_empty());

        let cookies = client.cookies(&format!("{}/", server.uri()));
        assert_eq!(cookies, ["NIJIEIJIEID=abc"]);

        // Restoring the pairs into a fresh client brings the session back.
        Mock::given(method("GET"))
            .and(path("/members_illust.php"))
            .and(header("cookie", "NIJIEIJIEID=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("works"))
            .expect(1)
            .mount(&server)
            .await;

        let fresh = HttpClient::new().unwrap();
        for cookie in &cookies {
            fresh.add_cookie(cookie, &format!("{}/", server.uri()));
        }
        let page = fresh
            .send(Request::get(&format!("{}/members_illust.php", server.uri())))
            .await
            .unwrap();
        assert_eq!(page.text, "works");
    }

    #[tokio::test]
    async fn root_cookies_reach_every_path() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(header("cookie", "agegate_state=1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("adult"))
            .expect(2)
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        client.add_cookie("agegate_state=1", &format!("{}/", server.uri()));

        for page in ["/gallery/", "/art/Work-26"] {
            let res = client
                .send(Request::get(&format!("{}{}", server.uri(), page)))
                .await
                .unwrap();
            assert_eq!(res.text, "adult", "cookie missing for {}", page);
        }
    }

    #[tokio::test]
    async fn session_maps_missing_pages() {
        let server = MockServer::start().await;
        let session = Session::new(Arc::new(HttpClient::new().unwrap()));

        let result = session.get_text(&format!("{}/nothing", server.uri())).await;
        assert!(matches!(result, Err(ExtractorError::NotFound { resource: None })));
    }
}
