//! Extractor for works of an artist on https://nijie.info/
//!
//! The site only shows anything to logged-in users. Session cookies are memoized per username
//! for a month, so consecutive runs log in only once.
use async_trait::async_trait;
use log::{debug, info};
use std::collections::VecDeque;

use super::registry::Registration;
use super::{Context, Entry, Extractor, ExtractorInfo, ExtractorTest, Extractors, Page, UrlMatch};
use crate::cache::CacheKey;
use crate::error::ExtractorError;
use crate::http::{Request, Session};
use crate::message::Metadata;
use crate::metadata;
use crate::text;

const LOGIN_URL: &str = "https://nijie.info/login_int.php";
const POPUP_URL: &str = "https://nijie.info/view_popup.php?id=";
const COOKIE_URL: &str = "https://nijie.info/";
/// 30 days.
const LOGIN_MAX_AGE: u64 = 30 * 24 * 60 * 60;

pub const USER: Registration = Registration {
    info: &ExtractorInfo {
        category: "nijie",
        subcategory: "user",
        description: "Extractor for works of a nijie-user",
        patterns: &[r"(?:https?://)?(?:www\.)?nijie\.info/members(?:_illust)?\.php\?id=(\d+)"],
        directory_fmt: &["{category}", "{artist-id}"],
        filename_fmt: "{category}_{artist-id}_{image-id}_p{index:>02}.{extension}",
        tests: &[ExtractorTest {
            url: "https://nijie.info/members_illust.php?id=44",
            fingerprint: None,
        }],
    },
    build: |info, url_match| Extractors::NijieUser(NijieUser::new(info, url_match)),
};

pub struct NijieUser {
    info: &'static ExtractorInfo,
    artist_id: String,
    artist_url: String,
    /// `None` until the artist page has been read.
    image_ids: Option<VecDeque<String>>,
}

impl NijieUser {
    pub fn new(info: &'static ExtractorInfo, url_match: &UrlMatch) -> Self {
        let artist_id = url_match.group(1).to_string();
        Self {
            info,
            artist_url: format!("https://nijie.info/members_illust.php?id={}", artist_id),
            artist_id,
            image_ids: None,
        }
    }

    async fn image_ids(&self, ctx: &Context) -> Result<VecDeque<String>, ExtractorError> {
        let response = ctx.session.send(Request::get(&self.artist_url)).await?;
        match response.status {
            404 => return Err(ExtractorError::not_found("artist")),
            status if status >= 400 => {
                return Err(ExtractorError::HttpStatus {
                    status,
                    url: response.url,
                })
            }
            _ => {}
        }
        Ok(text::extract_iter(&response.text, " illust_id=\"", "\"")
            .map(ToString::to_string)
            .collect())
    }

    async fn images(&self, ctx: &Context, image_id: &str) -> Result<Vec<Entry>, ExtractorError> {
        let page = ctx.session.get_text(&format!("{}{}", POPUP_URL, image_id)).await?;
        let images: Vec<&str> = text::extract_iter(&page, "<img src=\"//pic", "\"").collect();
        let count = images.len();

        Ok(images
            .into_iter()
            .enumerate()
            .map(|(index, url)| {
                let mut data = metadata! {
                    "count" => count,
                    "index" => index,
                    "image-id" => image_id,
                };
                text::nameext_from_url(url, &mut data);
                Entry::new(Some(format!("https://pic{}", url)), data)
            })
            .collect())
    }
}

/// Post the credentials and return the session cookies the site hands out.
///
/// The cookies are read back from the session's jar, so cookies set on redirects are kept.
async fn login(session: &Session, username: &str, password: &str) -> Result<Vec<String>, ExtractorError> {
    info!("Logging in to nijie as {}", username);
    let request = Request::post(LOGIN_URL)
        .form("email", username)
        .form("password", password);
    let response = session.request(request).await?;

    if response.text.contains("//nijie.info/login.php") {
        return Err(ExtractorError::AuthenticationFailure);
    }
    Ok(session.cookies(COOKIE_URL))
}

#[async_trait]
impl Extractor for NijieUser {
    fn info(&self) -> &'static ExtractorInfo {
        self.info
    }

    fn prepare(&self, ctx: &Context) {
        ctx.session.set_header("Referer", &self.artist_url);
    }

    async fn authenticate(&mut self, ctx: &Context) -> Result<(), ExtractorError> {
        let (Some(username), Some(password)) = (
            ctx.option(self.info.category, "username"),
            ctx.option(self.info.category, "password"),
        ) else {
            return Err(ExtractorError::AuthenticationFailure);
        };

        let key = CacheKey::new("nijie.login").with_arg(&username);
        let cookies = ctx
            .cache
            .memoize(&key, LOGIN_MAX_AGE, || login(&ctx.session, &username, &password))
            .await?;

        debug!("Restoring {} nijie session cookies", cookies.len());
        for cookie in &cookies {
            ctx.session.add_cookie(cookie, COOKIE_URL);
        }
        Ok(())
    }

    async fn metadata(&mut self, _ctx: &Context) -> Result<Metadata, ExtractorError> {
        Ok(metadata! { "category" => self.info.category, "artist-id" => self.artist_id.as_str() })
    }

    async fn next_page(&mut self, ctx: &Context) -> Result<Option<Page>, ExtractorError> {
        if self.image_ids.is_none() {
            self.image_ids = Some(self.image_ids(ctx).await?);
        }
        let Some(image_id) = self.image_ids.as_mut().and_then(VecDeque::pop_front) else {
            return Ok(None);
        };
        Ok(Some(Page::new(self.images(ctx, &image_id).await?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::Config;
    use crate::extractors::testing::{files, urls};
    use crate::extractors::{MessageStream, Registry};
    use crate::http::mock::{MockReply, MockTransport};
    use crate::http::Method;
    use crate::message::Message;
    use std::sync::Arc;

    const ARTIST: &str = "https://nijie.info/members_illust.php?id=44";

    fn config(credentials: bool) -> Arc<Config> {
        let mut config = Config::default();
        if credentials {
            config.parse_option("extractor.nijie.username=user@example.org").unwrap();
            config.parse_option("extractor.nijie.password=secret").unwrap();
        }
        Arc::new(config)
    }

    fn site(transport: &MockTransport) {
        transport.push(
            Method::Post,
            LOGIN_URL,
            MockReply {
                status: 200,
                body: "<html>welcome</html>".into(),
                cookies: vec!["NIJIEIJIEID=abc; Path=/".into()],
            },
        );
        transport.get(
            ARTIST,
            "<div illust_id=\"100\"></div><div illust_id=\"200\"></div>",
        );
        transport.get(
            "https://nijie.info/view_popup.php?id=100",
            "<img src=\"//pic01.nijie.info/a/100_0.jpg\"><img src=\"//pic01.nijie.info/a/100_1.png\">",
        );
        transport.get(
            "https://nijie.info/view_popup.php?id=200",
            "<img src=\"//pic02.nijie.info/b/200_0.gif\">",
        );
    }

    async fn run(transport: Arc<MockTransport>, cache: Cache, config: Arc<Config>) -> Result<Vec<Message>, ExtractorError> {
        let extractor = Registry::builtin()?.resolve(ARTIST)?;
        let context = Context::new(transport, cache, config);
        MessageStream::new(extractor, context).collect().await
    }

    #[tokio::test]
    async fn artist_works_in_order() {
        let transport = Arc::new(MockTransport::new());
        site(&transport);

        let messages = run(transport.clone(), Cache::memory(), config(true)).await.unwrap();

        assert_eq!(
            urls(&messages),
            [
                "https://pic01.nijie.info/a/100_0.jpg",
                "https://pic01.nijie.info/a/100_1.png",
                "https://pic02.nijie.info/b/200_0.gif",
            ]
        );
        let data = files(&messages);
        assert_eq!(data[1]["index"], 1);
        assert_eq!(data[1]["count"], 2);
        assert_eq!(data[1]["image-id"], "100");
        assert_eq!(data[2]["artist-id"], "44");
        assert_eq!(data[2]["extension"], "gif");

        let referer = transport.requests()[1].headers.get("Referer").cloned();
        assert_eq!(referer.as_deref(), Some(ARTIST));
        assert_eq!(
            transport.added_cookies(),
            [("NIJIEIJIEID=abc".to_string(), COOKIE_URL.to_string())]
        );
    }

    #[tokio::test]
    async fn login_is_shared_between_runs() {
        let transport = Arc::new(MockTransport::new());
        site(&transport);
        let cache = Cache::memory();

        run(transport.clone(), cache.clone(), config(true)).await.unwrap();
        run(transport.clone(), cache, config(true)).await.unwrap();

        assert_eq!(transport.count(Method::Post, LOGIN_URL), 1);
        assert_eq!(transport.added_cookies().len(), 2);
    }

    #[tokio::test]
    async fn cached_session_is_restored_in_a_new_process() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite3");

        let first = Arc::new(MockTransport::new());
        site(&first);
        run(first.clone(), Cache::open(Some(path.clone())).await, config(true))
            .await
            .unwrap();

        // A second process with the same cache file must not log in again.
        let second = Arc::new(MockTransport::new());
        site(&second);
        let cache = Cache::open(Some(path)).await;
        assert!(cache.is_persistent());
        run(second.clone(), cache, config(true)).await.unwrap();

        assert_eq!(first.count(Method::Post, LOGIN_URL), 1);
        assert_eq!(second.count(Method::Post, LOGIN_URL), 0);
        assert_eq!(
            second.added_cookies(),
            [("NIJIEIJIEID=abc".to_string(), COOKIE_URL.to_string())]
        );
    }

    #[tokio::test]
    async fn rejected_login_produces_no_messages() {
        let transport = Arc::new(MockTransport::new());
        transport.post(LOGIN_URL, "<a href=\"//nijie.info/login.php\">login</a>");

        let mut stream = MessageStream::new(
            Registry::builtin().unwrap().resolve(ARTIST).unwrap(),
            Context::new(transport.clone(), Cache::memory(), config(true)),
        );
        assert!(matches!(stream.next().await, Err(ExtractorError::AuthenticationFailure)));
        assert!(stream.next().await.unwrap().is_none());
        assert_eq!(transport.count(Method::Get, ARTIST), 0);
    }

    #[tokio::test]
    async fn missing_credentials_fail_without_requests() {
        let transport = Arc::new(MockTransport::new());
        let result = run(transport.clone(), Cache::memory(), config(false)).await;
        assert!(matches!(result, Err(ExtractorError::AuthenticationFailure)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn unknown_artist_is_not_found() {
        let transport = Arc::new(MockTransport::new());
        transport.push(
            Method::Post,
            LOGIN_URL,
            MockReply {
                status: 200,
                body: String::new(),
                cookies: Vec::new(),
            },
        );
        let result = run(transport, Cache::memory(), config(true)).await;
        match result {
            Err(ExtractorError::NotFound { resource }) => assert_eq!(resource.as_deref(), Some("artist")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
