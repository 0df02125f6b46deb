//! Extractors for https://www.tumblr.com/ blogs, using the v1 read API.
use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use super::registry::Registration;
use super::{Context, Entry, Extractor, ExtractorInfo, ExtractorTest, Extractors, Page, Pager, UrlMatch};
use crate::error::ExtractorError;
use crate::http::Request;
use crate::message::{strip, Metadata};
use crate::text;

/// Posts per API page.
const PAGE_SIZE: usize = 20;

/// Fields of the blog description that only matter to tumblr itself.
const BOOKKEEPING_KEYS: &[&str] = &["cname", "description", "feeds"];

const DIRECTORY: &[&str] = &["{category}", "{user}"];
const FILENAME: &str = "{category}_{user}_{id}{offset}.{extension}";

pub const POST: Registration = Registration {
    info: &ExtractorInfo {
        category: "tumblr",
        subcategory: "post",
        description: "Extractor for images from a single post on tumblr",
        patterns: &[r"(?:https?://)?([^/?#]+?)\.tumblr\.com/post/(\d+)"],
        directory_fmt: DIRECTORY,
        filename_fmt: FILENAME,
        tests: &[ExtractorTest {
            url: "http://demo.tumblr.com/post/459265350",
            fingerprint: None,
        }],
    },
    build: |info, url_match| {
        let id = url_match.group(2).to_string();
        Extractors::Tumblr(Tumblr::new(info, url_match, Some(("id", id))))
    },
};

pub const TAG: Registration = Registration {
    info: &ExtractorInfo {
        category: "tumblr",
        subcategory: "tag",
        description: "Extractor for images from a tumblr-user by tag",
        patterns: &[r"(?:https?://)?([^/?#]+?)\.tumblr\.com/tagged/(.+)"],
        directory_fmt: DIRECTORY,
        filename_fmt: FILENAME,
        tests: &[ExtractorTest {
            url: "http://demo.tumblr.com/tagged/Times Square",
            fingerprint: None,
        }],
    },
    build: |info, url_match| {
        let tag = text::unquote(url_match.group(2));
        Extractors::Tumblr(Tumblr::new(info, url_match, Some(("tagged", tag))))
    },
};

pub const USER: Registration = Registration {
    info: &ExtractorInfo {
        category: "tumblr",
        subcategory: "user",
        description: "Extractor for all images from a tumblr-user",
        patterns: &[r"(?:https?://)?([^/?#]+?)\.tumblr\.com(?:/page/\d+)?/?$"],
        directory_fmt: DIRECTORY,
        filename_fmt: FILENAME,
        tests: &[
            ExtractorTest {
                url: "http://demo.tumblr.com/",
                fingerprint: None,
            },
            ExtractorTest {
                url: "http://demo.example.tumblr.com/",
                fingerprint: None,
            },
        ],
    },
    build: |info, url_match| Extractors::Tumblr(Tumblr::new(info, url_match, None)),
};

pub struct Tumblr {
    info: &'static ExtractorInfo,
    user: String,
    api_url: String,
    /// Extra API filter (`id` for single posts, `tagged` for tags).
    filter: Option<(&'static str, String)>,
    pager: Pager,
    /// Posts of the first page, fetched together with the blog description.
    first: Option<Vec<Value>>,
}

impl Tumblr {
    pub fn new(info: &'static ExtractorInfo, url_match: &UrlMatch, filter: Option<(&'static str, String)>) -> Self {
        let user = url_match.group(1).to_string();
        Self {
            info,
            api_url: format!("https://{}.tumblr.com/api/read/json", user),
            user,
            filter,
            pager: Pager::offsets(0, PAGE_SIZE),
            first: None,
        }
    }

    async fn fetch(&self, ctx: &Context, start: u64) -> Result<Value, ExtractorError> {
        let mut request = Request::get(&self.api_url)
            .query("start", start)
            .query("type", "photo");
        if let Some((key, value)) = &self.filter {
            request = request.query(key, value);
        }
        let body = ctx.session.request(request).await?.text;
        parse_jsonp(&body)
    }

    async fn fetch_posts(&self, ctx: &Context, start: u64) -> Result<Vec<Value>, ExtractorError> {
        let mut data = self.fetch(ctx, start).await?;
        take_posts(&mut data)
    }
}

#[async_trait]
impl Extractor for Tumblr {
    fn info(&self) -> &'static ExtractorInfo {
        self.info
    }

    async fn metadata(&mut self, ctx: &Context) -> Result<Metadata, ExtractorError> {
        let mut data = self.fetch(ctx, self.pager.value()).await?;
        self.first = Some(take_posts(&mut data)?);

        let mut job = match data.get_mut("tumblelog").map(Value::take) {
            Some(Value::Object(blog)) => blog,
            _ => return Err(ExtractorError::missing_field("tumblelog")),
        };
        strip(&mut job, BOOKKEEPING_KEYS);
        job.insert("category".into(), Value::from(self.info.category));
        job.insert("user".into(), Value::from(self.user.as_str()));
        Ok(job)
    }

    async fn next_page(&mut self, ctx: &Context) -> Result<Option<Page>, ExtractorError> {
        let posts = match self.first.take() {
            Some(posts) => posts,
            None if self.pager.is_done() => return Ok(None),
            None => self.fetch_posts(ctx, self.pager.value()).await?,
        };
        self.pager.advance(posts.len());

        let entries = posts.into_iter().flat_map(images_from_post).collect();
        Ok(Some(Page::new(entries)))
    }
}

/// The API wraps its JSON in `var tumblr_api_read = {...};`.
fn parse_jsonp(body: &str) -> Result<Value, ExtractorError> {
    let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) else {
        return Err(ExtractorError::InvalidServerResponse);
    };
    if end < start {
        return Err(ExtractorError::InvalidServerResponse);
    }
    Ok(serde_json::from_str(&body[start..=end])?)
}

fn take_posts(data: &mut Value) -> Result<Vec<Value>, ExtractorError> {
    match data.get_mut("posts").map(Value::take) {
        Some(Value::Array(posts)) => Ok(posts),
        _ => Err(ExtractorError::missing_field("posts")),
    }
}

/// One entry per photo of a post. Posts without a `photos` field are not photo posts.
fn images_from_post(post: Value) -> Vec<Entry> {
    let Value::Object(mut post) = post else {
        return Vec::new();
    };
    let Some(photos) = post.remove("photos") else {
        debug!("Skipping post without photos");
        return Vec::new();
    };

    match photos {
        Value::Array(photos) if !photos.is_empty() => photos
            .into_iter()
            .map(|photo| {
                let mut data = post.clone();
                if let Value::Object(photo) = photo {
                    data.extend(photo);
                }
                photo_entry(data)
            })
            .collect(),
        _ => {
            post.insert("offset".into(), Value::from("o1"));
            vec![photo_entry(post)]
        }
    }
}

fn photo_entry(mut data: Metadata) -> Entry {
    let url = data
        .get("photo-url-1280")
        .and_then(Value::as_str)
        .map(ToString::to_string);
    if let Some(url) = &url {
        text::nameext_from_url(url, &mut data);
        let hash = data
            .get("name")
            .and_then(Value::as_str)
            .and_then(|name| text::extract(name, "_", "_", 0).0)
            .map(ToString::to_string);
        data.insert("hash".into(), hash.map_or(Value::Null, Value::from));
    }
    Entry::new(url, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::testing::{files, run, urls};
    use crate::http::mock::MockTransport;
    use crate::message::Message;
    use serde_json::json;
    use std::sync::Arc;

    const API: &str = "https://demo.tumblr.com/api/read/json";

    fn api_url(start: u64, filter: Option<(&str, &str)>) -> String {
        let mut request = Request::get(API).query("start", start).query("type", "photo");
        if let Some((key, value)) = filter {
            request = request.query(key, value);
        }
        request.full_url()
    }

    fn photo_post(id: u64) -> Value {
        json!({
            "id": id.to_string(),
            "type": "photo",
            "photo-url-1280": format!("https://media.tumblr.com/tumblr_{}abc_1280.jpg", id),
            "photos": [],
        })
    }

    fn jsonp(posts: Vec<Value>) -> String {
        let data = json!({
            "tumblelog": {
                "title": "Demo",
                "name": "demo",
                "cname": false,
                "description": "A demo blog",
                "feeds": [],
                "timezone": "US/Eastern",
            },
            "posts-start": 0,
            "posts": posts,
        });
        format!("var tumblr_api_read = {};\n", data)
    }

    #[tokio::test]
    async fn user_listing_pages_by_offset() {
        let transport = Arc::new(MockTransport::new());
        transport.get(&api_url(0, None), &jsonp((1..=20).map(photo_post).collect()));
        transport.get(&api_url(20, None), &jsonp((21..=23).map(photo_post).collect()));

        let messages = run("http://demo.tumblr.com/", transport).await.unwrap();

        let Message::Directory(job) = &messages[1] else {
            panic!("expected directory metadata");
        };
        assert_eq!(job["user"], "demo");
        assert_eq!(job["title"], "Demo");
        assert!(!job.contains_key("cname"));
        assert!(!job.contains_key("description"));
        assert!(!job.contains_key("feeds"));

        let data = files(&messages);
        assert_eq!(data.len(), 23);
        assert_eq!(data[0]["offset"], "o1");
        assert_eq!(data[0]["hash"], "1abc");
        assert_eq!(data[0]["timezone"], "US/Eastern");
        assert!(data.iter().all(|d| !d.contains_key("description")));
    }

    #[tokio::test]
    async fn photosets_and_non_photo_posts() {
        let transport = Arc::new(MockTransport::new());
        let photoset = json!({
            "id": "459265350",
            "photo-url-1280": "https://media.tumblr.com/tumblr_cover_1280.jpg",
            "photos": [
                {"offset": "o1", "photo-url-1280": "https://media.tumblr.com/tumblr_first_1280.png"},
                {"offset": "o2", "photo-url-1280": "https://media.tumblr.com/tumblr_second_1280.png"},
            ],
        });
        let text_post = json!({"id": "1", "type": "regular"});
        transport.get(
            &api_url(0, Some(("id", "459265350"))),
            &jsonp(vec![photoset, text_post]),
        );

        let messages = run("http://demo.tumblr.com/post/459265350", transport)
            .await
            .unwrap();

        assert_eq!(
            urls(&messages),
            [
                "https://media.tumblr.com/tumblr_first_1280.png",
                "https://media.tumblr.com/tumblr_second_1280.png",
            ]
        );
        let data = files(&messages);
        assert_eq!(data[1]["offset"], "o2");
        assert_eq!(data[1]["id"], "459265350");
        assert_eq!(data[1]["hash"], "second");
    }

    #[tokio::test]
    async fn tags_are_passed_to_the_api() {
        let transport = Arc::new(MockTransport::new());
        transport.get(
            &api_url(0, Some(("tagged", "Times Square"))),
            &jsonp(vec![photo_post(7)]),
        );

        let messages = run("http://demo.tumblr.com/tagged/Times%20Square", transport)
            .await
            .unwrap();
        assert_eq!(urls(&messages).len(), 1);
    }

    #[test]
    fn jsonp_without_object_is_rejected() {
        assert!(matches!(parse_jsonp("var x = ;"), Err(ExtractorError::InvalidServerResponse)));
        assert!(parse_jsonp("var tumblr_api_read = {\"posts\": []};").is_ok());
    }
}
