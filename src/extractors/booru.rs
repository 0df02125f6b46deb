//! Extractors for danbooru-like imageboards.
//!
//! All of them expose the same kind of API: a post listing filtered by a tag query, returning
//! `limit` posts per page as JSON or XML. Pools and single posts are just special tag queries
//! (`pool:<id>`, `id:<id>`).
use async_trait::async_trait;
use log::debug;
use roxmltree::Document;
use serde_json::Value;

use super::registry::Registration;
use super::{Context, Entry, Extractor, ExtractorInfo, ExtractorTest, Extractors, Page, Pager, UrlMatch};
use crate::error::ExtractorError;
use crate::http::{Request, USER_AGENT};
use crate::message::{Headers, Metadata};
use crate::text;

const E621_USER_AGENT: &str = concat!(
    "Rust Gallery Downloader/",
    env!("CARGO_PKG_VERSION"),
    " (by e621 user FerrahWolfeh)"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFormat {
    Json,
    /// Posts are child elements of the root, their fields are attributes.
    Xml,
}

/// Everything that differs between booru sites.
#[derive(Debug)]
pub struct BooruSite {
    pub category: &'static str,
    pub api_url: &'static str,
    /// Joined with relative file URLs.
    pub base_url: &'static str,
    pub format: ApiFormat,
    /// Max number of posts per page.
    pub limit: usize,
    pub page_param: &'static str,
    pub page_start: u64,
    /// JSON pointers to the file URL and MD5 inside a post.
    pub file_url: &'static str,
    pub md5: &'static str,
    /// Key of the post list when the API wraps it in an object.
    pub posts_key: Option<&'static str>,
    pub user_agent: &'static str,
}

pub const DANBOORU: BooruSite = BooruSite {
    category: "danbooru",
    api_url: "https://danbooru.donmai.us/posts.json",
    base_url: "https://danbooru.donmai.us",
    format: ApiFormat::Json,
    limit: 200,
    page_param: "page",
    page_start: 1,
    file_url: "/file_url",
    md5: "/md5",
    posts_key: None,
    user_agent: USER_AGENT,
};

pub const E621: BooruSite = BooruSite {
    category: "e621",
    api_url: "https://e621.net/posts.json",
    base_url: "https://e621.net",
    format: ApiFormat::Json,
    limit: 320,
    page_param: "page",
    page_start: 1,
    file_url: "/file/url",
    md5: "/file/md5",
    posts_key: Some("posts"),
    user_agent: E621_USER_AGENT,
};

pub const GELBOORU: BooruSite = BooruSite {
    category: "gelbooru",
    api_url: "https://gelbooru.com/index.php?page=dapi&s=post&q=index",
    base_url: "https://gelbooru.com",
    format: ApiFormat::Xml,
    limit: 100,
    page_param: "pid",
    page_start: 0,
    file_url: "/file_url",
    md5: "/md5",
    posts_key: None,
    user_agent: USER_AGENT,
};

pub const KONACHAN: BooruSite = BooruSite {
    category: "konachan",
    api_url: "https://konachan.com/post.json",
    base_url: "https://konachan.com",
    format: ApiFormat::Json,
    limit: 100,
    page_param: "page",
    page_start: 1,
    file_url: "/file_url",
    md5: "/md5",
    posts_key: None,
    user_agent: USER_AGENT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Tag,
    Pool,
    Post,
}

macro_rules! booru_extractor {
    ($name:ident, $build:ident, $site:ident, $kind:expr, $description:expr, [$($pattern:expr),+ $(,)?], $directory:expr, [$($test:expr),+ $(,)?]) => {
        fn $build(info: &'static ExtractorInfo, url_match: &UrlMatch) -> Extractors {
            Extractors::Booru(Booru::new(info, &$site, $kind, url_match))
        }

        pub const $name: Registration = Registration {
            info: &ExtractorInfo {
                category: $site.category,
                subcategory: match $kind {
                    Kind::Tag => "tag",
                    Kind::Pool => "pool",
                    Kind::Post => "post",
                },
                description: $description,
                patterns: &[$($pattern),+],
                directory_fmt: $directory,
                filename_fmt: "{category}_{id}_{md5}.{extension}",
                tests: &[$(ExtractorTest { url: $test, fingerprint: None }),+],
            },
            build: $build,
        };
    };
}

const TAG_DIRECTORY: &[&str] = &["{category}", "{tags}"];
const POOL_DIRECTORY: &[&str] = &["{category}", "pool", "{pool}"];
const POST_DIRECTORY: &[&str] = &["{category}"];

booru_extractor!(
    DANBOORU_TAG, danbooru_tag, DANBOORU, Kind::Tag,
    "Extractor for images from danbooru based on search-tags",
    [r"(?:https?://)?(?:www\.)?danbooru\.donmai\.us/posts\?(?:utf8=%E2%9C%93&)?tags=([^&]+)"],
    TAG_DIRECTORY,
    ["https://danbooru.donmai.us/posts?tags=bonocho"]
);
booru_extractor!(
    DANBOORU_POOL, danbooru_pool, DANBOORU, Kind::Pool,
    "Extractor for image-pools from danbooru",
    [r"(?:https?://)?(?:www\.)?danbooru\.donmai\.us/pools/(\d+)"],
    POOL_DIRECTORY,
    ["https://danbooru.donmai.us/pools/7659"]
);
booru_extractor!(
    DANBOORU_POST, danbooru_post, DANBOORU, Kind::Post,
    "Extractor for single images from danbooru",
    [r"(?:https?://)?(?:www\.)?danbooru\.donmai\.us/posts/(\d+)"],
    POST_DIRECTORY,
    ["https://danbooru.donmai.us/posts/294929"]
);
booru_extractor!(
    E621_TAG, e621_tag, E621, Kind::Tag,
    "Extractor for images from e621 based on search-tags",
    [
        r"(?:https?://)?(?:www\.)?e621\.net/post/index/\d+/([^?]+)",
        r"(?:https?://)?(?:www\.)?e621\.net/posts?\?tags=([^&]+)",
    ],
    TAG_DIRECTORY,
    ["https://e621.net/post/index/1/anry", "https://e621.net/posts?tags=anry"]
);
booru_extractor!(
    E621_POOL, e621_pool, E621, Kind::Pool,
    "Extractor for image-pools from e621",
    [r"(?:https?://)?(?:www\.)?e621\.net/pools?/(?:show/)?(\d+)"],
    POOL_DIRECTORY,
    ["https://e621.net/pool/show/73", "https://e621.net/pools/73"]
);
booru_extractor!(
    E621_POST, e621_post, E621, Kind::Post,
    "Extractor for single images from e621",
    [r"(?:https?://)?(?:www\.)?e621\.net/posts?/(?:show/)?(\d+)"],
    POST_DIRECTORY,
    ["https://e621.net/post/show/535", "https://e621.net/posts/535"]
);
booru_extractor!(
    GELBOORU_TAG, gelbooru_tag, GELBOORU, Kind::Tag,
    "Extractor for images from gelbooru based on search-tags",
    [r"(?:https?://)?(?:www\.)?gelbooru\.com/(?:index\.php)?\?page=post&s=list&tags=([^&]+)"],
    TAG_DIRECTORY,
    ["https://gelbooru.com/index.php?page=post&s=list&tags=bonocho"]
);
booru_extractor!(
    GELBOORU_POST, gelbooru_post, GELBOORU, Kind::Post,
    "Extractor for single images from gelbooru",
    [r"(?:https?://)?(?:www\.)?gelbooru\.com/(?:index\.php)?\?page=post&s=view&id=(\d+)"],
    POST_DIRECTORY,
    ["https://gelbooru.com/index.php?page=post&s=view&id=313638"]
);
booru_extractor!(
    KONACHAN_TAG, konachan_tag, KONACHAN, Kind::Tag,
    "Extractor for images from konachan based on search-tags",
    [r"(?:https?://)?(?:www\.)?konachan\.(?:com|net)/post\?tags=([^&]+)"],
    TAG_DIRECTORY,
    ["https://konachan.com/post?tags=patata"]
);
booru_extractor!(
    KONACHAN_POOL, konachan_pool, KONACHAN, Kind::Pool,
    "Extractor for image-pools from konachan",
    [r"(?:https?://)?(?:www\.)?konachan\.(?:com|net)/pool/show/(\d+)"],
    POOL_DIRECTORY,
    ["https://konachan.com/pool/show/95"]
);
booru_extractor!(
    KONACHAN_POST, konachan_post, KONACHAN, Kind::Post,
    "Extractor for single images from konachan",
    [r"(?:https?://)?(?:www\.)?konachan\.(?:com|net)/post/show/(\d+)"],
    POST_DIRECTORY,
    ["https://konachan.com/post/show/205189"]
);

pub struct Booru {
    info: &'static ExtractorInfo,
    site: &'static BooruSite,
    kind: Kind,
    /// The value of the `tags` query parameter.
    query: String,
    job: Metadata,
    pager: Pager,
}

impl Booru {
    pub fn new(info: &'static ExtractorInfo, site: &'static BooruSite, kind: Kind, url_match: &UrlMatch) -> Self {
        let mut job = Metadata::new();
        job.insert("category".into(), Value::from(site.category));

        let query = match kind {
            Kind::Tag => {
                let tags = text::unquote(url_match.group(1)).replace('+', " ");
                job.insert("tags".into(), Value::from(tags.clone()));
                tags
            }
            Kind::Pool => {
                let pool = url_match.group(1);
                job.insert("pool".into(), Value::from(pool));
                format!("pool:{}", pool)
            }
            Kind::Post => format!("id:{}", url_match.group(1)),
        };
        debug!("Tag query: {}", query);

        Self {
            info,
            site,
            kind,
            query,
            job,
            pager: Pager::pages(site.page_start, site.limit),
        }
    }

    #[inline]
    pub const fn kind(&self) -> Kind {
        self.kind
    }

    /// Split an API response into raw post objects.
    fn parse_posts(&self, body: &str) -> Result<Vec<Metadata>, ExtractorError> {
        match self.site.format {
            ApiFormat::Json => {
                let mut value: Value = serde_json::from_str(body)?;
                if let Some(key) = self.site.posts_key {
                    value = value
                        .get_mut(key)
                        .map(Value::take)
                        .ok_or_else(|| ExtractorError::missing_field(key))?;
                }
                let Value::Array(items) = value else {
                    return Err(ExtractorError::InvalidServerResponse);
                };
                Ok(items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(post) => Some(post),
                        _ => None,
                    })
                    .collect())
            }
            ApiFormat::Xml => {
                let doc = Document::parse(body)?;
                Ok(doc
                    .root_element()
                    .children()
                    .filter(roxmltree::Node::is_element)
                    .map(|node| {
                        node.attributes()
                            .map(|attr| (attr.name().to_string(), Value::from(attr.value())))
                            .collect()
                    })
                    .collect())
            }
        }
    }

    fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("//") {
            format!("https:{}", url)
        } else if url.starts_with('/') {
            format!("{}{}", self.site.base_url, url)
        } else {
            url.to_string()
        }
    }

    fn entry(&self, mut data: Metadata) -> Entry {
        let url = lookup(&data, self.site.file_url)
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(|url| self.absolute_url(url));

        if !data.contains_key("md5") {
            if let Some(md5) = lookup(&data, self.site.md5).cloned() {
                data.insert("md5".into(), md5);
            }
        }
        data.insert("category".into(), Value::from(self.site.category));
        if let Some(url) = &url {
            text::nameext_from_url(url, &mut data);
        }
        Entry::new(url, data)
    }
}

/// Resolve a JSON pointer against a post object.
fn lookup<'a>(data: &'a Metadata, pointer: &str) -> Option<&'a Value> {
    let mut parts = pointer.trim_start_matches('/').splitn(2, '/');
    let value = data.get(parts.next()?)?;
    match parts.next() {
        Some(rest) => value.pointer(&format!("/{}", rest)),
        None => Some(value),
    }
}

#[async_trait]
impl Extractor for Booru {
    fn info(&self) -> &'static ExtractorInfo {
        self.info
    }

    fn prepare(&self, ctx: &Context) {
        ctx.session.set_header("User-Agent", self.site.user_agent);
    }

    async fn metadata(&mut self, _ctx: &Context) -> Result<Metadata, ExtractorError> {
        Ok(self.job.clone())
    }

    fn headers(&self) -> Option<Headers> {
        Some(Headers::from([(
            "User-Agent".to_string(),
            self.site.user_agent.to_string(),
        )]))
    }

    async fn next_page(&mut self, ctx: &Context) -> Result<Option<Page>, ExtractorError> {
        if self.pager.is_done() {
            return Ok(None);
        }

        let request = Request::get(self.site.api_url)
            .query("limit", self.site.limit)
            .query("tags", &self.query)
            .query(self.site.page_param, self.pager.value());
        let body = ctx.session.request(request).await?.text;

        let posts = self.parse_posts(&body)?;
        self.pager.advance(posts.len());

        Ok(Some(Page::new(
            posts.into_iter().map(|post| self.entry(post)).collect(),
        )))
    }
}
