//! Site adapters and the machinery driving them.
//! # Extractors
//!
//! Every supported site is an [`Extractor`]: a value built from a successful pattern match that
//! knows how to produce the job metadata, page through the site's listing and hand back the
//! entries found on each page. The [`Registry`] maps URLs to extractors and the
//! [`MessageStream`] turns an extractor into the ordered [`Message`](crate::message::Message)
//! sequence consumed by jobs.
//!
//! ## Example
//! ```no_run
//! use gallery_downloader::cache::Cache;
//! use gallery_downloader::config::Config;
//! use gallery_downloader::extractors::{Context, MessageStream, Registry};
//! use gallery_downloader::http::HttpClient;
//! use std::sync::Arc;
//!
//! async fn test() {
//!     let registry = Registry::builtin().unwrap();
//!     let extractor = registry.resolve("https://konachan.com/pool/show/218").unwrap();
//!
//!     let transport = Arc::new(HttpClient::new().unwrap());
//!     let context = Context::new(transport, Cache::memory(), Arc::new(Config::default()));
//!
//!     let mut stream = MessageStream::new(extractor, context);
//!     while let Some(message) = stream.next().await.unwrap() {
//!         println!("{:?}", message);
//!     }
//! }
//! ```
use async_trait::async_trait;
use regex::Captures;
use std::sync::Arc;

use crate::cache::Cache;
use crate::config::Config;
use crate::error::ExtractorError;
use crate::http::{Session, Transport};
use crate::message::{Headers, Metadata};

pub mod booru;
pub mod deviantart;
pub mod imagebam;
pub mod imgtrex;
pub mod nijie;
pub mod pager;
pub mod registry;
pub mod stream;
pub mod tumblr;

pub use pager::Pager;
pub use registry::{Registration, Registry};
pub use stream::MessageStream;

/// A sample URL handled by an extractor, with the expected output digests when known.
#[derive(Debug, Clone, Copy)]
pub struct ExtractorTest {
    pub url: &'static str,
    /// `(url digest, keyword digest)` as computed by [`Fingerprint`](crate::message::Fingerprint)
    /// over the output recorded for this URL, checked by the extractor's tests.
    pub fingerprint: Option<(&'static str, &'static str)>,
}

/// Static description of one extractor.
#[derive(Debug)]
pub struct ExtractorInfo {
    pub category: &'static str,
    pub subcategory: &'static str,
    pub description: &'static str,
    /// Tried in order; the first one matching at the start of the URL wins.
    pub patterns: &'static [&'static str],
    /// Path segments of the output directory, one template each.
    pub directory_fmt: &'static [&'static str],
    pub filename_fmt: &'static str,
    pub tests: &'static [ExtractorTest],
}

impl ExtractorInfo {
    /// `category:subcategory`, unique among all registered extractors.
    pub fn name(&self) -> String {
        format!("{}:{}", self.category, self.subcategory)
    }
}

/// Capture groups of the pattern that selected an extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlMatch {
    groups: Vec<Option<String>>,
}

impl UrlMatch {
    pub(crate) fn from_captures(captures: &Captures<'_>) -> Self {
        Self {
            groups: captures
                .iter()
                .map(|g| g.map(|m| m.as_str().to_string()))
                .collect(),
        }
    }

    /// Group `index`, `0` being the whole match. Groups that did not participate are empty.
    pub fn group(&self, index: usize) -> &str {
        self.groups
            .get(index)
            .and_then(Option::as_deref)
            .unwrap_or_default()
    }
}

/// One resource found on a listing page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entry {
    /// Final download URL. Entries still lacking it after [`Extractor::resolve`] are skipped.
    pub url: Option<String>,
    /// Page to visit to find the download URL.
    pub detail: Option<String>,
    pub metadata: Metadata,
}

impl Entry {
    pub fn new(url: Option<String>, metadata: Metadata) -> Self {
        Self {
            url,
            detail: None,
            metadata,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Shared by every entry of the page.
    pub metadata: Metadata,
    pub entries: Vec<Entry>,
}

impl Page {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self {
            metadata: Metadata::new(),
            entries,
        }
    }
}

/// Everything an extractor may use while running.
pub struct Context {
    pub session: Session,
    pub cache: Cache,
    pub config: Arc<Config>,
}

impl Context {
    pub fn new(transport: Arc<dyn Transport>, cache: Cache, config: Arc<Config>) -> Self {
        Self {
            session: Session::new(transport),
            cache,
            config,
        }
    }

    /// Config lookup for `extractor.<category>.<key>`, honoring shallower overrides.
    pub fn option(&self, category: &str, key: &str) -> Option<String> {
        self.config.interpolate_str(&["extractor", category, key])
    }
}

/// This trait is the only interface [`MessageStream`] needs from a site adapter.
#[async_trait]
pub trait Extractor: Send {
    fn info(&self) -> &'static ExtractorInfo;

    /// Set up session headers and cookies before the first request.
    fn prepare(&self, _ctx: &Context) {}

    /// Log in if the site requires it. Runs before any message is produced.
    async fn authenticate(&mut self, _ctx: &Context) -> Result<(), ExtractorError> {
        Ok(())
    }

    /// Job-level metadata, emitted as the `Directory` message and merged into every file.
    async fn metadata(&mut self, ctx: &Context) -> Result<Metadata, ExtractorError>;

    /// Headers the downloader has to send along.
    fn headers(&self) -> Option<Headers> {
        None
    }

    /// Fetch the next page of the listing, or `None` once it is exhausted.
    async fn next_page(&mut self, ctx: &Context) -> Result<Option<Page>, ExtractorError>;

    /// Complete an entry that only references its detail page.
    ///
    /// Returning `Ok(None)` drops the entry.
    async fn resolve(&mut self, _ctx: &Context, entry: Entry) -> Result<Option<Entry>, ExtractorError> {
        Ok(Some(entry))
    }
}

/// The closed set of site adapters.
pub enum Extractors {
    Booru(booru::Booru),
    Tumblr(tumblr::Tumblr),
    ImagebamGallery(imagebam::ImagebamGallery),
    ImagebamImage(imagebam::ImagebamImage),
    Imgtrex(imgtrex::Imgtrex),
    DeviantartUser(deviantart::DeviantartUser),
    DeviantartImage(deviantart::DeviantartImage),
    NijieUser(nijie::NijieUser),
}

macro_rules! delegate {
    ($self:ident, $ex:ident => $body:expr) => {
        match $self {
            Extractors::Booru($ex) => $body,
            Extractors::Tumblr($ex) => $body,
            Extractors::ImagebamGallery($ex) => $body,
            Extractors::ImagebamImage($ex) => $body,
            Extractors::Imgtrex($ex) => $body,
            Extractors::DeviantartUser($ex) => $body,
            Extractors::DeviantartImage($ex) => $body,
            Extractors::NijieUser($ex) => $body,
        }
    };
}

#[async_trait]
impl Extractor for Extractors {
    fn info(&self) -> &'static ExtractorInfo {
        delegate!(self, ex => ex.info())
    }

    fn prepare(&self, ctx: &Context) {
        delegate!(self, ex => ex.prepare(ctx))
    }

    async fn authenticate(&mut self, ctx: &Context) -> Result<(), ExtractorError> {
        delegate!(self, ex => ex.authenticate(ctx).await)
    }

    async fn metadata(&mut self, ctx: &Context) -> Result<Metadata, ExtractorError> {
        delegate!(self, ex => ex.metadata(ctx).await)
    }

    fn headers(&self) -> Option<Headers> {
        delegate!(self, ex => ex.headers())
    }

    async fn next_page(&mut self, ctx: &Context) -> Result<Option<Page>, ExtractorError> {
        delegate!(self, ex => ex.next_page(ctx).await)
    }

    async fn resolve(&mut self, ctx: &Context, entry: Entry) -> Result<Option<Entry>, ExtractorError> {
        delegate!(self, ex => ex.resolve(ctx, entry).await)
    }
}

/// Build a [`Metadata`] map from `key => value` pairs.
#[macro_export]
macro_rules! metadata {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = $crate::message::Metadata::new();
        $(map.insert(String::from($key), serde_json::Value::from($value));)*
        map
    }};
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::http::mock::MockTransport;
    use crate::message::Message;

    pub fn context(transport: Arc<MockTransport>) -> Context {
        Context::new(transport, Cache::memory(), Arc::new(Config::default()))
    }

    /// Resolve `url` with the builtin registry and drain the resulting stream.
    pub async fn run(url: &str, transport: Arc<MockTransport>) -> Result<Vec<Message>, ExtractorError> {
        let registry = Registry::builtin()?;
        let extractor = registry.resolve(url)?;
        MessageStream::new(extractor, context(transport)).collect().await
    }

    pub fn urls(messages: &[Message]) -> Vec<&str> {
        messages
            .iter()
            .filter_map(|m| match m {
                Message::Url(url, _) => Some(url.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn files(messages: &[Message]) -> Vec<&Metadata> {
        messages
            .iter()
            .filter_map(|m| match m {
                Message::Url(_, data) => Some(data),
                _ => None,
            })
            .collect()
    }
}
