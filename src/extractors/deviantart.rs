//! Extractors for http://www.deviantart.com/
use async_trait::async_trait;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::registry::Registration;
use super::{Context, Entry, Extractor, ExtractorInfo, ExtractorTest, Extractors, Page, Pager, UrlMatch};
use crate::error::ExtractorError;
use crate::http::Request;
use crate::message::Metadata;
use crate::metadata;
use crate::text;

/// Thumbnails per gallery page.
const PAGE_SIZE: usize = 24;

static TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+) by (.+), ([A-Z][a-z]{2} \d+, \d{4}) in").unwrap());
static HREF: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^[^"]+-(\d+)"#).unwrap());

const DIRECTORY: &[&str] = &["{category}", "{artist}"];
const FILENAME: &str = "{category}_{index}_{title}.{extension}";

pub const IMAGE: Registration = Registration {
    info: &ExtractorInfo {
        category: "deviantart",
        subcategory: "image",
        description: "Extractor for single images from deviantart.com",
        patterns: &[r"(?:https?://)?[^.]+\.deviantart\.com/art/.+-(\d+)"],
        directory_fmt: DIRECTORY,
        filename_fmt: FILENAME,
        tests: &[ExtractorTest {
            url: "http://shimoda7.deviantart.com/art/For-the-sake-of-a-memory-10073852",
            fingerprint: None,
        }],
    },
    build: |info, url_match| Extractors::DeviantartImage(DeviantartImage::new(info, url_match)),
};

pub const USER: Registration = Registration {
    info: &ExtractorInfo {
        category: "deviantart",
        subcategory: "user",
        description: "Extractor for all works from an artist on deviantart.com",
        patterns: &[r"(?:https?://)?([^.]+)\.deviantart\.com(?:/gallery)?/?$"],
        directory_fmt: DIRECTORY,
        filename_fmt: FILENAME,
        tests: &[ExtractorTest {
            url: "http://shimoda7.deviantart.com/gallery/",
            fingerprint: None,
        }],
    },
    build: |info, url_match| Extractors::DeviantartUser(DeviantartUser::new(info, url_match)),
};

/// Value of the HTML attribute `name` in `txt`.
fn attribute<'a>(txt: &'a str, name: &str) -> Option<&'a str> {
    text::extract(txt, &format!(" {}=\"", name), "\"", 0).0
}

/// Gallery listing of one artist.
///
/// Thumbnails usually carry the full-size URL; the rest are completed from their detail page.
pub struct DeviantartUser {
    info: &'static ExtractorInfo,
    artist: String,
    pager: Pager,
}

impl DeviantartUser {
    pub fn new(info: &'static ExtractorInfo, url_match: &UrlMatch) -> Self {
        Self {
            info,
            artist: url_match.group(1).to_string(),
            pager: Pager::offsets(0, PAGE_SIZE),
        }
    }

    fn site_url(&self) -> String {
        format!("http://{}.deviantart.com/", self.artist)
    }

    fn gallery_url(&self) -> String {
        format!("{}gallery/", self.site_url())
    }

    fn thumbnail(image: &str) -> Entry {
        let title = attribute(image, "title").and_then(|t| TITLE.captures(t));
        let href = attribute(image, "href").and_then(|h| HREF.captures(h));
        let (Some(title), Some(href)) = (title, href) else {
            debug!("Skipping thumbnail without title or link");
            return Entry::default();
        };

        let mut data = metadata! {
            "index" => &href[1],
            "title" => text::unescape(&title[1]),
            "artist" => &title[2],
            "date" => &title[3],
        };

        let full = attribute(image, "data-super-full-img")
            .map(|url| (url, "data-super-full-width", "data-super-full-height"));
        let sized = attribute(image, "data-super-img").map(|url| (url, "data-super-width", "data-super-height"));

        match full.or(sized) {
            Some((url, width, height)) => {
                data.insert("width".into(), Value::from(attribute(image, width)));
                data.insert("height".into(), Value::from(attribute(image, height)));
                text::nameext_from_url(url, &mut data);
                Entry::new(Some(url.to_string()), data)
            }
            None => Entry {
                url: None,
                detail: Some(href[0].to_string()),
                metadata: data,
            },
        }
    }
}

#[async_trait]
impl Extractor for DeviantartUser {
    fn info(&self) -> &'static ExtractorInfo {
        self.info
    }

    /// The age gate cookie is scoped to `/` so detail pages under `/art/` get it too.
    fn prepare(&self, ctx: &Context) {
        ctx.session.add_cookie("agegate_state=1", &self.site_url());
    }

    async fn metadata(&mut self, _ctx: &Context) -> Result<Metadata, ExtractorError> {
        Ok(metadata! { "category" => self.info.category, "artist" => self.artist.as_str() })
    }

    async fn next_page(&mut self, ctx: &Context) -> Result<Option<Page>, ExtractorError> {
        if self.pager.is_done() {
            return Ok(None);
        }

        let request = Request::get(&self.gallery_url())
            .query("catpath", "/")
            .query("offset", self.pager.value());
        let page = ctx.session.request(request).await?.text;

        let (_, start) = text::extract(&page, "<div data-dwait-click=\"GMI.wake\"", "", 0);
        let entries: Vec<Entry> = text::extract_iter(&page[start..], "<a class=\"thumb", "</a>")
            .map(Self::thumbnail)
            .collect();
        self.pager.advance(entries.len());

        Ok(Some(Page::new(entries)))
    }

    async fn resolve(&mut self, ctx: &Context, mut entry: Entry) -> Result<Option<Entry>, ExtractorError> {
        let Some(detail) = entry.detail.take() else {
            return Ok(Some(entry));
        };
        let page = ctx.session.get_text(&detail).await?;

        let (_, pos) = text::extract(&page, " class=\"dev-content-normal \"", "", 0);
        let (url, pos) = text::extract(&page, " src=\"", "\"", pos);
        let (width, pos) = text::extract(&page, " width=\"", "\"", pos);
        let (height, _) = text::extract(&page, " height=\"", "\"", pos);

        let data = &mut entry.metadata;
        data.insert("width".into(), Value::from(width));
        data.insert("height".into(), Value::from(height));
        if let Some(url) = url {
            text::nameext_from_url(url, data);
        }
        entry.url = url.map(ToString::to_string);
        Ok(Some(entry))
    }
}

/// A single deviation, described by its OpenGraph tags.
pub struct DeviantartImage {
    info: &'static ExtractorInfo,
    url: String,
    index: String,
    image: Option<String>,
    done: bool,
}

impl DeviantartImage {
    pub fn new(info: &'static ExtractorInfo, url_match: &UrlMatch) -> Self {
        Self {
            info,
            url: url_match.group(0).to_string(),
            index: url_match.group(1).to_string(),
            image: None,
            done: false,
        }
    }
}

#[async_trait]
impl Extractor for DeviantartImage {
    fn info(&self) -> &'static ExtractorInfo {
        self.info
    }

    async fn metadata(&mut self, ctx: &Context) -> Result<Metadata, ExtractorError> {
        let url = if self.url.contains("://") {
            self.url.clone()
        } else {
            format!("http://{}", self.url)
        };
        let page = ctx.session.get_text(&url).await?;

        let (mut data, _) = text::extract_all(
            &page,
            &[
                (Some("title"), "\"og:title\" content=\"", "\""),
                (Some("image"), "\"og:image\" content=\"", "\""),
                (Some("width"), "\"og:image:width\" content=\"", "\""),
                (Some("height"), "\"og:image:height\" content=\"", "\""),
                (Some("url"), "\"og:url\" content=\"", "\""),
                (Some("description"), "\"og:description\" content=\"", "\""),
                (None, "<span class=\"tt-w\">", ""),
                (Some("date"), "title=\"", "\""),
            ],
            0,
            metadata! { "category" => self.info.category, "index" => self.index.as_str() },
        );

        let string = |data: &Metadata, key: &str| data.get(key).and_then(Value::as_str).map(ToString::to_string);

        if let Some(description) = string(&data, "description") {
            // The description is escaped twice.
            let description = text::unescape(&text::unescape(&description));
            data.insert("description".into(), Value::from(description));
        }
        let artist = string(&data, "url").and_then(|url| text::extract(&url, "//", ".", 0).0.map(ToString::to_string));
        data.insert("artist".into(), Value::from(artist));

        let title_len = string(&data, "title").map_or(0, |title| title.len());
        let date = string(&data, "date").and_then(|date| text::extract(&date, ", ", " in ", title_len).0.map(ToString::to_string));
        data.insert("date".into(), Value::from(date));

        self.image = string(&data, "image");
        if let Some(image) = &self.image {
            text::nameext_from_url(image, &mut data);
        }
        Ok(data)
    }

    async fn next_page(&mut self, _ctx: &Context) -> Result<Option<Page>, ExtractorError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        Ok(Some(Page::new(vec![Entry::new(self.image.clone(), Metadata::new())])))
    }
}
