//! Extractors for http://www.imagebam.com/
use async_trait::async_trait;
use serde_json::Value;

use super::registry::Registration;
use super::{Context, Entry, Extractor, ExtractorInfo, ExtractorTest, Extractors, Page, Pager, UrlMatch};
use crate::error::ExtractorError;
use crate::http::Request;
use crate::message::Metadata;
use crate::metadata;
use crate::text;

const URL_BASE: &str = "http://www.imagebam.com";
const NEXT_BUTTON: &str = "class=\"btn btn-default\" title=\"Next\">";

pub const GALLERY: Registration = Registration {
    info: &ExtractorInfo {
        category: "imagebam",
        subcategory: "gallery",
        description: "Extractor for image galleries from imagebam.com",
        patterns: &[r"(?:https?://)?(?:www\.)?imagebam\.com/gallery/([^/]+).*"],
        directory_fmt: &["{category}", "{title} - {gallery-key}"],
        filename_fmt: "{num:>03}-{filename}",
        tests: &[ExtractorTest {
            url: "http://www.imagebam.com/gallery/adz2y0f9574bjpmonaismyrhtjgvey4o",
            fingerprint: None,
        }],
    },
    build: |info, url_match| Extractors::ImagebamGallery(ImagebamGallery::new(info, url_match)),
};

pub const IMAGE: Registration = Registration {
    info: &ExtractorInfo {
        category: "imagebam",
        subcategory: "image",
        description: "Extractor for single images from imagebam.com",
        patterns: &[r"(?:https?://)?(?:www\.)?imagebam\.com/image/([0-9a-f]{15})"],
        directory_fmt: &["{category}"],
        filename_fmt: "{filename}",
        tests: &[ExtractorTest {
            url: "http://www.imagebam.com/image/94d56c502511890",
            fingerprint: None,
        }],
    },
    build: |info, url_match| Extractors::ImagebamImage(ImagebamImage::new(info, url_match)),
};

/// Links on imagebam pages are either absolute or relative to [`URL_BASE`].
fn absolute(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("{}{}", URL_BASE, url)
    }
}

/// Walks a gallery one image page at a time, following the "Next" button.
pub struct ImagebamGallery {
    info: &'static ExtractorInfo,
    key: String,
    pager: Option<Pager>,
    num: u64,
}

impl ImagebamGallery {
    pub fn new(info: &'static ExtractorInfo, url_match: &UrlMatch) -> Self {
        Self {
            info,
            key: url_match.group(1).to_string(),
            pager: None,
            num: 0,
        }
    }
}

#[async_trait]
impl Extractor for ImagebamGallery {
    fn info(&self) -> &'static ExtractorInfo {
        self.info
    }

    async fn metadata(&mut self, ctx: &Context) -> Result<Metadata, ExtractorError> {
        let url = format!("{}/gallery/{}", URL_BASE, self.key);
        let page = ctx
            .session
            .request(Request::get(&url).encoding("utf-8"))
            .await?
            .text;

        let (data, _) = text::extract_all(
            &page,
            &[
                (None, "<img src='/img/icons/photos.png'", ""),
                (Some("title"), "'> ", " <"),
                (Some("count"), "'>", " images"),
                (Some("first-url"), "<a href='http://www.imagebam.com", "'"),
            ],
            0,
            metadata! { "category" => self.info.category, "gallery-key" => self.key.as_str() },
        );

        let first = data
            .get("first-url")
            .and_then(Value::as_str)
            .ok_or_else(|| ExtractorError::missing_field("first-url"))?;
        self.pager = Some(Pager::links(first));
        Ok(data)
    }

    async fn next_page(&mut self, ctx: &Context) -> Result<Option<Page>, ExtractorError> {
        let Some(pager) = self.pager.as_mut().filter(|p| !p.is_done()) else {
            return Ok(None);
        };
        let current = pager.url().map(absolute).unwrap_or_default();
        let page = ctx.session.get_text(&current).await?;

        // The link target precedes the button's class attribute.
        let (next, pos) = match page.find(NEXT_BUTTON) {
            Some(button) => match page[..button].rfind(" href=\"") {
                Some(href) => text::extract(&page, " href=\"", "\"", href),
                None => (None, button),
            },
            None => (None, 0),
        };
        let (image_id, pos) = text::extract(&page, "<img class=\"image\" id=\"", "\"", pos);
        let (image_url, _) = text::extract(&page, " src=\"", "\"", pos);

        // A gallery's last page links back to itself.
        let next = next.map(absolute).filter(|next| *next != current);
        pager.advance_link(next);

        self.num += 1;
        let mut data = metadata! { "id" => image_id, "num" => self.num };
        let url = image_url.map(ToString::to_string);
        if let Some(url) = &url {
            text::nameext_from_url(url, &mut data);
        }
        Ok(Some(Page::new(vec![Entry::new(url, data)])))
    }
}

pub struct ImagebamImage {
    info: &'static ExtractorInfo,
    token: String,
    done: bool,
}

impl ImagebamImage {
    pub fn new(info: &'static ExtractorInfo, url_match: &UrlMatch) -> Self {
        Self {
            info,
            token: url_match.group(1).to_string(),
            done: false,
        }
    }
}

#[async_trait]
impl Extractor for ImagebamImage {
    fn info(&self) -> &'static ExtractorInfo {
        self.info
    }

    async fn metadata(&mut self, _ctx: &Context) -> Result<Metadata, ExtractorError> {
        Ok(metadata! { "category" => self.info.category, "token" => self.token.as_str() })
    }

    async fn next_page(&mut self, ctx: &Context) -> Result<Option<Page>, ExtractorError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let page = ctx
            .session
            .get_text(&format!("{}/image/{}", URL_BASE, self.token))
            .await?;
        let url = text::extract(&page, "property=\"og:image\" content=\"", "\"", 0)
            .0
            .map(ToString::to_string);

        let mut data = Metadata::new();
        if let Some(url) = &url {
            text::nameext_from_url(url, &mut data);
        }
        Ok(Some(Page::new(vec![Entry::new(url, data)])))
    }
}
