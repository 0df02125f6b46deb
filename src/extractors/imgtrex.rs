//! Extractor for single images from http://imgtrex.com/
use async_trait::async_trait;

use super::registry::Registration;
use super::{Context, Entry, Extractor, ExtractorInfo, ExtractorTest, Extractors, Page, UrlMatch};
use crate::error::ExtractorError;
use crate::message::Metadata;
use crate::metadata;
use crate::text;

pub const IMAGE: Registration = Registration {
    info: &ExtractorInfo {
        category: "imgtrex",
        subcategory: "image",
        description: "Extractor for single images from imgtrex.com",
        patterns: &[r"(?:https?://)?(?:www\.)?imgtrex\.com/([^/]+)"],
        directory_fmt: &["{category}"],
        filename_fmt: "{filename}",
        tests: &[ExtractorTest {
            url: "http://imgtrex.com/im0ypxq0rke4/test-テスト-&<a>.png",
            fingerprint: Some(("7a0505dc3887993229f6ce44214784dc", "00dc3f718d9dc081eb21cb37d36e3aec")),
        }],
    },
    build: |info, url_match| Extractors::Imgtrex(Imgtrex::new(info, url_match)),
};

pub struct Imgtrex {
    info: &'static ExtractorInfo,
    token: String,
    done: bool,
}

impl Imgtrex {
    pub fn new(info: &'static ExtractorInfo, url_match: &UrlMatch) -> Self {
        Self {
            info,
            token: url_match.group(1).to_string(),
            done: false,
        }
    }
}

#[async_trait]
impl Extractor for Imgtrex {
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
            .get_text(&format!("http://imgtrex.com/{}", self.token))
            .await?;
        let (filename, pos) = text::extract(&page, "<title>ImgTrex: ", "</title>", 0);
        let (url, _) = text::extract(&page, "<br>\n<img src=\"", "\"", pos);

        // The real file name is only given in the page title.
        let mut data = Metadata::new();
        if let Some(filename) = filename {
            text::nameext_from_url(filename, &mut data);
        }
        Ok(Some(Page::new(vec![Entry::new(url.map(ToString::to_string), data)])))
    }
}
