//! Pull-based driver turning an [`Extractor`] into a [`Message`] sequence.
use futures::Stream;
use log::debug;
use std::collections::VecDeque;

use super::{Context, Entry, Extractor, Extractors};
use crate::error::ExtractorError;
use crate::message::{merge, Message, Metadata, PROTOCOL_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Directory,
    Headers,
    Listing,
    Emitting,
    Done,
    Failed,
}

/// Lazily produces the messages of one extractor run.
///
/// Nothing happens until [`next`](MessageStream::next) is called; every call performs at most
/// the requests needed for one message. The stream is finite and cannot be restarted. Any error
/// ends it: the failing call returns the error and later calls return `Ok(None)`.
pub struct MessageStream<E: Extractor = Extractors> {
    extractor: E,
    ctx: Context,
    state: State,
    job: Metadata,
    page: Metadata,
    entries: VecDeque<Entry>,
}

impl<E: Extractor> MessageStream<E> {
    pub fn new(extractor: E, ctx: Context) -> Self {
        Self {
            extractor,
            ctx,
            state: State::Init,
            job: Metadata::new(),
            page: Metadata::new(),
            entries: VecDeque::new(),
        }
    }

    #[inline]
    pub const fn state(&self) -> State {
        self.state
    }

    #[inline]
    pub const fn extractor(&self) -> &E {
        &self.extractor
    }

    /// Produce the next message, or `None` once the extractor is exhausted.
    pub async fn next(&mut self) -> Result<Option<Message>, ExtractorError> {
        match self.step().await {
            Ok(message) => Ok(message),
            Err(error) => {
                debug!("Extractor {} failed: {}", self.extractor.info().name(), error);
                self.state = State::Failed;
                self.entries.clear();
                Err(error)
            }
        }
    }

    async fn step(&mut self) -> Result<Option<Message>, ExtractorError> {
        loop {
            match self.state {
                State::Init => {
                    self.extractor.prepare(&self.ctx);
                    self.extractor.authenticate(&self.ctx).await?;
                    self.state = State::Directory;
                    return Ok(Some(Message::Version(PROTOCOL_VERSION)));
                }
                State::Directory => {
                    self.job = self.extractor.metadata(&self.ctx).await?;
                    self.state = State::Headers;
                    return Ok(Some(Message::Directory(self.job.clone())));
                }
                State::Headers => {
                    self.state = State::Listing;
                    if let Some(headers) = self.extractor.headers() {
                        return Ok(Some(Message::Headers(headers)));
                    }
                }
                State::Listing => match self.extractor.next_page(&self.ctx).await? {
                    Some(page) => {
                        debug!("Got a page with {} entries", page.entries.len());
                        self.page = page.metadata;
                        self.entries = page.entries.into();
                        self.state = State::Emitting;
                    }
                    None => self.state = State::Done,
                },
                State::Emitting => {
                    let Some(entry) = self.entries.pop_front() else {
                        self.state = State::Listing;
                        continue;
                    };
                    let entry = if entry.url.is_none() && entry.detail.is_some() {
                        match self.extractor.resolve(&self.ctx, entry).await? {
                            Some(entry) => entry,
                            None => continue,
                        }
                    } else {
                        entry
                    };
                    let Some(url) = entry.url else {
                        debug!("Skipping entry without a file URL");
                        continue;
                    };
                    let data = merge(&self.job, &self.page, entry.metadata);
                    return Ok(Some(Message::Url(url, data)));
                }
                State::Done | State::Failed => return Ok(None),
            }
        }
    }

    /// Drain the whole stream.
    pub async fn collect(mut self) -> Result<Vec<Message>, ExtractorError> {
        let mut messages = Vec::new();
        while let Some(message) = self.next().await? {
            messages.push(message);
        }
        Ok(messages)
    }

    /// The same sequence as a [`futures::Stream`]. It ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Message, ExtractorError>> {
        futures::stream::unfold(self, |mut stream| async move {
            match stream.next().await {
                Ok(Some(message)) => Some((Ok(message), stream)),
                Ok(None) => None,
                Err(error) => Some((Err(error), stream)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::{ExtractorInfo, Page, Pager};
    use crate::http::mock::MockTransport;
    use crate::message::{Fingerprint, Headers};
    use crate::extractors::testing::context;
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::Arc;

    const INFO: ExtractorInfo = ExtractorInfo {
        category: "test",
        subcategory: "scripted",
        description: "",
        patterns: &[],
        directory_fmt: &["{category}"],
        filename_fmt: "{num}",
        tests: &[],
    };

    /// Serves page sizes from a script through a numbered [`Pager`].
    struct Scripted {
        pages: Vec<usize>,
        pager: Pager,
        numbered: u64,
        /// Entries with these numbers come without a URL.
        broken: Vec<u64>,
        fail_login: bool,
        fail_on_page: Option<u64>,
        detail: bool,
    }

    impl Scripted {
        fn new(page_size: usize, pages: &[usize]) -> Self {
            Self {
                pages: pages.to_vec(),
                pager: Pager::pages(1, page_size),
                numbered: 0,
                broken: Vec::new(),
                fail_login: false,
                fail_on_page: None,
                detail: false,
            }
        }
    }

    #[async_trait]
    impl Extractor for Scripted {
        fn info(&self) -> &'static ExtractorInfo {
            &INFO
        }

        async fn authenticate(&mut self, _ctx: &Context) -> Result<(), ExtractorError> {
            if self.fail_login {
                return Err(ExtractorError::AuthenticationFailure);
            }
            Ok(())
        }

        async fn metadata(&mut self, _ctx: &Context) -> Result<Metadata, ExtractorError> {
            Ok(crate::metadata! { "category" => "test", "user" => "demo" })
        }

        fn headers(&self) -> Option<Headers> {
            Some(Headers::from([("Referer".to_string(), "https://example.org/".to_string())]))
        }

        async fn next_page(&mut self, _ctx: &Context) -> Result<Option<Page>, ExtractorError> {
            if self.pager.is_done() {
                return Ok(None);
            }
            let index = self.pager.value();
            if self.fail_on_page == Some(index) {
                return Err(ExtractorError::not_found("gallery"));
            }
            let Some(count) = self.pages.get(index as usize - 1).copied() else {
                return Ok(None);
            };

            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                self.numbered += 1;
                let num = self.numbered;
                let url = format!("https://example.org/{}.jpg", num);
                let mut entry = Entry::new(None, crate::metadata! { "num" => num, "user" => "entry" });
                if self.detail {
                    entry.detail = Some(url);
                } else if !self.broken.contains(&num) {
                    entry.url = Some(url);
                }
                entries.push(entry);
            }
            self.pager.advance(count);

            let mut page = Page::new(entries);
            page.metadata.insert("page".into(), json!(index));
            Ok(Some(page))
        }

        async fn resolve(&mut self, _ctx: &Context, mut entry: Entry) -> Result<Option<Entry>, ExtractorError> {
            if entry.metadata["num"] == 2 {
                return Ok(None);
            }
            entry.url = entry.detail.take().map(|d| d.replace(".jpg", ".png"));
            Ok(Some(entry))
        }
    }

    fn stream(extractor: Scripted) -> MessageStream<Scripted> {
        MessageStream::new(extractor, context(Arc::new(MockTransport::new())))
    }

    #[tokio::test]
    async fn messages_follow_protocol_order() {
        let messages = stream(Scripted::new(2, &[2, 1])).collect().await.unwrap();

        assert_eq!(messages[0], Message::Version(PROTOCOL_VERSION));
        assert!(matches!(&messages[1], Message::Directory(data) if data["user"] == "demo"));
        assert!(matches!(&messages[2], Message::Headers(_)));
        assert!(messages[3..].iter().all(|m| m.kind() == "url"));
        assert_eq!(messages.len(), 6);
    }

    #[tokio::test]
    async fn short_page_stops_pagination() {
        let page_size = 5;
        let messages = stream(Scripted::new(page_size, &[5, 5, 5, 3, 5])).collect().await.unwrap();
        let nums: Vec<u64> = messages
            .iter()
            .filter_map(|m| match m {
                Message::Url(_, data) => data["num"].as_u64(),
                _ => None,
            })
            .collect();

        assert_eq!(nums.len(), 3 * page_size + 3);
        assert_eq!(nums, (1..=18).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn metadata_levels_are_merged() {
        let messages = stream(Scripted::new(2, &[1])).collect().await.unwrap();
        let Message::Url(_, data) = &messages[3] else {
            panic!("expected a url message");
        };
        assert_eq!(data["category"], "test");
        assert_eq!(data["page"], 1);
        assert_eq!(data["user"], "entry");
    }

    #[tokio::test]
    async fn entries_without_url_are_skipped() {
        let mut extractor = Scripted::new(3, &[3, 3, 1]);
        extractor.broken = vec![2, 4];
        let messages = stream(extractor).collect().await.unwrap();

        let urls = crate::extractors::testing::urls(&messages);
        assert_eq!(urls.len(), 5);
        assert_eq!(urls[0], "https://example.org/1.jpg");
        assert_eq!(urls[1], "https://example.org/3.jpg");
        assert_eq!(urls[4], "https://example.org/7.jpg");
    }

    #[tokio::test]
    async fn detail_pages_are_resolved() {
        let mut extractor = Scripted::new(3, &[3]);
        extractor.detail = true;
        let messages = stream(extractor).collect().await.unwrap();

        let urls = crate::extractors::testing::urls(&messages);
        assert_eq!(urls, ["https://example.org/1.png", "https://example.org/3.png"]);
    }

    #[tokio::test]
    async fn identical_runs_are_identical() {
        let first = stream(Scripted::new(4, &[4, 2])).collect().await.unwrap();
        let second = stream(Scripted::new(4, &[4, 2])).collect().await.unwrap();

        assert_eq!(serde_json::to_string(&first).unwrap(), serde_json::to_string(&second).unwrap());
        assert_eq!(Fingerprint::of(&first), Fingerprint::of(&second));
    }

    #[tokio::test]
    async fn failed_login_produces_no_message() {
        let mut extractor = Scripted::new(1, &[1]);
        extractor.fail_login = true;
        let mut stream = stream(extractor);

        assert!(matches!(stream.next().await, Err(ExtractorError::AuthenticationFailure)));
        assert_eq!(stream.state(), State::Failed);
        assert!(stream.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failure_mid_listing_ends_the_stream() {
        let mut extractor = Scripted::new(2, &[2, 2, 2]);
        extractor.fail_on_page = Some(2);

        let items: Vec<_> = stream(extractor).into_stream().collect().await;
        let (ok, err): (Vec<_>, Vec<_>) = items.into_iter().partition(Result::is_ok);
        assert_eq!(ok.len(), 3 + 2);
        assert_eq!(err.len(), 1);
        assert!(matches!(&err[0], Err(ExtractorError::NotFound { resource: Some(r) }) if r == "gallery"));
    }
}
