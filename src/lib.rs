//! # Gallery Downloader
//!
//! gallery_downloader is a CLI utility and library to extract and download images and
//! galleries from various websites.
//!
//! A URL is matched against the [`Registry`](extractors::Registry) of site extractors. The
//! chosen extractor is driven by a [`MessageStream`](extractors::MessageStream), which produces
//! an ordered sequence of [`Message`](message::Message)s, and a [`Job`](job::Job) consumes them:
//! downloading the files, printing their URLs or listing the available keywords.
pub mod cache;
pub mod config;
pub mod error;
pub mod extractors;
pub mod http;
pub mod job;
pub mod message;
pub mod progress_bars;
pub mod text;

pub use error::ExtractorError;
pub use message::Message;
