//! Consumers of extractor message sequences.
//!
//! A [`Job`] handles one message at a time and decides whether the run goes on. [`run`] drives
//! a [`MessageStream`] into a job until the stream ends, the job stops it, or either fails.
use async_trait::async_trait;
use log::debug;
use std::io;
use thiserror::Error;

use crate::error::ExtractorError;
use crate::extractors::{Extractor, MessageStream};
use crate::message::{Message, PROTOCOL_VERSION};

mod download;
pub mod format;
mod listing;

pub use download::{DownloadJob, Downloader};
pub use listing::{KeywordJob, UrlJob};

#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Extractor(#[from] ExtractorError),

    #[error("Unsupported message protocol version {0}")]
    UnsupportedVersion(u32),

    #[error("Failed to access file: {source}")]
    IOError {
        #[from]
        source: io::Error,
    },

    #[error("Failed to download {url} after {tries} tries: {message}")]
    DownloadFailed { url: String, tries: u32, message: String },

    #[error("Received a file before any directory metadata")]
    NoDirectory,
}

impl JobError {
    /// One-line message shown to the user when the job for `url` fails.
    pub fn diagnostic(&self, url: &str) -> String {
        match self {
            Self::Extractor(ExtractorError::NoExtractor { .. }) => {
                format!("No suitable extractor found for URL '{}'", url)
            }
            Self::Extractor(ExtractorError::AuthenticationFailure) => {
                ExtractorError::AuthenticationFailure.to_string()
            }
            Self::Extractor(ExtractorError::NotFound { resource }) => format!(
                "The {} at '{}' does not exist",
                resource.as_deref().unwrap_or("resource (gallery/image/user)"),
                url
            ),
            error => format!("Failed to process '{}': {}", url, error),
        }
    }
}

/// Whether a job wants more messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

#[async_trait]
pub trait Job: Send {
    async fn handle(&mut self, message: Message) -> Result<Flow, JobError>;

    /// Called once after the last handled message.
    async fn finish(&mut self) -> Result<(), JobError> {
        Ok(())
    }
}

/// Feed every message of `stream` to `job`.
pub async fn run<J, E>(job: &mut J, mut stream: MessageStream<E>) -> Result<(), JobError>
where
    J: Job + ?Sized,
    E: Extractor,
{
    while let Some(message) = stream.next().await? {
        debug!("Handling {} message", message.kind());
        if job.handle(message).await? == Flow::Stop {
            debug!("Job stopped before the end of the stream");
            break;
        }
    }
    job.finish().await
}

pub(crate) fn check_version(version: u32) -> Result<(), JobError> {
    if version == PROTOCOL_VERSION {
        Ok(())
    } else {
        Err(JobError::UnsupportedVersion(version))
    }
}
