use async_trait::async_trait;
use std::io::Write;

use super::{check_version, Flow, Job, JobError};
use crate::message::{value_to_string, Message, Metadata};

/// Prints the download URL of every file, one per line.
pub struct UrlJob<W: Write + Send> {
    output: W,
}

impl<W: Write + Send> UrlJob<W> {
    pub const fn new(output: W) -> Self {
        Self { output }
    }

    pub fn into_inner(self) -> W {
        self.output
    }
}

#[async_trait]
impl<W: Write + Send> Job for UrlJob<W> {
    async fn handle(&mut self, message: Message) -> Result<Flow, JobError> {
        match message {
            Message::Version(version) => check_version(version)?,
            Message::Url(url, _) => writeln!(self.output, "{}", url)?,
            Message::Directory(_) | Message::Headers(_) => {}
        }
        Ok(Flow::Continue)
    }

    async fn finish(&mut self) -> Result<(), JobError> {
        self.output.flush()?;
        Ok(())
    }
}

/// Prints the keywords usable in directory and file name templates.
///
/// Only the first file is inspected; the run stops right after it.
pub struct KeywordJob<W: Write + Send> {
    output: W,
}

impl<W: Write + Send> KeywordJob<W> {
    pub const fn new(output: W) -> Self {
        Self { output }
    }

    pub fn into_inner(self) -> W {
        self.output
    }

    fn print_keywords(&mut self, title: &str, data: &Metadata) -> Result<(), JobError> {
        writeln!(self.output, "{}", title)?;
        writeln!(self.output, "{}", "-".repeat(title.len()))?;
        for (key, value) in data {
            writeln!(self.output, "{}\n  {}", key, value_to_string(value))?;
        }
        writeln!(self.output)?;
        Ok(())
    }
}

#[async_trait]
impl<W: Write + Send> Job for KeywordJob<W> {
    async fn handle(&mut self, message: Message) -> Result<Flow, JobError> {
        match message {
            Message::Version(version) => check_version(version)?,
            Message::Directory(data) => self.print_keywords("Keywords for directory names:", &data)?,
            Message::Url(_, data) => {
                self.print_keywords("Keywords for filenames:", &data)?;
                return Ok(Flow::Stop);
            }
            Message::Headers(_) => {}
        }
        Ok(Flow::Continue)
    }

    async fn finish(&mut self) -> Result<(), JobError> {
        self.output.flush()?;
        Ok(())
    }
}
