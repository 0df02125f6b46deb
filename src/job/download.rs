use async_trait::async_trait;
use colored::Colorize;
use futures::StreamExt;
use log::{debug, warn};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{create_dir_all, read, remove_file, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

use super::format::format;
use super::{check_version, Flow, Job, JobError};
use crate::config::Config;
use crate::extractors::ExtractorInfo;
use crate::message::{Headers, Message, Metadata};
use crate::progress_bars::ProgressArcs;

const MAX_TRIES: u32 = 5;
const DEFAULT_BASE_DIRECTORY: &str = "gallery-dl";

/// Outcome of a single download attempt that did not succeed.
enum Attempt {
    /// Worth another try.
    Retry(String),
    /// The server refused the file; trying again will not help.
    Abort(String),
}

/// Streams remote files to disk, retrying failed transfers.
pub struct Downloader {
    client: Client,
    max_tries: u32,
    bars: Arc<ProgressArcs>,
}

impl Downloader {
    pub fn new(client: Client, bars: Arc<ProgressArcs>) -> Self {
        Self {
            client,
            max_tries: MAX_TRIES,
            bars,
        }
    }

    /// Fetch `url` into `path`. Whatever was written is removed again if every try fails.
    pub async fn download(&self, url: &str, headers: &Headers, path: &Path) -> Result<(), JobError> {
        let mut tries = 0;
        loop {
            tries += 1;
            let message = match self.fetch(url, headers, path).await {
                Ok(()) => return Ok(()),
                Err(Attempt::Retry(message)) if tries < self.max_tries => {
                    warn!("Download of {} failed ({}), retrying ({}/{})", url, message, tries, self.max_tries);
                    continue;
                }
                Err(Attempt::Retry(message) | Attempt::Abort(message)) => message,
            };

            if path.exists() {
                remove_file(path).await?;
            }
            return Err(JobError::DownloadFailed {
                url: url.to_string(),
                tries,
                message,
            });
        }
    }

    async fn fetch(&self, url: &str, headers: &Headers, path: &Path) -> Result<(), Attempt> {
        debug!("Fetching {}", url);
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let res = request.send().await.map_err(|e| Attempt::Retry(e.to_string()))?;

        let status = res.status();
        if status.is_client_error() {
            return Err(Attempt::Abort(format!("server returned {}", status)));
        }
        if !status.is_success() {
            return Err(Attempt::Retry(format!("server returned {}", status)));
        }

        let size = res.content_length().unwrap_or_default();
        let pb = self.bars.add_download_bar(size);

        debug!("Creating destination file {:?}", path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await
            .map_err(|e| Attempt::Abort(e.to_string()))?;
        let mut bw = BufWriter::new(file);

        let mut stream = res.bytes_stream();
        while let Some(item) = stream.next().await {
            let mut chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => {
                    pb.finish_and_clear();
                    return Err(Attempt::Retry(e.to_string()));
                }
            };
            pb.inc(chunk.len() as u64);
            if let Err(e) = bw.write_all_buf(&mut chunk).await {
                pb.finish_and_clear();
                return Err(Attempt::Abort(e.to_string()));
            }
        }
        bw.flush().await.map_err(|e| Attempt::Abort(e.to_string()))?;

        pb.finish_and_clear();
        Ok(())
    }
}

/// Downloads every file into the directory derived from the job metadata.
pub struct DownloadJob {
    info: &'static ExtractorInfo,
    base: PathBuf,
    directory: Option<PathBuf>,
    headers: Headers,
    downloader: Downloader,
    bars: Arc<ProgressArcs>,
    downloaded: u64,
    skipped: u64,
}

impl DownloadJob {
    /// `base-directory` from `config` is the root of all output, `./gallery-dl` by default.
    pub fn new(info: &'static ExtractorInfo, config: &Config, client: Client, bars: Arc<ProgressArcs>) -> Self {
        let base = config
            .interpolate_str(&["base-directory"])
            .map_or_else(|| PathBuf::from(DEFAULT_BASE_DIRECTORY), PathBuf::from);
        Self {
            info,
            base,
            directory: None,
            headers: Headers::new(),
            downloader: Downloader::new(client, bars.clone()),
            bars,
            downloaded: 0,
            skipped: 0,
        }
    }

    #[inline]
    pub const fn downloaded(&self) -> u64 {
        self.downloaded
    }

    #[inline]
    pub const fn skipped(&self) -> u64 {
        self.skipped
    }

    async fn enter_directory(&mut self, data: &Metadata) -> Result<(), JobError> {
        let directory = self
            .info
            .directory_fmt
            .iter()
            .fold(self.base.clone(), |path, segment| path.join(format(segment, data)));
        debug!("Target dir: {}", directory.display());
        create_dir_all(&directory).await?;
        self.directory = Some(directory);
        Ok(())
    }

    /// A file is already there if it exists and, when the metadata carries an `md5`, matches it.
    async fn is_present(path: &Path, data: &Metadata) -> Result<bool, JobError> {
        if !path.exists() {
            return Ok(false);
        }
        let Some(expected) = data.get("md5").and_then(|v| v.as_str()) else {
            return Ok(true);
        };
        let digest = format!("{:x}", md5::compute(read(path).await?));
        if digest == expected {
            return Ok(true);
        }
        debug!("Removing {} (MD5 mismatch)", path.display());
        remove_file(path).await?;
        Ok(false)
    }

    async fn download(&mut self, url: &str, data: &Metadata) -> Result<(), JobError> {
        let directory = self.directory.as_ref().ok_or(JobError::NoDirectory)?;
        let filename = format(self.info.filename_fmt, data);
        let path = directory.join(&filename);

        self.bars.main.inc(1);
        if Self::is_present(&path, data).await? {
            self.bars.println(&format!("{} {}", filename.bold().blue(), "already exists".bold()));
            self.skipped += 1;
            return Ok(());
        }

        match self.downloader.download(url, &self.headers, &path).await {
            Ok(()) => {
                self.downloaded += 1;
                Ok(())
            }
            // One broken file does not end the job.
            Err(error @ JobError::DownloadFailed { .. }) => {
                self.bars.println(&format!("{}", error.to_string().bold().red()));
                warn!("{}", error);
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}

#[async_trait]
impl Job for DownloadJob {
    async fn handle(&mut self, message: Message) -> Result<Flow, JobError> {
        match message {
            Message::Version(version) => check_version(version)?,
            Message::Directory(data) => self.enter_directory(&data).await?,
            Message::Headers(headers) => self.headers = headers,
            Message::Url(url, data) => self.download(&url, &data).await?,
        }
        Ok(Flow::Continue)
    }

    async fn finish(&mut self) -> Result<(), JobError> {
        self.bars.main.finish_and_clear();
        debug!("{} files downloaded, {} skipped", self.downloaded, self.skipped);
        Ok(())
    }
}
