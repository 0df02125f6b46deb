//! The protocol spoken between extractors and the jobs consuming them.
//!
//! Every extractor produces the same ordered sequence:
//!
//! 1. one [`Message::Version`],
//! 2. one [`Message::Directory`] carrying the metadata used to name the output directory,
//! 3. optionally one [`Message::Headers`],
//! 4. any number of [`Message::Url`], in the order the resources were discovered.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Version of the message protocol emitted by all extractors.
pub const PROTOCOL_VERSION: u32 = 1;

/// Free-form key/value metadata attached to directories and files.
///
/// Keys are kept sorted, so serializing the same metadata always yields the same bytes.
pub type Metadata = serde_json::Map<String, Value>;

/// Transport headers to apply to downloads.
pub type Headers = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Message {
    Version(u32),
    Directory(Metadata),
    Headers(Headers),
    Url(String, Metadata),
}

impl Message {
    /// Short name of the message kind, used in logs.
    #[inline]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Version(_) => "version",
            Self::Directory(_) => "directory",
            Self::Headers(_) => "headers",
            Self::Url(..) => "url",
        }
    }
}

/// Combine the three metadata levels of a file.
///
/// Fields of `page` override those of `job`, and fields of `entry` override both.
pub fn merge(job: &Metadata, page: &Metadata, entry: Metadata) -> Metadata {
    let mut merged = job.clone();
    merged.extend(page.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.extend(entry);
    merged
}

/// Remove bookkeeping-only keys that must not reach per-file metadata.
pub fn strip(data: &mut Metadata, keys: &[&str]) {
    for key in keys {
        data.remove(*key);
    }
}

/// Render a metadata value the way it should appear in paths and listings.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

/// Digests of a message sequence, used to detect regressions in extractor output.
///
/// `url` covers the download URLs in order, `keyword` covers the directory and file metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub url: String,
    pub keyword: String,
}

impl Fingerprint {
    pub fn of(messages: &[Message]) -> Self {
        let mut urls = md5::Context::new();
        let mut keywords = md5::Context::new();

        for message in messages {
            match message {
                Message::Directory(data) => {
                    keywords.consume(Value::Object(data.clone()).to_string());
                }
                Message::Url(url, data) => {
                    urls.consume(url.as_bytes());
                    keywords.consume(Value::Object(data.clone()).to_string());
                }
                Message::Version(_) | Message::Headers(_) => {}
            }
        }

        Self {
            url: format!("{:x}", urls.compute()),
            keyword: format!("{:x}", keywords.compute()),
        }
    }
}
