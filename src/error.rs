use thiserror::Error;

/// Enumerates the possible errors that can arise while resolving a URL and running an extractor.
///
/// Every variant except [`NoExtractor`](ExtractorError::NoExtractor) is terminal for the
/// extractor instance that produced it: the message stream stops and is not retried.
#[derive(Error, Debug)]
pub enum ExtractorError {
    /// None of the registered extractors has a pattern matching the given URL.
    ///
    /// This is an expected outcome, not every URL is supported.
    #[error("No suitable extractor found for URL '{url}'")]
    NoExtractor { url: String },

    /// The site rejected the configured credentials.
    #[error("Authentication failed. Please provide a valid username/password pair.")]
    AuthenticationFailure,

    /// The requested resource does not exist upstream.
    ///
    /// `resource` names the kind of resource (e.g. `artist`) when the extractor knows it.
    #[error("The {} does not exist", resource.as_deref().unwrap_or("resource (gallery/image/user)"))]
    NotFound { resource: Option<String> },

    /// An error occurred during a network request (e.g., connection timeout, DNS resolution failure).
    #[error("Connection Error: {0}")]
    ConnectionError(#[from] reqwest::Error),

    /// The server answered with an error status other than `404`.
    #[error("Server returned status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// An error occurred while deserializing a JSON response.
    #[error("Error while deserializing JSON: {0}")]
    JsonSerializeFail(#[from] serde_json::Error),

    /// An error occurred while parsing an XML response.
    #[error("Error while parsing XML: {0}")]
    XmlParseFail(#[from] roxmltree::Error),

    /// The server returned a response that could not be understood or was not in the expected format.
    #[error("Server returned an invalid response")]
    InvalidServerResponse,

    /// A response is missing a field that is required to continue extraction.
    #[error("Response is missing an essential field {field}")]
    MissingField { field: String },

    /// A pattern declared by an extractor failed to compile.
    #[error("Invalid URL pattern for extractor {name}: {source}")]
    InvalidPattern {
        name: &'static str,
        #[source]
        source: regex::Error,
    },
}

impl ExtractorError {
    /// Shortcut for a [`NotFound`](ExtractorError::NotFound) error of a known kind.
    #[inline]
    pub fn not_found(resource: &str) -> Self {
        Self::NotFound {
            resource: Some(resource.to_string()),
        }
    }

    #[inline]
    pub fn missing_field(field: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
        }
    }
}
