//! URL → extractor dispatch.
//!
//! Order matters: extractors are tried in registration order and each one tries its patterns in
//! declaration order, so extractors for single posts or tags must come before the extractor
//! for the whole user listing of the same site.
use log::debug;
use regex::Regex;

use super::{booru, deviantart, imagebam, imgtrex, nijie, tumblr};
use super::{ExtractorInfo, Extractors, UrlMatch};
use crate::error::ExtractorError;

pub type Build = fn(&'static ExtractorInfo, &UrlMatch) -> Extractors;

/// An extractor descriptor together with its constructor.
#[derive(Clone, Copy)]
pub struct Registration {
    pub info: &'static ExtractorInfo,
    pub build: Build,
}

/// Every extractor shipped with the crate, in resolution order.
pub static BUILTIN: &[Registration] = &[
    booru::DANBOORU_TAG,
    booru::DANBOORU_POOL,
    booru::DANBOORU_POST,
    booru::E621_TAG,
    booru::E621_POOL,
    booru::E621_POST,
    booru::GELBOORU_TAG,
    booru::GELBOORU_POST,
    booru::KONACHAN_TAG,
    booru::KONACHAN_POOL,
    booru::KONACHAN_POST,
    deviantart::IMAGE,
    deviantart::USER,
    imagebam::GALLERY,
    imagebam::IMAGE,
    imgtrex::IMAGE,
    nijie::USER,
    tumblr::POST,
    tumblr::TAG,
    tumblr::USER,
];

struct Registered {
    registration: Registration,
    patterns: Vec<Regex>,
}

#[derive(Default)]
pub struct Registry {
    entries: Vec<Registered>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding [`BUILTIN`].
    pub fn builtin() -> Result<Self, ExtractorError> {
        let mut registry = Self::new();
        for registration in BUILTIN {
            registry.register(*registration)?;
        }
        Ok(registry)
    }

    /// Append an extractor. Its patterns are compiled anchored at the start of the URL.
    pub fn register(&mut self, registration: Registration) -> Result<(), ExtractorError> {
        let patterns = registration
            .info
            .patterns
            .iter()
            .map(|pattern| {
                Regex::new(&format!("^(?:{})", pattern)).map_err(|source| ExtractorError::InvalidPattern {
                    name: registration.info.category,
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.entries.push(Registered {
            registration,
            patterns,
        });
        Ok(())
    }

    /// The first extractor with a pattern matching `url`, with the captured groups.
    pub fn find(&self, url: &str) -> Option<(Registration, UrlMatch)> {
        self.entries.iter().find_map(|entry| {
            entry.patterns.iter().find_map(|pattern| {
                pattern
                    .captures(url)
                    .map(|captures| (entry.registration, UrlMatch::from_captures(&captures)))
            })
        })
    }

    /// Build the extractor responsible for `url`.
    pub fn resolve(&self, url: &str) -> Result<Extractors, ExtractorError> {
        let Some((registration, url_match)) = self.find(url) else {
            return Err(ExtractorError::NoExtractor {
                url: url.to_string(),
            });
        };
        debug!("Using extractor {} for {}", registration.info.name(), url);
        Ok((registration.build)(registration.info, &url_match))
    }

    /// Registered descriptors in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = &'static ExtractorInfo> + '_ {
        self.entries.iter().map(|entry| entry.registration.info)
    }

    /// Distinct categories (supported sites), in order of first registration.
    pub fn categories(&self) -> Vec<&'static str> {
        let mut categories: Vec<&'static str> = Vec::new();
        for info in self.iter() {
            if !categories.contains(&info.category) {
                categories.push(info.category);
            }
        }
        categories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::Extractor;

    #[test]
    fn every_test_url_resolves_to_its_own_extractor() {
        let registry = Registry::builtin().unwrap();
        for info in registry.iter() {
            assert!(!info.tests.is_empty(), "{} has no test URL", info.name());
            for test in info.tests {
                let extractor = registry.resolve(test.url).unwrap();
                assert_eq!(extractor.info().name(), info.name(), "wrong extractor for {}", test.url);
            }
        }
    }

    #[test]
    fn extractor_names_are_unique() {
        let registry = Registry::builtin().unwrap();
        let mut names: Vec<String> = registry.iter().map(ExtractorInfo::name).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn dotted_tumblr_host_is_a_user() {
        let registry = Registry::builtin().unwrap();
        let (registration, url_match) = registry.find("http://demo.example.tumblr.com/").unwrap();
        assert_eq!(registration.info.name(), "tumblr:user");
        assert_eq!(url_match.group(1), "demo.example");

        let (registration, _) = registry.find("http://demo.example.tumblr.com/post/459265350").unwrap();
        assert_eq!(registration.info.name(), "tumblr:post");
        let (registration, _) = registry.find("http://demo.tumblr.com/tagged/Times Square").unwrap();
        assert_eq!(registration.info.name(), "tumblr:tag");
    }

    #[test]
    fn unsupported_urls_are_reported() {
        let registry = Registry::builtin().unwrap();
        let result = registry.resolve("https://example.org/gallery/1");
        assert!(matches!(result, Err(ExtractorError::NoExtractor { url }) if url == "https://example.org/gallery/1"));
    }

    #[test]
    fn patterns_are_anchored_at_the_start() {
        let registry = Registry::builtin().unwrap();
        assert!(registry.find("see http://demo.tumblr.com/").is_none());
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        const BROKEN: ExtractorInfo = ExtractorInfo {
            category: "broken",
            subcategory: "user",
            description: "",
            patterns: &["(unclosed"],
            directory_fmt: &[],
            filename_fmt: "",
            tests: &[],
        };
        let mut registry = Registry::new();
        let result = registry.register(Registration {
            info: &BROKEN,
            build: |_, _| unreachable!(),
        });
        assert!(matches!(result, Err(ExtractorError::InvalidPattern { name: "broken", .. })));
    }

    #[test]
    fn categories_are_distinct() {
        let registry = Registry::builtin().unwrap();
        assert_eq!(
            registry.categories(),
            ["danbooru", "e621", "gelbooru", "konachan", "deviantart", "imagebam", "imgtrex", "nijie", "tumblr"]
        );
    }
}
