//! String helpers shared by the site extractors.
//!
//! Most sites are scraped by cutting substrings between two known markers instead of running a
//! full HTML parser over every page. [`extract`] is the basic building block and returns the
//! position after the match, so consecutive calls walk forward through a page.
use crate::message::Metadata;
use scraper::Html;
use serde_json::Value;
use std::borrow::Cow;

/// Cut the text between `begin` and `end`, searching from byte offset `pos`.
///
/// Returns the extracted slice and the position right after `end`. If either marker is not
/// found, returns `None` together with the unchanged `pos`.
pub fn extract<'a>(txt: &'a str, begin: &str, end: &str, pos: usize) -> (Option<&'a str>, usize) {
    let start = char_boundary(txt, pos);
    let Some(rest) = txt.get(start..) else {
        return (None, pos);
    };
    let Some(found) = rest.find(begin) else {
        return (None, pos);
    };
    let first = start + found + begin.len();
    let Some(len) = txt[first..].find(end) else {
        return (None, pos);
    };
    let last = first + len;
    (Some(&txt[first..last]), last + end.len())
}

/// A single rule for [`extract_all`]: an optional target key and the two markers.
///
/// Rules without a key only advance the position.
pub type Rule<'r> = (Option<&'r str>, &'r str, &'r str);

/// Apply [`extract`] for every rule in order, storing the results in `values`.
///
/// Keys of rules whose markers could not be found are set to `null`.
pub fn extract_all(txt: &str, rules: &[Rule<'_>], pos: usize, mut values: Metadata) -> (Metadata, usize) {
    let mut pos = pos;
    for (key, begin, end) in rules {
        let (result, next) = extract(txt, begin, end, pos);
        pos = next;
        if let Some(key) = key {
            let value = result.map_or(Value::Null, |s| Value::String(s.to_string()));
            values.insert((*key).to_string(), value);
        }
    }
    (values, pos)
}

/// Iterate over every non-overlapping substring between `begin` and `end`.
pub fn extract_iter<'a>(txt: &'a str, begin: &'a str, end: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    let mut pos = 0;
    std::iter::from_fn(move || {
        let (value, next) = extract(txt, begin, end, pos);
        pos = next;
        value
    })
}

/// Last path segment of `url`, without query string or fragment.
pub fn filename_from_url(url: &str) -> &str {
    let path = match url.find("://") {
        Some(idx) => {
            let after = &url[idx + 3..];
            after.find('/').map_or("", |p| &after[p..])
        }
        None => url,
    };
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/').next().unwrap_or_default()
}

/// Populate `filename`, `name` and `extension` from the last path segment of `url`.
pub fn nameext_from_url(url: &str, data: &mut Metadata) {
    let filename = unquote(filename_from_url(url));
    let (name, extension) = match filename.rfind('.') {
        Some(idx) if idx > 0 => (&filename[..idx], filename[idx + 1..].to_lowercase()),
        _ => (filename.as_str(), String::new()),
    };
    data.insert("name".into(), Value::String(name.to_string()));
    data.insert("extension".into(), Value::String(extension));
    data.insert("filename".into(), Value::String(filename));
}

/// Decode percent-encoded sequences. Invalid input is returned unchanged.
pub fn unquote(txt: &str) -> String {
    urlencoding::decode(txt)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| txt.to_string())
}

/// Resolve HTML character references (`&amp;`, `&#39;`, ...).
pub fn unescape(txt: &str) -> String {
    if !txt.contains('&') {
        return txt.to_string();
    }
    Html::parse_fragment(txt).root_element().text().collect()
}

fn char_boundary(txt: &str, pos: usize) -> usize {
    if pos >= txt.len() {
        return pos;
    }
    let mut pos = pos;
    while !txt.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}
