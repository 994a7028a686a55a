//! URL parsing and validation utilities
//!
//! Helpers for scheme checks and for deriving the cache filename from a URL.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UrlError {
    #[error("URL must use one of: {allowed}\n  got: {url}")]
    UnsupportedScheme { url: String, allowed: String },
}

/// Transfer schemes the fetcher understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlScheme {
    Http,
    Https,
    File,
}

impl UrlScheme {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Http => "http://",
            Self::Https => "https://",
            Self::File => "file://",
        }
    }

    pub fn of(url: &str) -> Option<Self> {
        let lower = url.to_ascii_lowercase();
        [Self::Https, Self::Http, Self::File]
            .into_iter()
            .find(|s| lower.starts_with(s.prefix()))
    }
}

/// Validate that a URL uses one of the allowed schemes.
pub fn validate_url_scheme(url: &str, allowed: &[UrlScheme]) -> Result<(), UrlError> {
    match UrlScheme::of(url) {
        Some(scheme) if allowed.contains(&scheme) => Ok(()),
        _ => Err(UrlError::UnsupportedScheme {
            url: url.to_string(),
            allowed: allowed
                .iter()
                .map(|s| s.prefix())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Local path named by a `file://` URL.
pub fn file_url_path(url: &str) -> Option<PathBuf> {
    let rest = url.get(UrlScheme::File.prefix().len()..)?;
    if UrlScheme::of(url) != Some(UrlScheme::File) {
        return None;
    }
    // file://localhost/path is the same as file:///path
    let rest = rest.strip_prefix("localhost").unwrap_or(rest);
    Some(PathBuf::from(percent_decode(rest)))
}

/// Extract the filename from a URL.
///
/// Query strings and fragments are ignored; falls back to "download".
///
/// ```ignore
/// assert_eq!(extract_filename("https://example.com/foo-1.0.tar.gz"), "foo-1.0.tar.gz");
/// ```
pub fn extract_filename(url: &str) -> String {
    let clean_url = url.split('?').next().unwrap_or(url);
    let clean_url = clean_url.split('#').next().unwrap_or(clean_url);

    let without_scheme = clean_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(clean_url);

    // A bare host has no path component to name the file after
    match without_scheme.split_once('/') {
        Some((_, path)) => path
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| sanitize_filename(&percent_decode(s)))
            .unwrap_or_else(|| "download".to_string()),
        None => "download".to_string(),
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%'
            && let Some(byte) = s
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        {
            out.push(byte);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Sanitize a filename for safe filesystem use.
pub fn sanitize_filename(name: &str) -> String {
    if name.is_empty() || name == "." || name == ".." {
        return "download".to_string();
    }

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = sanitized.trim().trim_matches('.');

    if trimmed.is_empty() {
        "download".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_filename_simple() {
        assert_eq!(
            extract_filename("https://example.com/foo-1.0.tar.gz"),
            "foo-1.0.tar.gz"
        );
    }

    #[test]
    fn test_extract_filename_with_query_and_fragment() {
        assert_eq!(
            extract_filename("https://example.com/file.tar.gz?token=abc"),
            "file.tar.gz"
        );
        assert_eq!(
            extract_filename("https://example.com/file.tar.gz#section"),
            "file.tar.gz"
        );
    }

    #[test]
    fn test_extract_filename_fallback() {
        assert_eq!(extract_filename("https://example.com/"), "download");
        assert_eq!(extract_filename("https://example.com"), "download");
    }

    #[test]
    fn test_extract_filename_decodes_percent() {
        assert_eq!(
            extract_filename("file:///tmp/my%20lib-1.0.tar.gz"),
            "my lib-1.0.tar.gz"
        );
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("foo/bar"), "foo_bar");
        assert_eq!(sanitize_filename("file:name"), "file_name");
        assert_eq!(sanitize_filename(".."), "download");
        assert_eq!(sanitize_filename(""), "download");
        assert_eq!(sanitize_filename("  test  "), "test");
    }

    #[test]
    fn test_validate_url_scheme() {
        let any = &[UrlScheme::Http, UrlScheme::Https, UrlScheme::File];
        assert!(validate_url_scheme("https://example.com/a.tgz", any).is_ok());
        assert!(validate_url_scheme("HTTP://example.com/a.tgz", any).is_ok());
        assert!(validate_url_scheme("file:///tmp/a.tgz", any).is_ok());
        assert!(validate_url_scheme("ftp://example.com/a.tgz", any).is_err());

        let err = validate_url_scheme("http://example.com/a.tgz", &[UrlScheme::Https]).unwrap_err();
        assert!(err.to_string().contains("https://"));
    }

    #[test]
    fn test_file_url_path() {
        assert_eq!(
            file_url_path("file:///tmp/fixtures/libx-2.0.tar.gz"),
            Some(PathBuf::from("/tmp/fixtures/libx-2.0.tar.gz"))
        );
        assert_eq!(
            file_url_path("file://localhost/tmp/a%20b.zip"),
            Some(PathBuf::from("/tmp/a b.zip"))
        );
        assert_eq!(file_url_path("https://example.com/a.zip"), None);
    }
}
