//! Archive transfer into the download cache
//!
//! Data is written to a temporary file next to the destination and renamed
//! into place only after the whole body arrived, so an interrupted transfer
//! never leaves something at the cache path that a later run would trust.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use super::FetchError;
use super::url::{self, UrlScheme};
use crate::core::output::{self, ProgressGuard};

/// Default transfer timeout in seconds
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;

/// Read the transfer timeout from `DEPBUILD_HTTP_TIMEOUT`, clamped to 5s..1h.
pub fn http_timeout() -> Duration {
    static TIMEOUT: OnceLock<Duration> = OnceLock::new();
    *TIMEOUT.get_or_init(|| {
        let secs = std::env::var("DEPBUILD_HTTP_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
        Duration::from_secs(secs.clamp(5, 3600))
    })
}

/// How a transfer may be performed.
#[derive(Debug, Clone, Copy)]
pub struct TransferPolicy {
    pub require_tls: bool,
    pub timeout: Duration,
}

impl TransferPolicy {
    pub fn new(require_tls: bool) -> Self {
        Self {
            require_tls,
            timeout: http_timeout(),
        }
    }
}

/// Transfer `url` to `dest`. Returns the number of bytes written.
pub fn fetch_to(url: &str, dest: &Path, policy: TransferPolicy) -> Result<u64, FetchError> {
    let Some(parent) = dest.parent() else {
        return Err(FetchError::Io {
            path: dest.to_path_buf(),
            source: std::io::Error::other("destination has no parent directory"),
        });
    };
    std::fs::create_dir_all(parent).map_err(|source| FetchError::Io {
        path: parent.to_path_buf(),
        source,
    })?;

    let filename = dest
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".to_string());

    let mut part = tempfile::Builder::new()
        .prefix(&format!(".{}.", filename))
        .suffix(".part")
        .tempfile_in(parent)
        .map_err(|source| FetchError::Io {
            path: parent.to_path_buf(),
            source,
        })?;

    let total = match UrlScheme::of(url) {
        Some(UrlScheme::File) if !policy.require_tls => copy_local(url, part.as_file_mut())?,
        Some(UrlScheme::Https) => fetch_http(url, part.as_file_mut(), &filename, policy)?,
        Some(UrlScheme::Http) if !policy.require_tls => {
            fetch_http(url, part.as_file_mut(), &filename, policy)?
        }
        _ => {
            return Err(FetchError::InsecureTransport {
                url: url.to_string(),
            });
        }
    };

    part.as_file_mut()
        .sync_all()
        .map_err(|source| FetchError::Io {
            path: part.path().to_path_buf(),
            source,
        })?;
    part.persist(dest).map_err(|e| FetchError::Io {
        path: dest.to_path_buf(),
        source: e.error,
    })?;

    output::detail(&format!("downloaded {} ({} bytes)", filename, total));
    Ok(total)
}

fn copy_local(url: &str, out: &mut std::fs::File) -> Result<u64, FetchError> {
    let src = url::file_url_path(url).ok_or_else(|| FetchError::Transport {
        url: url.to_string(),
        message: "malformed file URL".to_string(),
    })?;
    let mut input = std::fs::File::open(&src).map_err(|e| FetchError::Transport {
        url: url.to_string(),
        message: format!("cannot open {}: {}", src.display(), e),
    })?;
    std::io::copy(&mut input, out).map_err(|e| FetchError::Transport {
        url: url.to_string(),
        message: format!("copy failed: {}", e),
    })
}

fn fetch_http(
    url: &str,
    out: &mut std::fs::File,
    filename: &str,
    policy: TransferPolicy,
) -> Result<u64, FetchError> {
    let guard = ProgressGuard::new(output::spinner(&format!("downloading {}", filename)));

    let agent = ureq::AgentBuilder::new()
        .timeout(policy.timeout)
        .user_agent(concat!("depbuild/", env!("CARGO_PKG_VERSION")))
        .build();

    let response = agent.get(url).call().map_err(|e| match e {
        ureq::Error::Status(code, _) => FetchError::HttpStatus {
            url: url.to_string(),
            code,
        },
        ureq::Error::Transport(t) => FetchError::Transport {
            url: url.to_string(),
            message: t.to_string(),
        },
    })?;

    // Redirects are followed; a TLS-only download must not end up on plain http
    if policy.require_tls && UrlScheme::of(response.get_url()) != Some(UrlScheme::Https) {
        return Err(FetchError::InsecureTransport {
            url: response.get_url().to_string(),
        });
    }

    if let Some(len) = response
        .header("content-length")
        .and_then(|s| s.parse().ok())
    {
        output::upgrade_to_bytes(guard.bar(), len);
    }

    let mut reader = response.into_reader();
    let mut buffer = [0u8; 8192];
    let mut total_bytes = 0u64;

    loop {
        let n = reader.read(&mut buffer).map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: format!("read error: {}", e),
        })?;
        if n == 0 {
            break;
        }

        out.write_all(&buffer[..n]).map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: format!("write error: {}", e),
        })?;

        total_bytes += n as u64;
        guard.bar().set_position(total_bytes);
    }

    Ok(total_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fetch_file_url() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("libx-2.0.tar.gz");
        std::fs::write(&src, b"archive bytes").unwrap();
        let dest = dir.path().join("cache/libx-libx-2.0.tar.gz");

        let url = format!("file://{}", src.display());
        let n = fetch_to(&url, &dest, TransferPolicy::new(false)).unwrap();

        assert_eq!(n, 13);
        assert_eq!(std::fs::read(&dest).unwrap(), b"archive bytes");
    }

    #[test]
    fn test_missing_local_file_leaves_no_cache_entry() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("cache/x-missing.tar.gz");

        let url = format!("file://{}/missing.tar.gz", dir.path().display());
        let err = fetch_to(&url, &dest, TransferPolicy::new(false)).unwrap_err();

        assert!(matches!(err, FetchError::Transport { .. }));
        assert!(!dest.exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("cache"))
            .unwrap()
            .collect();
        assert!(leftovers.is_empty(), "partial file left behind");
    }

    #[test]
    fn test_tls_policy_rejects_file_and_http() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("cache/out.tar.gz");

        for url in ["file:///etc/hostname", "http://example.com/a.tar.gz"] {
            let err = fetch_to(url, &dest, TransferPolicy::new(true)).unwrap_err();
            assert!(matches!(err, FetchError::InsecureTransport { .. }), "{url}");
        }
        assert!(!dest.exists());
    }

    mod mock_tests {
        use super::*;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        #[tokio::test(flavor = "multi_thread")]
        async fn test_http_download_success() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/fmt-11.0.2.tar.gz"))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tarball".to_vec()))
                .mount(&server)
                .await;

            let dir = TempDir::new().unwrap();
            let dest = dir.path().join("fmt-fmt-11.0.2.tar.gz");
            let url = format!("{}/fmt-11.0.2.tar.gz", server.uri());

            let n = fetch_to(&url, &dest, TransferPolicy::new(false)).unwrap();
            assert_eq!(n, 7);
            assert_eq!(std::fs::read(&dest).unwrap(), b"tarball");
        }

        #[tokio::test(flavor = "multi_thread")]
        async fn test_http_404_is_fatal_and_leaves_no_file() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;

            let dir = TempDir::new().unwrap();
            let dest = dir.path().join("missing.tar.gz");
            let url = format!("{}/missing.tar.gz", server.uri());

            let err = fetch_to(&url, &dest, TransferPolicy::new(false)).unwrap_err();
            assert!(matches!(err, FetchError::HttpStatus { code: 404, .. }));
            assert!(!dest.exists());
        }
    }
}
