//! Binary download — latest-release lookup with a hardcoded fallback version.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::config::BINARY_NAME;
use crate::error::LifecycleError;

const RELEASE_API_URL: &str =
    "https://api.github.com/repos/drawthingsai/draw-things-community/releases/latest";
const DOWNLOAD_BASE_URL: &str =
    "https://github.com/drawthingsai/draw-things-community/releases/download";
const FALLBACK_VERSION: &str = "v1.20250225.0";
const API_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches the server binary to a local path. Abstracted so the install flow
/// can be exercised without network access.
#[allow(async_fn_in_trait)]
pub trait BinaryFetcher {
    /// Download the server binary to `dest`.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::Download` on any transport failure.
    async fn fetch(&self, dest: &Path) -> Result<()>;
}

/// Production fetcher — GitHub releases over ureq.
pub struct GithubFetcher;

impl GithubFetcher {
    /// Tag of the latest release, or `None` when the API is unreachable or
    /// returns an unexpected shape (callers fall back to a known version).
    fn latest_tag() -> Option<String> {
        let response = ureq::get(RELEASE_API_URL)
            .set("Accept", "application/json")
            .timeout(API_TIMEOUT)
            .call()
            .ok()?;
        let body = response.into_string().ok()?;
        let release: serde_json::Value = serde_json::from_str(&body).ok()?;
        release.get("tag_name")?.as_str().map(str::to_string)
    }
}

fn download_url(tag: &str) -> String {
    format!("{DOWNLOAD_BASE_URL}/{tag}/{BINARY_NAME}-macOS")
}

impl BinaryFetcher for GithubFetcher {
    async fn fetch(&self, dest: &Path) -> Result<()> {
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let tag = Self::latest_tag().unwrap_or_else(|| FALLBACK_VERSION.to_string());
            download(&download_url(&tag), &dest)
        })
        .await
        .map_err(|e| anyhow::anyhow!("download task panicked: {e}"))?
    }
}

fn download(url: &str, dest: &Path) -> Result<()> {
    let response = match ureq::get(url).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(code, _)) => {
            return Err(LifecycleError::Download(format!("HTTP {code} from {url}")).into());
        }
        Err(e) => return Err(LifecycleError::Download(e.to_string()).into()),
    };
    let mut file = std::fs::File::create(dest).map_err(|e| {
        LifecycleError::Download(format!("cannot create {}: {e}", dest.display()))
    })?;
    std::io::copy(&mut response.into_reader(), &mut file)
        .map_err(|e| LifecycleError::Download(e.to_string()))?;
    Ok(())
}
