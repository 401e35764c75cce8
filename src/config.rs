use std::path::PathBuf;
use std::time::Duration;

use url::Url;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/72.0.3626.119 Safari/537.36";

/// Sent on every GET; some servers branch on it even though it means nothing for a GET.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_ASSET_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Request shape used by [`HttpFetcher`](crate::fetcher::HttpFetcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub user_agent: String,
    pub content_type: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}

/// Everything a [`SnapshotEngine`](crate::engine::SnapshotEngine) needs for one page.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Page to capture.
    pub page_url: Url,
    /// Root holding the timestamped snapshot directories and `logs.txt`.
    pub output_dir: PathBuf,
    pub page_timeout: Duration,
    pub asset_timeout: Duration,
    /// Upper bound on in-flight asset downloads within one asset class.
    pub max_concurrent: usize,
}

impl SnapshotConfig {
    pub fn new(page_url: Url, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            page_url,
            output_dir: output_dir.into(),
            page_timeout: DEFAULT_PAGE_TIMEOUT,
            asset_timeout: DEFAULT_ASSET_TIMEOUT,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}
