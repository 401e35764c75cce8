use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::config::{FetchConfig, SnapshotConfig, DEFAULT_CONTENT_TYPE, DEFAULT_USER_AGENT};

#[derive(Parser, Debug)]
#[command(
    name = "page-snapshot",
    about = "Periodically snapshot a web page with its CSS, JavaScript and images",
    version,
    long_about = "Fetches one page at a fixed interval, downloads the stylesheets, scripts and images it references (including images named inside its scripts), rewrites every reference to the local copy and stores each capture under <output-dir>/<YYYYMMDDHHmm>/. Outcomes are appended to <output-dir>/logs.txt."
)]
pub struct SnapshotCommand {
    /// Seconds to wait between two snapshots
    #[arg(short = 'd', long = "interval", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// The page to snapshot (http or https)
    #[arg(short = 'u', long, value_parser = parse_http_url)]
    pub url: Url,

    /// Directory receiving the snapshots and logs.txt (created if absent)
    #[arg(short = 'o', long)]
    pub output_dir: PathBuf,

    /// Timeout for the page request in seconds
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u64).range(1..))]
    pub page_timeout: u64,

    /// Timeout for each asset request in seconds
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    pub asset_timeout: u64,

    /// Maximum concurrent asset downloads per asset class
    #[arg(short = 'c', long, default_value = "8", value_parser = parse_positive)]
    pub max_concurrent: usize,

    /// User agent string to use for requests
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Stop after this many snapshots instead of running forever
    #[arg(long)]
    pub max_cycles: Option<u64>,
}

impl SnapshotCommand {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Output directory without trailing path separators.
    pub fn output_dir(&self) -> PathBuf {
        strip_trailing_separators(&self.output_dir)
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            user_agent: self.user_agent.clone(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }

    pub fn snapshot_config(&self) -> SnapshotConfig {
        SnapshotConfig {
            page_url: self.url.clone(),
            output_dir: self.output_dir(),
            page_timeout: Duration::from_secs(self.page_timeout),
            asset_timeout: Duration::from_secs(self.asset_timeout),
            max_concurrent: self.max_concurrent,
        }
    }
}

fn parse_http_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid url: {}", e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme {:?}, expected http or https", other)),
    }
}

fn parse_positive(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

pub fn strip_trailing_separators(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    let trimmed = raw.trim_end_matches(|c: char| c == '/' || c == MAIN_SEPARATOR);
    if trimmed.is_empty() {
        path.to_path_buf()
    } else {
        PathBuf::from(trimmed)
    }
}
