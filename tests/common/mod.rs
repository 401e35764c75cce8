//! Shared helpers for the snapshot integration tests

use std::fs;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use page_snapshot::{FetchConfig, FixedClock, HttpFetcher, SnapshotConfig, SnapshotEngine};
use url::Url;

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";
pub const JPEG: &[u8] = b"\xff\xd8\xff\xe0\0\x10JFIF\0\x01\x01";

pub fn fixed_clock() -> FixedClock {
    FixedClock(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
}

/// Engine pointed at `<server_url>/` writing into `output`, with short timeouts.
#[allow(dead_code)]
pub fn engine_for(server_url: &str, output: &Path) -> SnapshotEngine<HttpFetcher, FixedClock> {
    let page_url = Url::parse(&format!("{}/", server_url)).unwrap();
    let mut config = SnapshotConfig::new(page_url, output);
    config.page_timeout = Duration::from_secs(2);
    config.asset_timeout = Duration::from_secs(1);

    let fetcher = HttpFetcher::new(FetchConfig::default()).unwrap();
    SnapshotEngine::new(fetcher, fixed_clock(), config)
}

/// Names of the files stored in one asset subdirectory of a snapshot.
#[allow(dead_code)]
pub fn stored_files(snapshot_dir: &Path, sub: &str) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(snapshot_dir.join(sub))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[allow(dead_code)]
pub fn log_lines(output: &Path) -> Vec<String> {
    fs::read_to_string(output.join("logs.txt"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
