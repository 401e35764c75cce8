use std::collections::HashMap;
use std::time::Duration;

use futures::{stream, StreamExt, TryStreamExt};
use regex::{Captures, Regex};
use url::Url;

use crate::classifier::{normalize_scheme_relative, resolve_extension};
use crate::error::{FetchError, Result};
use crate::extractor::{extract, AssetClass, PatternSet};
use crate::fetcher::{fetch_text, ContentFetcher};
use crate::file_manager::SnapshotDir;
use crate::namer::{AssetNamer, Clock};

/// One downloaded asset between naming and persistence.
#[derive(Debug, Clone)]
pub struct AssetRecord {
    pub original_reference: String,
    pub extension: String,
    pub local_name: String,
    pub bytes: Vec<u8>,
}

/// A reference whose bytes are on disk, with the text that replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedAsset {
    pub reference: String,
    pub local_reference: String,
}

/// Replace every occurrence of each reference in a single left-to-right pass.
///
/// At any position the longest matching reference wins, so a reference that is
/// a substring of another (`/js/app.js` inside `https://cdn.example.com/js/app.js`)
/// never rewrites part of the longer one, and inserted local paths are never
/// matched again.
pub fn substitute(text: &str, localized: &[LocalizedAsset]) -> String {
    if localized.is_empty() {
        return text.to_string();
    }

    let mut by_length: Vec<&LocalizedAsset> = localized.iter().collect();
    by_length.sort_by(|a, b| b.reference.len().cmp(&a.reference.len()));

    let replacements: HashMap<&str, &str> = by_length
        .iter()
        .map(|asset| (asset.reference.as_str(), asset.local_reference.as_str()))
        .collect();
    let pattern = by_length
        .iter()
        .map(|asset| regex::escape(&asset.reference))
        .collect::<Vec<_>>()
        .join("|");

    match Regex::new(&pattern) {
        Ok(regex) => regex
            .replace_all(text, |caps: &Captures| match replacements.get(&caps[0]) {
                Some(local) => local.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned(),
        Err(e) => {
            // Too many references for one automaton; longest-first still keeps
            // substrings from clobbering longer references.
            tracing::debug!(error = %e, "falling back to sequential substitution");
            by_length.iter().fold(text.to_string(), |acc, asset| {
                acc.replace(&asset.reference, &asset.local_reference)
            })
        }
    }
}

/// Localizes one asset class inside a host text.
///
/// Every reference of the class is downloaded (concurrently, at most
/// `max_concurrent` at a time), stored under the snapshot and only then
/// substituted into the text. A single failure fails the whole call and no
/// rewritten text is returned; files already stored for the class stay on disk.
pub struct AssetPipeline<'a, F: ?Sized, C> {
    fetcher: &'a F,
    namer: &'a AssetNamer<C>,
    base_url: &'a Url,
    asset_timeout: Duration,
    max_concurrent: usize,
}

impl<'a, F, C> AssetPipeline<'a, F, C>
where
    F: ContentFetcher + ?Sized,
    C: Clock,
{
    pub fn new(
        fetcher: &'a F,
        namer: &'a AssetNamer<C>,
        base_url: &'a Url,
        asset_timeout: Duration,
        max_concurrent: usize,
    ) -> Self {
        Self {
            fetcher,
            namer,
            base_url,
            asset_timeout,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub async fn process(
        &self,
        host_text: &str,
        class: AssetClass,
        snapshot: &SnapshotDir,
    ) -> Result<String> {
        match class {
            AssetClass::Js => self.rewrite_scripts(host_text, snapshot).await,
            AssetClass::Css | AssetClass::Image => {
                self.rewrite_assets(host_text, class, class.page_patterns(), snapshot)
                    .await
            }
        }
    }

    async fn rewrite_assets(
        &self,
        text: &str,
        class: AssetClass,
        patterns: PatternSet,
        snapshot: &SnapshotDir,
    ) -> Result<String> {
        let references = extract(text, patterns);
        if references.is_empty() {
            return Ok(text.to_string());
        }
        tracing::debug!(%class, ?patterns, count = references.len(), "localizing references");

        let localized: Vec<LocalizedAsset> = stream::iter(references)
            .map(|reference| self.localize_asset(reference, class, snapshot))
            .buffered(self.max_concurrent)
            .try_collect()
            .await?;

        Ok(substitute(text, &localized))
    }

    async fn rewrite_scripts(&self, text: &str, snapshot: &SnapshotDir) -> Result<String> {
        let references = extract(text, PatternSet::Scripts);
        if references.is_empty() {
            return Ok(text.to_string());
        }
        tracing::debug!(count = references.len(), "localizing scripts");

        let localized: Vec<LocalizedAsset> = stream::iter(references)
            .map(|reference| self.localize_script(reference, snapshot))
            .buffered(self.max_concurrent)
            .try_collect()
            .await?;

        Ok(substitute(text, &localized))
    }

    async fn localize_asset(
        &self,
        reference: String,
        class: AssetClass,
        snapshot: &SnapshotDir,
    ) -> Result<LocalizedAsset> {
        let url = self.resolve(&reference)?;
        let bytes = self.fetcher.fetch(&url, self.asset_timeout).await?;

        let extension = match class.fixed_extension() {
            Some(extension) => extension.to_string(),
            None => resolve_extension(&reference, &bytes),
        };
        let record = self.record(reference, extension, bytes)?;
        self.persist(class, record, snapshot)
    }

    /// Scripts get their embedded image keys localized before being stored.
    async fn localize_script(
        &self,
        reference: String,
        snapshot: &SnapshotDir,
    ) -> Result<LocalizedAsset> {
        let url = self.resolve(&reference)?;
        let source = fetch_text(self.fetcher, &url, self.asset_timeout).await?;
        let source = self
            .rewrite_assets(&source, AssetClass::Image, PatternSet::ScriptImages, snapshot)
            .await?;

        let record = self.record(reference, "js".to_string(), source.into_bytes())?;
        self.persist(AssetClass::Js, record, snapshot)
    }

    fn record(&self, reference: String, extension: String, bytes: Vec<u8>) -> Result<AssetRecord> {
        let local_name = self.namer.name_for(&reference, &extension)?;
        Ok(AssetRecord {
            original_reference: reference,
            extension,
            local_name,
            bytes,
        })
    }

    fn persist(
        &self,
        class: AssetClass,
        record: AssetRecord,
        snapshot: &SnapshotDir,
    ) -> Result<LocalizedAsset> {
        let path = snapshot.write_asset(class, &record.local_name, &record.bytes)?;
        tracing::info!(%class, reference = %record.original_reference, path = ?path, "stored asset");

        Ok(LocalizedAsset {
            local_reference: class.local_reference(&record.local_name),
            reference: record.original_reference,
        })
    }

    /// Absolute URL for a reference: absolute kept, scheme-relative gets `http:`,
    /// anything else is joined to the page URL.
    fn resolve(&self, reference: &str) -> Result<String> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return Ok(reference.to_string());
        }
        if reference.starts_with("//") {
            return Ok(normalize_scheme_relative(reference));
        }

        let url = self.base_url.join(reference).map_err(|e| FetchError::InvalidUrl {
            url: reference.to_string(),
            reason: e.to_string(),
        })?;
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SnapshotError;
    use crate::fetcher::MockContentFetcher;
    use crate::file_manager::FileManager;
    use crate::namer::FixedClock;
    use std::fs;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::{tempdir, TempDir};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG: &[u8] = b"\xff\xd8\xff\xe0\0\x10JFIF\0";

    fn fixed_namer() -> AssetNamer<FixedClock> {
        AssetNamer::new(FixedClock(UNIX_EPOCH + Duration::from_secs(1_700_000_000)))
    }

    fn page_url() -> Url {
        Url::parse("http://example.com/news/index.html").unwrap()
    }

    fn snapshot() -> (TempDir, SnapshotDir) {
        let temp_dir = tempdir().unwrap();
        let snapshot = FileManager::new(temp_dir.path())
            .create_snapshot_tree("202401011200")
            .unwrap();
        (temp_dir, snapshot)
    }

    fn files_in(snapshot: &SnapshotDir, class: AssetClass) -> usize {
        fs::read_dir(snapshot.path().join(class.dir_name()))
            .unwrap()
            .count()
    }

    #[tokio::test]
    async fn test_duplicate_css_fetched_once_and_every_occurrence_rewritten() {
        let (_temp, snapshot) = snapshot();
        let mut fetcher = MockContentFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|url, _| url.to_string() == "http://example.com/a.css")
            .times(1)
            .returning(|_, _| Ok(b"body{color:red}".to_vec()));

        let namer = fixed_namer();
        let base = page_url();
        let pipeline = AssetPipeline::new(&fetcher, &namer, &base, Duration::from_secs(10), 4);

        let html = r#"<link href="/a.css"><p>x</p><link rel="stylesheet" href="/a.css">"#;
        let rewritten = pipeline.process(html, AssetClass::Css, &snapshot).await.unwrap();

        let name = namer.name_for("/a.css", "css").unwrap();
        assert_eq!(
            rewritten,
            format!(r#"<link href="./css/{0}"><p>x</p><link rel="stylesheet" href="./css/{0}">"#, name)
        );
        assert_eq!(files_in(&snapshot, AssetClass::Css), 1);
        assert_eq!(
            fs::read(snapshot.asset_path(AssetClass::Css, &name)).unwrap(),
            b"body{color:red}"
        );
    }

    #[tokio::test]
    async fn test_references_resolved_against_page_url() {
        let (_temp, snapshot) = snapshot();
        let mut fetcher = MockContentFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|url, _| url.to_string() == "http://example.com/news/rel.css")
            .times(1)
            .returning(|_, _| Ok(b"a{}".to_vec()));
        fetcher
            .expect_fetch()
            .withf(|url, _| url.to_string() == "http://cdn.example.com/s.css")
            .times(1)
            .returning(|_, _| Ok(b"b{}".to_vec()));
        fetcher
            .expect_fetch()
            .withf(|url, _| url.to_string() == "https://other.example.com/abs.css")
            .times(1)
            .returning(|_, _| Ok(b"c{}".to_vec()));

        let namer = fixed_namer();
        let base = page_url();
        let pipeline = AssetPipeline::new(&fetcher, &namer, &base, Duration::from_secs(10), 2);

        let html = r#"<link href="rel.css"><link href="//cdn.example.com/s.css"><link href="https://other.example.com/abs.css">"#;
        let rewritten = pipeline.process(html, AssetClass::Css, &snapshot).await.unwrap();

        assert!(!rewritten.contains("rel.css"));
        assert!(!rewritten.contains("cdn.example.com"));
        assert!(!rewritten.contains("other.example.com"));
        assert_eq!(rewritten.matches("./css/").count(), 3);
        assert_eq!(files_in(&snapshot, AssetClass::Css), 3);
    }

    #[tokio::test]
    async fn test_asset_timeout_is_passed_to_fetcher() {
        let (_temp, snapshot) = snapshot();
        let mut fetcher = MockContentFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|_, timeout| *timeout == Duration::from_secs(7))
            .times(1)
            .returning(|_, _| Ok(b"x".to_vec()));

        let namer = fixed_namer();
        let base = page_url();
        let pipeline = AssetPipeline::new(&fetcher, &namer, &base, Duration::from_secs(7), 1);

        pipeline
            .process(r#"<script src="/x.js"></script>"#, AssetClass::Js, &snapshot)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_image_extension_comes_from_bytes() {
        let (_temp, snapshot) = snapshot();
        let mut fetcher = MockContentFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_, _| Ok(PNG.to_vec()));

        let namer = fixed_namer();
        let base = page_url();
        let pipeline = AssetPipeline::new(&fetcher, &namer, &base, Duration::from_secs(10), 4);

        let html = r#"<img src="/photo.jpg">"#;
        let rewritten = pipeline.process(html, AssetClass::Image, &snapshot).await.unwrap();

        let name = namer.name_for("/photo.jpg", "png").unwrap();
        assert_eq!(rewritten, format!(r#"<img src="./images/{}">"#, name));
        assert_eq!(fs::read(snapshot.asset_path(AssetClass::Image, &name)).unwrap(), PNG);
    }

    #[tokio::test]
    async fn test_unrecognised_image_bytes_keep_declared_suffix() {
        let (_temp, snapshot) = snapshot();
        let mut fetcher = MockContentFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_, _| Ok(b"not really an image".to_vec()));

        let namer = fixed_namer();
        let base = page_url();
        let pipeline = AssetPipeline::new(&fetcher, &namer, &base, Duration::from_secs(10), 4);

        let rewritten = pipeline
            .process(r#"<div style="background: url('/bg.GIF')">"#, AssetClass::Image, &snapshot)
            .await
            .unwrap();

        let name = namer.name_for("/bg.GIF", "GIF").unwrap();
        assert!(rewritten.contains(&format!("./images/{}", name)));
    }

    #[tokio::test]
    async fn test_script_embedded_images_are_localized() {
        let (_temp, snapshot) = snapshot();
        let mut fetcher = MockContentFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|url, _| url.to_string() == "http://example.com/app.js")
            .times(1)
            .returning(|_, _| Ok(br#"var conf = {logoUrl:"/c.jpg"};"#.to_vec()));
        fetcher
            .expect_fetch()
            .withf(|url, _| url.to_string() == "http://example.com/c.jpg")
            .times(1)
            .returning(|_, _| Ok(JPEG.to_vec()));

        let namer = fixed_namer();
        let base = page_url();
        let pipeline = AssetPipeline::new(&fetcher, &namer, &base, Duration::from_secs(10), 4);

        let html = r#"<script src="/app.js"></script>"#;
        let rewritten = pipeline.process(html, AssetClass::Js, &snapshot).await.unwrap();

        let image_name = namer.name_for("/c.jpg", "jpeg").unwrap();
        let expected_script = format!(r#"var conf = {{logoUrl:"./images/{}"}};"#, image_name);
        let script_name = namer.name_for("/app.js", "js").unwrap();

        assert_eq!(rewritten, format!(r#"<script src="./js/{}"></script>"#, script_name));
        assert_eq!(
            fs::read_to_string(snapshot.asset_path(AssetClass::Js, &script_name)).unwrap(),
            expected_script
        );
        assert_eq!(
            fs::read(snapshot.asset_path(AssetClass::Image, &image_name)).unwrap(),
            JPEG
        );
    }

    #[tokio::test]
    async fn test_script_that_is_not_utf8_fails_the_pass() {
        let (_temp, snapshot) = snapshot();
        let mut fetcher = MockContentFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_, _| Ok(vec![0xff, 0xfe, 0x00, 0xc3]));

        let namer = fixed_namer();
        let base = page_url();
        let pipeline = AssetPipeline::new(&fetcher, &namer, &base, Duration::from_secs(10), 4);

        let err = pipeline
            .process(r#"<script src="/bin.js"></script>"#, AssetClass::Js, &snapshot)
            .await
            .unwrap_err();

        assert!(matches!(err, SnapshotError::Fetch(FetchError::Decode { .. })));
        assert_eq!(files_in(&snapshot, AssetClass::Js), 0);
    }

    #[tokio::test]
    async fn test_one_failed_fetch_fails_the_class() {
        let (_temp, snapshot) = snapshot();
        let mut fetcher = MockContentFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|url, _| url.ends_with("/ok.css"))
            .returning(|_, _| Ok(b"ok{}".to_vec()));
        fetcher
            .expect_fetch()
            .withf(|url, _| url.ends_with("/slow.css"))
            .returning(|url, _| {
                Err(FetchError::Timeout {
                    url: url.to_string(),
                })
            });

        let namer = fixed_namer();
        let base = page_url();
        let pipeline = AssetPipeline::new(&fetcher, &namer, &base, Duration::from_secs(10), 1);

        let html = r#"<link href="/ok.css"><link href="/slow.css">"#;
        let err = pipeline.process(html, AssetClass::Css, &snapshot).await.unwrap_err();

        assert!(matches!(err, SnapshotError::Fetch(FetchError::Timeout { .. })));
        // bytes stored before the failure stay behind
        assert_eq!(files_in(&snapshot, AssetClass::Css), 1);
    }

    #[tokio::test]
    async fn test_failed_script_image_fails_the_script_pass() {
        let (_temp, snapshot) = snapshot();
        let mut fetcher = MockContentFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|url, _| url.ends_with("/app.js"))
            .times(1)
            .returning(|_, _| Ok(br#"var conf = {icon:"/c.jpg"};"#.to_vec()));
        fetcher
            .expect_fetch()
            .withf(|url, _| url.ends_with("/c.jpg"))
            .times(1)
            .returning(|url, _| {
                Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                })
            });

        let namer = fixed_namer();
        let base = page_url();
        let pipeline = AssetPipeline::new(&fetcher, &namer, &base, Duration::from_secs(10), 4);

        let err = pipeline
            .process(r#"<script src="/app.js"></script>"#, AssetClass::Js, &snapshot)
            .await
            .unwrap_err();

        assert!(matches!(err, SnapshotError::Fetch(FetchError::Status { status: 404, .. })));
        assert_eq!(files_in(&snapshot, AssetClass::Js), 0);
    }

    #[tokio::test]
    async fn test_reference_contained_in_another_is_rewritten_separately() {
        let (_temp, snapshot) = snapshot();
        let mut fetcher = MockContentFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|url, _| url.to_string() == "http://example.com/js/app.js")
            .times(1)
            .returning(|_, _| Ok(b"var local;".to_vec()));
        fetcher
            .expect_fetch()
            .withf(|url, _| url.to_string() == "https://cdn.example.com/js/app.js")
            .times(1)
            .returning(|_, _| Ok(b"var cdn;".to_vec()));

        let namer = fixed_namer();
        let base = page_url();
        let pipeline = AssetPipeline::new(&fetcher, &namer, &base, Duration::from_secs(10), 2);

        let html = concat!(
            r#"<script src="/js/app.js"></script>"#,
            r#"<script src="https://cdn.example.com/js/app.js"></script>"#
        );
        let rewritten = pipeline.process(html, AssetClass::Js, &snapshot).await.unwrap();

        let local = namer.name_for("/js/app.js", "js").unwrap();
        let cdn = namer.name_for("https://cdn.example.com/js/app.js", "js").unwrap();
        assert_eq!(
            rewritten,
            format!(
                r#"<script src="./js/{}"></script><script src="./js/{}"></script>"#,
                local, cdn
            )
        );
        assert_eq!(
            fs::read(snapshot.asset_path(AssetClass::Js, &cdn)).unwrap(),
            b"var cdn;"
        );
        assert_eq!(files_in(&snapshot, AssetClass::Js), 2);
    }

    #[tokio::test]
    async fn test_text_without_references_is_unchanged() {
        let (_temp, snapshot) = snapshot();
        let fetcher = MockContentFetcher::new();
        let namer = fixed_namer();
        let base = page_url();
        let pipeline = AssetPipeline::new(&fetcher, &namer, &base, Duration::from_secs(10), 4);

        let html = "<html><body>nothing here</body></html>";
        for class in [AssetClass::Css, AssetClass::Js, AssetClass::Image] {
            assert_eq!(pipeline.process(html, class, &snapshot).await.unwrap(), html);
        }
    }

    #[test]
    fn test_substitute_replaces_every_occurrence() {
        let localized = vec![
            LocalizedAsset {
                reference: "/a.png".to_string(),
                local_reference: "./images/1.png".to_string(),
            },
            LocalizedAsset {
                reference: "/b.png".to_string(),
                local_reference: "./images/2.png".to_string(),
            },
        ];

        let text = r#"<img src="/a.png"><img src="/b.png"><img src="/a.png">"#;
        assert_eq!(
            substitute(text, &localized),
            r#"<img src="./images/1.png"><img src="./images/2.png"><img src="./images/1.png">"#
        );
    }

    #[test]
    fn test_substitute_prefers_longest_reference() {
        let localized = vec![
            LocalizedAsset {
                reference: "/a.png".to_string(),
                local_reference: "./images/short.png".to_string(),
            },
            LocalizedAsset {
                reference: "//cdn.example.com/a.png".to_string(),
                local_reference: "./images/long.png".to_string(),
            },
        ];

        let text = r#"<img src="/a.png"><img src="//cdn.example.com/a.png">"#;
        assert_eq!(
            substitute(text, &localized),
            r#"<img src="./images/short.png"><img src="./images/long.png">"#
        );
    }

    #[test]
    fn test_substitute_does_not_touch_inserted_paths() {
        let localized = vec![
            LocalizedAsset {
                reference: "a.css".to_string(),
                local_reference: "./css/b.css".to_string(),
            },
            LocalizedAsset {
                reference: "b.css".to_string(),
                local_reference: "./css/c.css".to_string(),
            },
        ];

        assert_eq!(
            substitute(r#"<link href="a.css"><link href="b.css">"#, &localized),
            r#"<link href="./css/b.css"><link href="./css/c.css">"#
        );
    }
}
