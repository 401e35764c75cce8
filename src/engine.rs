use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};

use crate::config::SnapshotConfig;
use crate::error::SnapshotError;
use crate::extractor::AssetClass;
use crate::fetcher::{fetch_text, ContentFetcher};
use crate::file_manager::FileManager;
use crate::namer::{AssetNamer, Clock};
use crate::pipeline::AssetPipeline;

/// Minute-resolution directory name of a snapshot.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M";

pub const SUCCESS_MESSAGE: &str = "snapshot saved";

/// Where a cycle stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    DirCreate,
    PageFetch,
    Asset(AssetClass),
    Write,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::DirCreate => f.write_str("dir-create"),
            FailureStage::PageFetch => f.write_str("page-fetch"),
            FailureStage::Asset(class) => write!(f, "{}", class),
            FailureStage::Write => f.write_str("write"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    DirsCreated,
    PageFetched,
    CssDone,
    JsDone,
    ImagesDone,
    Persisted,
    Done,
    Failed(FailureStage),
}

impl CycleState {
    fn after(class: AssetClass) -> Self {
        match class {
            AssetClass::Css => CycleState::CssDone,
            AssetClass::Js => CycleState::JsDone,
            AssetClass::Image => CycleState::ImagesDone,
        }
    }
}

/// Outcome of one [`SnapshotEngine::run_cycle`].
#[derive(Debug)]
pub struct CycleReport {
    pub timestamp: String,
    pub snapshot_dir: PathBuf,
    pub state: CycleState,
    pub error: Option<SnapshotError>,
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        self.state == CycleState::Done
    }
}

type StageResult<T> = Result<T, (FailureStage, SnapshotError)>;

/// Captures one page per cycle into `<output>/<timestamp>/`.
///
/// A cycle never returns an error: any failure is written to the log file and
/// reported through the [`CycleReport`]. Nothing is retried within a cycle.
///
/// Directories are named to the minute, so two cycles started within the same
/// minute share `<output>/<timestamp>/` and the later one overwrites the
/// earlier `index.html` and can leave its assets beside the new ones.
pub struct SnapshotEngine<F, C> {
    fetcher: F,
    namer: AssetNamer<C>,
    file_manager: FileManager,
    config: SnapshotConfig,
    cycles_run: u64,
    cycles_succeeded: u64,
}

impl<F, C> SnapshotEngine<F, C>
where
    F: ContentFetcher,
    C: Clock,
{
    pub fn new(fetcher: F, clock: C, config: SnapshotConfig) -> Self {
        let file_manager = FileManager::new(&config.output_dir);
        Self {
            fetcher,
            namer: AssetNamer::new(clock),
            file_manager,
            config,
            cycles_run: 0,
            cycles_succeeded: 0,
        }
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    pub fn file_manager(&self) -> &FileManager {
        &self.file_manager
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycles_run
    }

    pub fn cycles_succeeded(&self) -> u64 {
        self.cycles_succeeded
    }

    /// Timestamp the next cycle would use, per the engine's clock.
    pub fn timestamp(&self) -> String {
        DateTime::<Local>::from(self.namer.clock().now())
            .format(TIMESTAMP_FORMAT)
            .to_string()
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        let timestamp = self.timestamp();
        let snapshot_dir = self.file_manager.snapshot_path(&timestamp);
        let mut state = CycleState::Idle;

        let outcome = self.capture(&timestamp, &mut state).await;
        self.cycles_run += 1;

        let (state, error, message) = match outcome {
            Ok(()) => {
                self.cycles_succeeded += 1;
                transition(&mut state, CycleState::Done);
                tracing::info!(%timestamp, dir = ?snapshot_dir, "snapshot complete");
                (state, None, SUCCESS_MESSAGE.to_string())
            }
            Err((stage, err)) => {
                tracing::warn!(%timestamp, %stage, error = %err, "snapshot failed");
                let message = format!("{} failed: {}", stage, err);
                (CycleState::Failed(stage), Some(err), message)
            }
        };

        if let Err(e) = self.file_manager.append_log(&timestamp, &message) {
            tracing::error!(error = %e, "cannot append to snapshot log");
        }

        CycleReport {
            timestamp,
            snapshot_dir,
            state,
            error,
        }
    }

    async fn capture(&self, timestamp: &str, state: &mut CycleState) -> StageResult<()> {
        let snapshot = self
            .file_manager
            .create_snapshot_tree(timestamp)
            .map_err(|e| (FailureStage::DirCreate, e))?;
        transition(state, CycleState::DirsCreated);

        let mut html = fetch_text(
            &self.fetcher,
            self.config.page_url.as_str(),
            self.config.page_timeout,
        )
        .await
        .map_err(|e| (FailureStage::PageFetch, SnapshotError::from(e)))?;
        transition(state, CycleState::PageFetched);

        let pipeline = AssetPipeline::new(
            &self.fetcher,
            &self.namer,
            &self.config.page_url,
            self.config.asset_timeout,
            self.config.max_concurrent,
        );
        for class in [AssetClass::Css, AssetClass::Js, AssetClass::Image] {
            html = pipeline
                .process(&html, class, &snapshot)
                .await
                .map_err(|e| (FailureStage::Asset(class), e))?;
            transition(state, CycleState::after(class));
        }

        snapshot
            .write_index(&html)
            .map_err(|e| (FailureStage::Write, e))?;
        transition(state, CycleState::Persisted);

        Ok(())
    }
}

fn transition(state: &mut CycleState, next: CycleState) {
    tracing::debug!(from = ?*state, to = ?next, "cycle state");
    *state = next;
}
