pub mod classifier;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod file_manager;
pub mod namer;
pub mod pipeline;
pub mod scheduler;

// Re-export main types for convenience
pub use cli::SnapshotCommand;
pub use config::{FetchConfig, SnapshotConfig};
pub use engine::{CycleReport, CycleState, FailureStage, SnapshotEngine};
pub use error::{FetchError, SnapshotError};
pub use extractor::{extract, AssetClass, PatternSet};
pub use fetcher::{ContentFetcher, HttpFetcher};
pub use file_manager::{FileManager, SnapshotDir};
pub use namer::{AssetNamer, Clock, FixedClock, SystemClock};
pub use pipeline::{AssetPipeline, AssetRecord, LocalizedAsset};
pub use scheduler::Scheduler;
