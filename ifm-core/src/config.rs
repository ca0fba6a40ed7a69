use std::path::PathBuf;
use std::time::Duration;

use crate::runtime::retry::ActivityOptions;

/// Configuration of the inference runtime.
///
/// All fields have sensible defaults via [`Default`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity of the orchestrator command queue.  Defaults to `64`.
    pub queue_capacity: usize,
    /// Directory for staging archive documents before they are registered
    /// with an upload.
    pub work_dir: PathBuf,
    /// Options for the model run.  Defaults to a 600 s timeout.
    pub run_model: ActivityOptions,
    /// Options for table parsing.  Defaults to a 60 s timeout.
    pub parse_results: ActivityOptions,
    /// Options for the archive write.  Defaults to a 60 s timeout.
    pub write_archive: ActivityOptions,
    /// How long finished runs stay queryable.  Defaults to 24 h; `None`
    /// keeps them for the life of the process.
    pub run_retention: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            work_dir: std::env::temp_dir().join("ifm-workflows"),
            run_model: ActivityOptions::new(Duration::from_secs(600)),
            parse_results: ActivityOptions::new(Duration::from_secs(60)),
            write_archive: ActivityOptions::new(Duration::from_secs(60)),
            run_retention: Some(Duration::from_secs(24 * 60 * 60)),
        }
    }
}
