//! Defect-recognition model execution.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::runtime::types::WorkflowError;

/// Runs the two-stage defect-recognition model over one image.
///
/// On success the classified table has been written to `output`.
pub trait DefectRecognizer: Send + Sync + 'static {
    fn recognize(
        &self,
        image: &Path,
        model_binary: &Path,
        model_classifier: &Path,
        output: &Path,
    ) -> impl Future<Output = Result<(), WorkflowError>> + Send;
}

/// Recognizer that spawns an external program.
///
/// The program is invoked as
/// `<program> [args..] <image> <model_binary> <model_classifier> <output>`
/// and must exit with status 0 once `output` is written.
#[derive(Debug, Clone)]
pub struct CommandRecognizer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandRecognizer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Leading arguments passed before the file paths.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl DefectRecognizer for CommandRecognizer {
    async fn recognize(
        &self,
        image: &Path,
        model_binary: &Path,
        model_classifier: &Path,
        output: &Path,
    ) -> Result<(), WorkflowError> {
        info!(program = %self.program.display(), image = %image.display(), "extracting defects");

        let result = Command::new(&self.program)
            .args(&self.args)
            .arg(image)
            .arg(model_binary)
            .arg(model_classifier)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| WorkflowError::ModelExecution {
                message: format!("failed to spawn {}: {e}", self.program.display()),
            })?;

        debug!(
            stdout = %String::from_utf8_lossy(&result.stdout).trim(),
            "recognizer output"
        );
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(WorkflowError::ModelExecution {
                message: format!("{} exited with {}: {}", self.program.display(), result.status, stderr.trim()),
            });
        }
        Ok(())
    }
}
