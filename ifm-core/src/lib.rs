//! Inference runtime for IFM defect analysis.
//!
//! An [`InferenceService`] runs the three-step [`InferenceWorkflow`] (model
//! run, table parse, archive write) on a small durable-style orchestrator
//! with per-step timeouts and bounded retries.  Analysis entries learn about
//! their runs only through [`tracker::refresh_analysis`].
//!
//! ```rust,ignore
//! let store = Arc::new(LocalUploadStore::new("/srv/uploads"));
//! let service = InferenceService::new(&Config::default(), Arc::new(recognizer), store);
//! let workflow_id = service.start(request).await?;
//! let status = service.status(&workflow_id).await;
//! ```

pub mod activities;
pub mod analysis;
pub mod archive;
pub mod config;
pub mod recognizer;
pub mod runtime;
pub mod service;
pub mod tracker;
pub mod workflow;

pub use config::Config;
pub use recognizer::{CommandRecognizer, DefectRecognizer};
pub use runtime::retry::{ActivityOptions, RetryPolicy};
pub use runtime::storage::RunView;
pub use runtime::types::{RunEvent, RunState, StepRecord, StepStatus, WorkflowError, WorkflowId};
pub use service::InferenceService;
pub use workflow::{InferenceOutcome, InferencePhase, InferenceWorkflow, INFERENCE_WORKFLOW};
