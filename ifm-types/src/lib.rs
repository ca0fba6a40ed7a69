//! Shared records for the IFM inference workspace.
//!
//! These types form the passive data-definition layer: the ELN schema
//! sections (measurements, models, efficiencies, XRF, samples), the
//! inference contracts exchanged with the workflow, and the triggering
//! two-step analysis entry that owns its statuses and outputs.

pub mod analysis;
pub mod defect;
pub mod efficiency;
pub mod error;
pub mod inference;
pub mod measurement;
pub mod package;
pub mod xrf;

pub use analysis::{
    EntryContext, PlotlyFigure, Provenance, ProvenanceLink, RunCompleted, TwoStepAnalysis,
};
pub use defect::{AnalysisResult, DefectCategory, DefectPrevalence};
pub use efficiency::EfficiencyRecord;
pub use error::SchemaError;
pub use inference::{InferenceRequest, InferenceStatus, StartInferenceRequest, WorkflowStatusKind};
pub use measurement::{IfmMeasurement, IfmModel, ImageReference, ModelKind, ModelReference, SampleReference};
pub use package::{schema_packages, find_package, SchemaPackage, CATEGORY};
pub use xrf::XrfMeasurement;
