//! Schema package registry.
//!
//! Each package groups the sections a lab can create entries for. The
//! registry is static; the HTTP layer exposes it so clients can render
//! forms from the JSON schemas.

use std::collections::BTreeMap;

use schemars::{schema_for, Schema};

use crate::analysis::TwoStepAnalysis;
use crate::defect::{AnalysisResult, DefectPrevalence};
use crate::efficiency::EfficiencyRecord;
use crate::error::SchemaError;
use crate::inference::InferenceStatus;
use crate::measurement::{IfmMeasurement, IfmModel, SampleReference};
use crate::xrf::XrfMeasurement;

/// Category label shared by every entry section of this plugin.
pub const CATEGORY: &str = "UIBK";

/// A named group of schema sections.
#[derive(Debug, Clone, Copy)]
pub struct SchemaPackage {
    pub name: &'static str,
    pub description: &'static str,
    sections: fn() -> Vec<(&'static str, Schema)>,
}

impl SchemaPackage {
    /// JSON schemas of all sections in this package, keyed by section name.
    pub fn sections(&self) -> BTreeMap<&'static str, Schema> {
        (self.sections)().into_iter().collect()
    }

    pub fn section(&self, name: &str) -> Result<Schema, SchemaError> {
        (self.sections)()
            .into_iter()
            .find(|(section, _)| *section == name)
            .map(|(_, schema)| schema)
            .ok_or_else(|| SchemaError::UnknownSection {
                package: self.name.to_owned(),
                section: name.to_owned(),
            })
    }
}

fn sample_sections() -> Vec<(&'static str, Schema)> {
    vec![("SampleReference", schema_for!(SampleReference))]
}

fn xrf_sections() -> Vec<(&'static str, Schema)> {
    vec![("XrfMeasurement", schema_for!(XrfMeasurement))]
}

fn ifm_sections() -> Vec<(&'static str, Schema)> {
    vec![
        ("IfmMeasurement", schema_for!(IfmMeasurement)),
        ("IfmModel", schema_for!(IfmModel)),
        ("DefectPrevalence", schema_for!(DefectPrevalence)),
        ("AnalysisResult", schema_for!(AnalysisResult)),
        ("InferenceStatus", schema_for!(InferenceStatus)),
        ("TwoStepAnalysis", schema_for!(TwoStepAnalysis)),
    ]
}

fn efficiency_sections() -> Vec<(&'static str, Schema)> {
    vec![("EfficiencyRecord", schema_for!(EfficiencyRecord))]
}

static PACKAGES: [SchemaPackage; 4] = [
    SchemaPackage {
        name: "SampleSchema",
        description: "Schema package for UIBK samples with MicroCell arrays.",
        sections: sample_sections,
    },
    SchemaPackage {
        name: "XRFSchema",
        description: "XRF Schema package defined using the new plugin mechanism.",
        sections: xrf_sections,
    },
    SchemaPackage {
        name: "IFMSchema",
        description: "IFM Schema package.",
        sections: ifm_sections,
    },
    SchemaPackage {
        name: "EfficienciesSchema",
        description: "Measured sample efficiencies.",
        sections: efficiency_sections,
    },
];

/// All registered schema packages.
pub fn schema_packages() -> &'static [SchemaPackage] {
    &PACKAGES
}

pub fn find_package(name: &str) -> Result<&'static SchemaPackage, SchemaError> {
    PACKAGES
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| SchemaError::UnknownPackage(name.to_owned()))
}
