use ifm_types::SchemaPackage;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PackageSummary {
    pub name: String,
    pub description: String,
    pub sections: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PackageResponse {
    pub name: String,
    pub description: String,
    /// JSON schema of each section, keyed by section name.
    #[schema(value_type = Object)]
    pub sections: serde_json::Value,
}

impl From<&SchemaPackage> for PackageSummary {
    fn from(package: &SchemaPackage) -> Self {
        Self {
            name: package.name.to_owned(),
            description: package.description.to_owned(),
            sections: package.sections().keys().map(|s| (*s).to_owned()).collect(),
        }
    }
}

impl PackageResponse {
    pub fn from_package(package: &SchemaPackage) -> Result<Self, serde_json::Error> {
        Ok(Self {
            name: package.name.to_owned(),
            description: package.description.to_owned(),
            sections: serde_json::to_value(package.sections())?,
        })
    }
}
