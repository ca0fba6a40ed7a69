use thiserror::Error;

/// Errors raised by the schema layer.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// No schema package is registered under the requested name.
    #[error("unknown schema package: {0}")]
    UnknownPackage(String),

    /// A section name was not found inside an existing package.
    #[error("unknown section '{section}' in package '{package}'")]
    UnknownSection { package: String, section: String },

    /// A referenced raw file name would resolve outside the upload.
    #[error("{field} '{name}' must be a relative path inside the upload")]
    UnsafeFileName { field: &'static str, name: String },
}
