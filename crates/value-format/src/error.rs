use thiserror::Error;

/// Malformed unit configuration, naming the unit and the offending field.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unit `{unit}`: invalid `{field}`: {reason}")]
pub struct ConfigError {
    pub unit: String,
    pub field: String,
    pub reason: String,
}

impl ConfigError {
    pub fn new(unit: &str, field: &str, reason: impl Into<String>) -> Self {
        Self {
            unit: unit.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure while rendering a value with a template.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RenderError {
    #[error("format specifier '{0}' has no argument")]
    MissingArgument(String),
    #[error("'%{conversion}' cannot format a {argument} value")]
    IllegalConversion {
        conversion: char,
        argument: &'static str,
    },
    #[error("unknown conversion '{0}'")]
    UnknownConversion(String),
    #[error("invalid template: {0}")]
    InvalidTemplate(String),
    #[error("timestamp {0} is out of range")]
    OutOfRange(i64),
    #[error("{0}")]
    Time(String),
}

impl RenderError {
    /// Short name of the failure, used in inline diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::MissingArgument(_) => "MissingFormatArgument",
            RenderError::IllegalConversion { .. } => "IllegalFormatConversion",
            RenderError::UnknownConversion(_) => "UnknownFormatConversion",
            RenderError::InvalidTemplate(_) => "InvalidTemplate",
            RenderError::OutOfRange(_) => "OutOfRange",
            RenderError::Time(_) => "TimeFormat",
        }
    }

    /// Inline text shown in place of a value that could not be rendered.
    pub fn diagnostic(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}
