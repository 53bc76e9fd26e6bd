//! Error types for template resolution.
//!
//! Every failure is fatal to the current document-processing operation;
//! nothing is recovered internally. Errors raised while a template is being
//! processed are wrapped with the owning template's name for diagnosis.

use thiserror::Error;

/// Result type alias for stackform-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures from the external deployment and key/value services.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Rate-limit-class failure; the only condition ever retried.
    #[error("rate exceeded: {0}")]
    RateLimited(String),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("reference to undefined parameter \"{name}\"")]
    UndefinedParameter { name: String },

    #[error("reference to unset environment variable \"{name}\"")]
    UndefinedEnvVar { name: String },

    #[error("output not found while expanding \"{spec}\"")]
    OutputNotFound { spec: String },

    #[error("invalid reference: \"{token}\"")]
    InvalidReference { token: String },

    #[error(
        "expected a single value for attribute \"{attr}\" of item \"{item}\", got {count}"
    )]
    AmbiguousLookup {
        item: String,
        attr: String,
        count: usize,
    },

    #[error("\"{name}\" expands to a non-scalar value")]
    NonScalarReference { name: String },

    #[error("configuration variable \"{name}\" not found")]
    UndefinedConfigVar { name: String },

    #[error("missing required value for key \"{key}\"")]
    MissingRequiredValue { key: String },

    #[error("CIDR list \"{name}\" not defined in the CIDRLists configuration section")]
    UndefinedCidrList { name: String },

    #[error("couldn't find template \"{name}\"")]
    TemplateNotFound { name: String },

    #[error("no deployment plan entry for \"{name}\"")]
    MissingPlanEntry { name: String },

    #[error("invalid location index {index} for \"{pattern}\" ({matches} matching outputs)")]
    BadIndex {
        index: usize,
        pattern: String,
        matches: usize,
    },

    #[error("expansion did not stabilize after {passes} passes for \"{text}\"")]
    ExpansionLoopDetected { text: String, passes: usize },

    #[error("child template nesting exceeds {max} levels")]
    ChildDepthExceeded { max: usize },

    #[error("template {template}: {source}")]
    InTemplate {
        template: String,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Document(#[from] stackform_yaml::Error),

    #[error(transparent)]
    Config(#[from] stackform_config::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Wrap with the owning template's name, unless already wrapped.
    pub fn in_template(self, template: &str) -> Self {
        match self {
            already @ Error::InTemplate { .. } => already,
            other => Error::InTemplate {
                template: template.to_string(),
                source: Box::new(other),
            },
        }
    }
}
